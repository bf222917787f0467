//! # Work arrays, cost and bound initialisation
//!
//! The solver never mutates the canonical program; it works on copies of the costs and bounds
//! that may be sign-flipped for maximization, replaced by dual phase-1 values, or perturbed to
//! fight degeneracy. The perturbation magnitudes are scaled from the cost profile of the
//! program and a per-variable random value that stays fixed for the whole solve, so repeated
//! initialisations are idempotent.
use crate::algorithm::simplex::{Phase, SimplexAlgorithm};
use crate::algorithm::simplex::basis::BasisState;
use crate::data::linear_program::canonical_form::CanonicalLp;

/// Base factor of both perturbation schemes.
const PERTURBATION_BASE: f64 = 5e-7;
/// Magnitude of the symmetric cost jitter applied to logical variables.
const LOGICAL_COST_JITTER: f64 = 1e-12;
/// Dual phase-1 box for free structural variables.
const PHASE1_FREE_BOUND: f64 = 1000.0;

/// Per-variable working copies of the program data, plus the per-row view of the basic
/// variables.
///
/// All `Vec`s over variables have length `num_col + num_row` (structural then logical); the
/// `base_*` arrays have length `num_row` and are ordered like `basic_index`.
#[derive(Clone, Debug, PartialEq)]
pub struct Workspace {
    pub cost: Vec<f64>,
    /// Cost shifts accumulated by dual correction, per variable.
    pub shift: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub range: Vec<f64>,
    /// Current value of each nonbasic variable; meaningless for basic ones.
    pub value: Vec<f64>,
    /// Current reduced cost of each variable.
    pub dual: Vec<f64>,
    pub base_value: Vec<f64>,
    pub base_lower: Vec<f64>,
    pub base_upper: Vec<f64>,
}

impl Workspace {
    #[must_use]
    pub fn new(num_col: usize, num_row: usize) -> Self {
        let num_tot = num_col + num_row;
        Self {
            cost: vec![0.0; num_tot],
            shift: vec![0.0; num_tot],
            lower: vec![0.0; num_tot],
            upper: vec![0.0; num_tot],
            range: vec![0.0; num_tot],
            value: vec![0.0; num_tot],
            dual: vec![0.0; num_tot],
            base_value: vec![0.0; num_row],
            base_lower: vec![0.0; num_row],
            base_upper: vec![0.0; num_row],
        }
    }

    /// Primal infeasibility of a value against a bound pair: how far it lies outside.
    pub fn infeasibility(value: f64, lower: f64, upper: f64) -> f64 {
        f64::max(0.0, f64::max(lower - value, value - upper))
    }
}

/// Load the working costs, sign-flipped for maximization, and zero the shifts.
///
/// For the dual algorithm with perturbation allowed, the costs are perturbed: structural
/// columns by a magnitude- and randomness-scaled term signed by their bound pattern, logicals
/// by a tiny symmetric jitter.
///
/// # Return value
///
/// Whether the costs were perturbed.
pub fn initialise_cost(
    workspace: &mut Workspace,
    lp: &CanonicalLp,
    algorithm: SimplexAlgorithm,
    perturb: bool,
    multiplier: f64,
    random_value: &[f64],
) -> bool {
    let num_col = lp.num_col();
    let num_tot = lp.num_tot();
    debug_assert_eq!(random_value.len(), num_tot);

    for var in 0..num_tot {
        workspace.cost[var] = lp.signed_cost(var);
        workspace.shift[var] = 0.0;
    }
    if algorithm == SimplexAlgorithm::Primal || !perturb || multiplier == 0.0 {
        return false;
    }

    // Scale of the perturbation: the largest cost magnitude, damped when large, and clamped
    // to 1 when almost no variable is boxed.
    let mut bigc = workspace.cost[..num_col]
        .iter()
        .fold(0.0_f64, |acc, &cost| acc.max(cost.abs()));
    if bigc > 100.0 {
        bigc = bigc.sqrt().sqrt();
    }
    let num_boxed = (0..num_tot)
        .filter(|&var| {
            let (lower, upper) = lp.bounds(var);
            (upper - lower).is_finite()
        })
        .count();
    if (num_boxed as f64) < 0.01 * num_tot as f64 {
        bigc = bigc.min(1.0);
    }
    let base = PERTURBATION_BASE * bigc;

    for var in 0..num_col {
        let (lower, upper) = lp.bounds(var);
        let xpert =
            (workspace.cost[var].abs() + 1.0) * base * multiplier * (1.0 + random_value[var]);
        if lower.is_infinite() && upper.is_infinite() {
            // Free: no perturbation.
        } else if upper.is_infinite() {
            workspace.cost[var] += xpert;
        } else if lower.is_infinite() {
            workspace.cost[var] -= xpert;
        } else if lower != upper {
            workspace.cost[var] += if workspace.cost[var] >= 0.0 { xpert } else { -xpert };
        }
    }
    for var in num_col..num_tot {
        workspace.cost[var] += (0.5 - random_value[var]) * multiplier * LOGICAL_COST_JITTER;
    }
    true
}

/// Load the working bounds.
///
/// The primal algorithm gets the program bounds, perturbed outwards when allowed. The dual
/// algorithm gets the program bounds in phase 2 and the phase-1 table otherwise: bounds chosen
/// so that the dual objective equals the negated sum of dual infeasibilities, with free
/// structural variables boxed at `[-1000, 1000]`.
///
/// # Return value
///
/// Whether the bounds were perturbed.
pub fn initialise_bound(
    workspace: &mut Workspace,
    lp: &CanonicalLp,
    basis: &BasisState,
    algorithm: SimplexAlgorithm,
    phase: Phase,
    perturb: bool,
    multiplier: f64,
    random_value: &[f64],
) -> bool {
    let num_col = lp.num_col();
    let num_tot = lp.num_tot();
    debug_assert_eq!(random_value.len(), num_tot);

    for var in 0..num_tot {
        let (lower, upper) = lp.bounds(var);
        workspace.lower[var] = lower;
        workspace.upper[var] = upper;
        workspace.range[var] = upper - lower;
    }

    match algorithm {
        SimplexAlgorithm::Primal => {
            if !perturb || multiplier == 0.0 {
                return false;
            }
            let base = multiplier * PERTURBATION_BASE;
            for var in 0..num_tot {
                let lower = workspace.lower[var];
                let upper = workspace.upper[var];
                // A nonbasic fixed variable stays nonbasic; perturbing it apart would make
                // it falsely boxed.
                if basis.nonbasic_flag[var] == 1 && lower == upper {
                    continue;
                }
                let random = random_value[var];
                if lower.is_finite() {
                    let scale = if lower < -1.0 {
                        -lower
                    } else if lower < 1.0 {
                        1.0
                    } else {
                        lower
                    };
                    workspace.lower[var] = lower - random * base * scale;
                }
                if upper.is_finite() {
                    let scale = if upper < -1.0 {
                        -upper
                    } else if upper < 1.0 {
                        1.0
                    } else {
                        upper
                    };
                    workspace.upper[var] = upper + random * base * scale;
                }
                workspace.range[var] = workspace.upper[var] - workspace.lower[var];
            }
            true
        },
        SimplexAlgorithm::Dual => {
            if phase == Phase::Two {
                return false;
            }
            for var in 0..num_tot {
                let lower = workspace.lower[var];
                let upper = workspace.upper[var];
                if lower.is_infinite() && upper.is_infinite() {
                    // Free logicals keep their bounds: they should never be nonbasic when
                    // starting from a logical basis, and an advanced basis keeping one
                    // nonbasic must not see it boxed.
                    if var >= num_col {
                        continue;
                    }
                    workspace.lower[var] = -PHASE1_FREE_BOUND;
                    workspace.upper[var] = PHASE1_FREE_BOUND;
                } else if lower.is_infinite() {
                    workspace.lower[var] = -1.0;
                    workspace.upper[var] = 0.0;
                } else if upper.is_infinite() {
                    workspace.lower[var] = 0.0;
                    workspace.upper[var] = 1.0;
                } else {
                    workspace.lower[var] = 0.0;
                    workspace.upper[var] = 0.0;
                }
                workspace.range[var] = workspace.upper[var] - workspace.lower[var];
            }
            false
        },
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;

    use crate::algorithm::simplex::{Phase, SimplexAlgorithm};
    use crate::algorithm::simplex::basis::BasisState;
    use crate::algorithm::simplex::cost_bound::{initialise_bound, initialise_cost, Workspace};
    use crate::data::linear_algebra::matrix::ColumnMatrix;
    use crate::data::linear_program::canonical_form::CanonicalLp;
    use crate::data::linear_program::elements::Objective;

    /// Three columns: lower-bounded, upper-bounded, free. One irrelevant row.
    fn lp() -> CanonicalLp {
        CanonicalLp::new(
            1,
            3,
            ColumnMatrix::new(1, 3, vec![0, 1, 2, 3], vec![0, 0, 0], vec![1.0; 3]),
            vec![2.0, -3.0, 0.0],
            vec![0.0, f64::NEG_INFINITY, f64::NEG_INFINITY],
            vec![f64::INFINITY, 5.0, f64::INFINITY],
            vec![0.0],
            vec![1.0],
            Objective::Minimize,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn unperturbed_cost_is_signed_lp_cost() {
        let lp = lp();
        let mut workspace = Workspace::new(3, 1);
        let random = vec![0.5; 4];
        let perturbed = initialise_cost(
            &mut workspace, &lp, SimplexAlgorithm::Dual, false, 1.0, &random,
        );
        assert!(!perturbed);
        assert_eq!(workspace.cost, vec![2.0, -3.0, 0.0, 0.0]);
    }

    #[test]
    fn cost_perturbation_signs_follow_bound_pattern() {
        let lp = lp();
        let mut workspace = Workspace::new(3, 1);
        let random = vec![0.5; 4];
        let perturbed = initialise_cost(
            &mut workspace, &lp, SimplexAlgorithm::Dual, true, 1.0, &random,
        );
        assert!(perturbed);
        // Lower-bounded: pushed up; upper-bounded: pushed down; free: untouched.
        assert!(workspace.cost[0] > 2.0);
        assert!(workspace.cost[1] < -3.0);
        assert_eq!(workspace.cost[2], 0.0);
        // The perturbation is tiny relative to the costs.
        assert_abs_diff_eq!(workspace.cost[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(workspace.cost[1], -3.0, epsilon = 1e-4);
    }

    #[test]
    fn dual_phase1_bound_table() {
        let lp = lp();
        let basis = BasisState::logical(&lp);
        let mut workspace = Workspace::new(3, 1);
        let random = vec![0.5; 4];
        initialise_bound(
            &mut workspace, &lp, &basis, SimplexAlgorithm::Dual, Phase::One, false, 1.0, &random,
        );
        // Lower-bounded, upper-bounded, free, and the boxed logical of row [0, 1].
        assert_eq!(workspace.lower, vec![0.0, -1.0, -1000.0, 0.0]);
        assert_eq!(workspace.upper, vec![1.0, 0.0, 1000.0, 0.0]);
    }

    #[test]
    fn primal_bound_perturbation_expands_the_box() {
        let lp = lp();
        let basis = BasisState::logical(&lp);
        let mut workspace = Workspace::new(3, 1);
        let random = vec![0.5; 4];
        let perturbed = initialise_bound(
            &mut workspace, &lp, &basis, SimplexAlgorithm::Primal, Phase::Two, true, 1.0, &random,
        );
        assert!(perturbed);
        assert!(workspace.lower[0] < 0.0);
        assert!(workspace.upper[1] > 5.0);
        assert_abs_diff_eq!(workspace.lower[0], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(workspace.upper[1], 5.0, epsilon = 1e-4);
        // The logical of the row keeps its direction of inequality.
        assert!(workspace.lower[3] < -1.0 && workspace.upper[3] > 0.0);
    }
}
