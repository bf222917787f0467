//! # Ratio tests
//!
//! Selection of the variable that blocks a pivot. Both directions use the two-pass ratio test
//! of Harris: the first pass computes the largest step that keeps every candidate within its
//! tolerance-relaxed bound, the second pass picks, among the candidates blocking within that
//! step, the one with the largest pivot element. Trading a tolerance-sized infeasibility for a
//! large pivot keeps the basis numerically sound, and the ties that remain break on the lowest
//! variable index so runs are reproducible.
use crate::algorithm::simplex::basis::{BasisState, MOVE_DOWN, MOVE_UP};
use crate::algorithm::simplex::cost_bound::Workspace;
use crate::data::linear_algebra::vector::{Iteration, WorkVector};

/// Tableau entries smaller than this cannot serve as pivot elements.
pub const ALPHA_TOLERANCE: f64 = 1e-9;

/// Outcome of the dual ratio test: the entering variable and its tableau row entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualStep {
    pub variable: usize,
    pub alpha_row: f64,
}

/// Dual ratio test over the priced tableau row.
///
/// # Arguments
///
/// * `row_ap`: Tableau row entries of the structural variables.
/// * `row_ep`: BTRANed unit row; its entries are the tableau row entries of the logicals.
/// * `leaving_increases`: Whether the leaving basic variable must increase to reach the bound
///   it violates.
///
/// # Return value
///
/// `None` when no nonbasic variable can absorb the leaving variable's move: a certificate of
/// dual unboundedness, hence of primal infeasibility when the duals are exact.
pub fn dual_ratio_test(
    workspace: &Workspace,
    basis: &BasisState,
    row_ap: &WorkVector,
    row_ep: &WorkVector,
    leaving_increases: bool,
    dual_tolerance: f64,
) -> Option<DualStep> {
    let num_col = row_ap.dim();

    // The sign of a candidate's tableau entry decides in which direction it would have to
    // move; that direction must be open to it.
    let eligible = |var: usize, alpha: f64| -> bool {
        if basis.nonbasic_flag[var] != 1 || alpha.abs() < ALPHA_TOLERANCE {
            return false;
        }
        let free = workspace.lower[var].is_infinite() && workspace.upper[var].is_infinite();
        if basis.nonbasic_move[var] == 0 && !free {
            return false;
        }
        let entering_increases = (alpha > 0.0) != leaving_increases;
        free || if entering_increases {
            basis.nonbasic_move[var] == MOVE_UP
        } else {
            basis.nonbasic_move[var] == MOVE_DOWN
        }
    };
    // A dual already violating feasibility by less than the tolerance is treated as zero, so
    // the candidate can be taken with a zero-length dual step.
    let clamped_dual = |var: usize| -> f64 {
        let dual = workspace.dual[var];
        match basis.nonbasic_move[var] {
            MOVE_UP if dual < 0.0 => 0.0,
            MOVE_DOWN if dual > 0.0 => 0.0,
            _ => dual,
        }
    };

    let visit = |body: &mut dyn FnMut(usize, f64)| {
        match row_ap.iteration() {
            Iteration::Sparse(indices) => {
                for &j in indices {
                    body(j, row_ap.get(j));
                }
            },
            Iteration::Dense(dim) => {
                for j in 0..dim {
                    body(j, row_ap.get(j));
                }
            },
        }
        match row_ep.iteration() {
            Iteration::Sparse(indices) => {
                for &i in indices {
                    body(num_col + i, row_ep.get(i));
                }
            },
            Iteration::Dense(dim) => {
                for i in 0..dim {
                    body(num_col + i, row_ep.get(i));
                }
            },
        }
    };

    // First pass: the largest dual step that keeps all candidates within the relaxed
    // tolerance.
    let mut max_step = f64::INFINITY;
    visit(&mut |var, alpha| {
        if eligible(var, alpha) {
            let step = (clamped_dual(var).abs() + dual_tolerance) / alpha.abs();
            if step < max_step {
                max_step = step;
            }
        }
    });

    // Second pass: among candidates blocking within that step, the largest pivot element.
    let mut best: Option<DualStep> = None;
    let mut best_magnitude = 0.0;
    visit(&mut |var, alpha| {
        if eligible(var, alpha) {
            let step = clamped_dual(var).abs() / alpha.abs();
            if step <= max_step {
                let magnitude = alpha.abs();
                let better = match best {
                    None => true,
                    Some(incumbent) => {
                        magnitude > best_magnitude
                            || (magnitude == best_magnitude && var < incumbent.variable)
                    },
                };
                if better {
                    best = Some(DualStep { variable: var, alpha_row: alpha });
                    best_magnitude = magnitude;
                }
            }
        }
    });
    best
}

/// Outcome of the primal ratio test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PrimalStep {
    /// The entering variable reaches its opposite bound before any basic variable blocks:
    /// flip it, the basis does not change.
    BoundFlip,
    /// The basic variable of `row` blocks; its tableau column entry is `alpha`.
    Pivot { row: usize, alpha: f64 },
    /// Nothing blocks and the entering variable's range is infinite.
    Unbounded,
}

/// Primal ratio test over the FTRANed entering column.
///
/// # Arguments
///
/// * `col_aq`: `B^-1 a_q`, the tableau column of the entering variable.
/// * `entering_range`: Distance between the entering variable's bounds, possibly infinite.
/// * `entering_increases`: The direction the entering variable moves in.
pub fn primal_ratio_test(
    workspace: &Workspace,
    col_aq: &WorkVector,
    entering_range: f64,
    entering_increases: bool,
    primal_tolerance: f64,
) -> PrimalStep {
    debug_assert!(entering_range >= 0.0);

    // Moving the entering variable by `theta` changes basic row `i` by `-alpha_i * theta`
    // (increasing direction); the room to the bound it approaches limits `theta`.
    let room = |row: usize, alpha: f64| -> f64 {
        let value = workspace.base_value[row];
        let decreasing = (alpha > 0.0) == entering_increases;
        if decreasing {
            let lower = workspace.base_lower[row];
            if lower.is_infinite() {
                f64::INFINITY
            } else {
                (value - lower).max(0.0)
            }
        } else {
            let upper = workspace.base_upper[row];
            if upper.is_infinite() {
                f64::INFINITY
            } else {
                (upper - value).max(0.0)
            }
        }
    };

    let visit = |body: &mut dyn FnMut(usize, f64)| {
        match col_aq.iteration() {
            Iteration::Sparse(indices) => {
                for &i in indices {
                    body(i, col_aq.get(i));
                }
            },
            Iteration::Dense(dim) => {
                for i in 0..dim {
                    body(i, col_aq.get(i));
                }
            },
        }
    };

    let mut max_step = entering_range;
    visit(&mut |row, alpha| {
        if alpha.abs() >= ALPHA_TOLERANCE {
            let space = room(row, alpha);
            if space.is_finite() {
                let step = (space + primal_tolerance) / alpha.abs();
                if step < max_step {
                    max_step = step;
                }
            }
        }
    });

    let mut blocking: Option<(usize, f64)> = None;
    let mut blocking_magnitude = 0.0;
    visit(&mut |row, alpha| {
        if alpha.abs() >= ALPHA_TOLERANCE {
            let space = room(row, alpha);
            if space.is_finite() {
                let step = space / alpha.abs();
                if step <= max_step {
                    let magnitude = alpha.abs();
                    let better = match blocking {
                        None => true,
                        Some((incumbent, _)) => {
                            magnitude > blocking_magnitude
                                || (magnitude == blocking_magnitude && row < incumbent)
                        },
                    };
                    if better {
                        blocking = Some((row, alpha));
                        blocking_magnitude = magnitude;
                    }
                }
            }
        }
    });

    match blocking {
        Some((row, alpha)) => PrimalStep::Pivot { row, alpha },
        None if entering_range.is_finite() => PrimalStep::BoundFlip,
        None => PrimalStep::Unbounded,
    }
}

#[cfg(test)]
mod test {
    use crate::algorithm::simplex::basis::{BasisState, MOVE_DOWN, MOVE_UP};
    use crate::algorithm::simplex::cost_bound::Workspace;
    use crate::algorithm::simplex::ratio_test::{
        dual_ratio_test, primal_ratio_test, DualStep, PrimalStep,
    };
    use crate::data::linear_algebra::vector::WorkVector;

    #[test]
    fn dual_prefers_large_pivot_within_relaxed_step() {
        // Two structural candidates at their lower bound with equal ratios; the larger
        // tableau entry wins.
        let mut workspace = Workspace::new(2, 1);
        workspace.lower = vec![0.0, 0.0, 0.0];
        workspace.upper = vec![f64::INFINITY, f64::INFINITY, f64::INFINITY];
        workspace.dual = vec![1.0, 2.0, 0.0];
        let basis = BasisState {
            basic_index: vec![2],
            nonbasic_flag: vec![1, 1, 0],
            nonbasic_move: vec![MOVE_UP, MOVE_UP, 0],
        };
        let mut row_ap = WorkVector::new(2);
        // The leaving variable increases; candidates at lower bounds need negative entries.
        row_ap.fill(&[(0, -1.0), (1, -2.0)]);
        let row_ep = WorkVector::new(1);

        let step = dual_ratio_test(&workspace, &basis, &row_ap, &row_ep, true, 1e-7);
        assert_eq!(step, Some(DualStep { variable: 1, alpha_row: -2.0 }));
    }

    #[test]
    fn dual_respects_move_direction() {
        // A candidate at its upper bound may only decrease; with the leaving variable
        // increasing, a positive entry is required.
        let mut workspace = Workspace::new(2, 1);
        workspace.lower = vec![f64::NEG_INFINITY, 0.0, 0.0];
        workspace.upper = vec![0.0, f64::INFINITY, f64::INFINITY];
        workspace.dual = vec![-1.0, 1.0, 0.0];
        let basis = BasisState {
            basic_index: vec![2],
            nonbasic_flag: vec![1, 1, 0],
            nonbasic_move: vec![MOVE_DOWN, MOVE_UP, 0],
        };
        let mut row_ap = WorkVector::new(2);
        row_ap.fill(&[(0, -3.0), (1, -1.0)]);
        let row_ep = WorkVector::new(1);

        // Variable 0 is ineligible (entry -3 would ask it to increase off its upper bound),
        // so variable 1 is chosen despite the smaller entry.
        let step = dual_ratio_test(&workspace, &basis, &row_ap, &row_ep, true, 1e-7);
        assert_eq!(step, Some(DualStep { variable: 1, alpha_row: -1.0 }));
    }

    #[test]
    fn dual_without_candidates_is_none() {
        let mut workspace = Workspace::new(1, 1);
        workspace.lower = vec![0.0, 0.0];
        workspace.upper = vec![f64::INFINITY, f64::INFINITY];
        workspace.dual = vec![1.0, 0.0];
        let basis = BasisState {
            basic_index: vec![1],
            nonbasic_flag: vec![1, 0],
            nonbasic_move: vec![MOVE_UP, 0],
        };
        let mut row_ap = WorkVector::new(1);
        row_ap.fill(&[(0, 1.0)]);
        let row_ep = WorkVector::new(1);

        assert_eq!(dual_ratio_test(&workspace, &basis, &row_ap, &row_ep, true, 1e-7), None);
    }

    #[test]
    fn primal_blocking_row_and_unboundedness() {
        let mut workspace = Workspace::new(0, 2);
        workspace.base_value = vec![1.0, 5.0];
        workspace.base_lower = vec![0.0, 0.0];
        workspace.base_upper = vec![f64::INFINITY, f64::INFINITY];

        let mut col_aq = WorkVector::new(2);
        col_aq.fill(&[(0, 1.0), (1, 1.0)]);
        // Entering increases: row 0 runs out of room first.
        let step = primal_ratio_test(&workspace, &col_aq, f64::INFINITY, true, 1e-7);
        assert_eq!(step, PrimalStep::Pivot { row: 0, alpha: 1.0 });

        // Entering decreases: both rows move up without upper bounds.
        let step = primal_ratio_test(&workspace, &col_aq, f64::INFINITY, false, 1e-7);
        assert_eq!(step, PrimalStep::Unbounded);
    }

    #[test]
    fn primal_bound_flip_beats_distant_blocker() {
        let mut workspace = Workspace::new(0, 1);
        workspace.base_value = vec![10.0];
        workspace.base_lower = vec![0.0];
        workspace.base_upper = vec![f64::INFINITY];

        let mut col_aq = WorkVector::new(1);
        col_aq.fill(&[(0, 1.0)]);
        // The blocker allows a step of 10, but the entering variable's range is only 2.
        let step = primal_ratio_test(&workspace, &col_aq, 2.0, true, 1e-7);
        assert_eq!(step, PrimalStep::BoundFlip);
    }
}
