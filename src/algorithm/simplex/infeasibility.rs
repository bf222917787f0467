//! # Infeasibility and objective measures
//!
//! Aggregation of primal and dual infeasibilities over the working state, and the primal and
//! dual objective values. The primal objective is always measured against the original costs
//! and offset, so it stays meaningful while the working costs are perturbed.
use crate::algorithm::simplex::basis::BasisState;
use crate::algorithm::simplex::cost_bound::Workspace;
use crate::algorithm::simplex::Phase;
use crate::data::linear_program::canonical_form::CanonicalLp;

/// Count, maximum and sum of a family of infeasibilities.
///
/// Values above the tolerance are counted; the maximum and sum accumulate every positive
/// violation, however small.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InfeasibilityMeasure {
    pub num: usize,
    pub max: f64,
    pub sum: f64,
}

impl InfeasibilityMeasure {
    fn record(&mut self, infeasibility: f64, tolerance: f64) {
        if infeasibility > 0.0 {
            if infeasibility > tolerance {
                self.num += 1;
            }
            self.max = self.max.max(infeasibility);
            self.sum += infeasibility;
        }
    }
}

/// Measure primal infeasibility: nonbasic variables against the working bounds, basic
/// variables against the per-row bound copies.
pub fn primal_infeasibility(
    workspace: &Workspace,
    basis: &BasisState,
    tolerance: f64,
) -> InfeasibilityMeasure {
    let mut measure = InfeasibilityMeasure::default();
    for var in 0..basis.nonbasic_flag.len() {
        if basis.nonbasic_flag[var] == 1 {
            let infeasibility = Workspace::infeasibility(
                workspace.value[var],
                workspace.lower[var],
                workspace.upper[var],
            );
            if infeasibility > tolerance {
                measure.record(infeasibility, tolerance);
            }
        }
    }
    for row in 0..basis.basic_index.len() {
        let infeasibility = Workspace::infeasibility(
            workspace.base_value[row],
            workspace.base_lower[row],
            workspace.base_upper[row],
        );
        if infeasibility > tolerance {
            measure.record(infeasibility, tolerance);
        }
    }
    measure
}

/// Measure dual infeasibility of the nonbasic variables.
///
/// Free variables are infeasible by any nonzero dual; all others by a dual pointing with
/// their move direction, measured as `-move * dual`.
pub fn dual_infeasibility(
    workspace: &Workspace,
    basis: &BasisState,
    tolerance: f64,
) -> InfeasibilityMeasure {
    let mut measure = InfeasibilityMeasure::default();
    for var in 0..basis.nonbasic_flag.len() {
        if basis.nonbasic_flag[var] == 0 {
            continue;
        }
        let dual = workspace.dual[var];
        let infeasibility = if workspace.lower[var].is_infinite() && workspace.upper[var].is_infinite()
        {
            dual.abs()
        } else {
            -f64::from(basis.nonbasic_move[var]) * dual
        };
        if infeasibility >= tolerance {
            measure.num += 1;
        }
        if infeasibility > 0.0 {
            measure.max = measure.max.max(infeasibility);
            measure.sum += infeasibility;
        }
    }
    measure
}

/// The primal objective: original costs over the current primal values, plus the offset, in
/// the user's optimization sense.
pub fn primal_objective_value(
    lp: &CanonicalLp,
    workspace: &Workspace,
    basis: &BasisState,
) -> f64 {
    let num_col = lp.num_col();
    let mut objective = 0.0;
    for (row, &var) in basis.basic_index.iter().enumerate() {
        if var < num_col {
            objective += workspace.base_value[row] * lp.cost()[var];
        }
    }
    for var in 0..num_col {
        if basis.nonbasic_flag[var] == 1 {
            objective += workspace.value[var] * lp.cost()[var];
        }
    }
    objective + lp.offset()
}

/// The dual objective: products of primal value and reduced cost over the nonbasic variables.
///
/// In phase 2 the offset enters with the sign implied by the optimization sense; the phase-1
/// objective has no offset, it is the negated sum of infeasibilities.
pub fn dual_objective_value(
    lp: &CanonicalLp,
    workspace: &Workspace,
    basis: &BasisState,
    phase: Phase,
) -> f64 {
    let mut objective = 0.0;
    for var in 0..basis.nonbasic_flag.len() {
        if basis.nonbasic_flag[var] == 1 {
            objective += workspace.value[var] * workspace.dual[var];
        }
    }
    if phase == Phase::Two {
        objective += lp.sense().sign() * lp.offset();
    }
    objective
}

#[cfg(test)]
mod test {
    use crate::algorithm::simplex::basis::{BasisState, MOVE_UP};
    use crate::algorithm::simplex::cost_bound::Workspace;
    use crate::algorithm::simplex::infeasibility::{dual_infeasibility, primal_infeasibility};

    fn state() -> (Workspace, BasisState) {
        let mut workspace = Workspace::new(2, 1);
        workspace.lower = vec![0.0, 0.0, f64::NEG_INFINITY];
        workspace.upper = vec![1.0, f64::INFINITY, 0.0];
        workspace.value = vec![0.0, 0.0, 0.0];
        workspace.dual = vec![1.0, -2.0, 0.0];
        workspace.base_value = vec![-3.0];
        workspace.base_lower = vec![0.0];
        workspace.base_upper = vec![5.0];
        let basis = BasisState {
            basic_index: vec![2],
            nonbasic_flag: vec![1, 1, 0],
            nonbasic_move: vec![MOVE_UP, MOVE_UP, 0],
        };
        (workspace, basis)
    }

    #[test]
    fn basic_variable_out_of_bounds_is_primal_infeasible() {
        let (workspace, basis) = state();
        let measure = primal_infeasibility(&workspace, &basis, 1e-7);
        assert_eq!(measure.num, 1);
        assert_eq!(measure.max, 3.0);
        assert_eq!(measure.sum, 3.0);
    }

    #[test]
    fn wrong_signed_dual_is_dual_infeasible() {
        let (workspace, basis) = state();
        // Variable 0 at its lower bound with positive dual: feasible. Variable 1 at its
        // lower bound with negative dual: infeasible by 2.
        let measure = dual_infeasibility(&workspace, &basis, 1e-7);
        assert_eq!(measure.num, 1);
        assert_eq!(measure.max, 2.0);
        assert_eq!(measure.sum, 2.0);
    }
}
