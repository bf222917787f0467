//! # Solutions and externally visible bases
//!
//! What the caller gets back after a solve: primal and dual values in the original row/column
//! convention, the objective value, the measured infeasibilities, and a basis that can be
//! passed back in to warm-start a later solve.
use crate::data::linear_program::elements::VariableStatus;

/// Primal and dual values for the original program.
///
/// Rows follow the interface convention: the row value is the activity `a_i'x` (the negated
/// logical value) and the row dual is the sense-scaled logical dual.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub col_value: Vec<f64>,
    pub col_dual: Vec<f64>,
    pub row_value: Vec<f64>,
    pub row_dual: Vec<f64>,
    /// Objective value including the offset, in the user's optimization sense.
    pub objective_value: f64,
    pub num_primal_infeasibility: usize,
    pub max_primal_infeasibility: f64,
    pub sum_primal_infeasibility: f64,
    pub num_dual_infeasibility: usize,
    pub max_dual_infeasibility: f64,
    pub sum_dual_infeasibility: f64,
}

/// A basis in the external row/column convention.
///
/// For rows the `Lower`/`Upper` statuses refer to the row bounds, which are the negated and
/// swapped bounds of the backing logical variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalBasis {
    pub col_status: Vec<VariableStatus>,
    pub row_status: Vec<VariableStatus>,
}

impl ExternalBasis {
    /// Number of basic entries over both columns and rows.
    pub fn num_basic(&self) -> usize {
        self.col_status
            .iter()
            .chain(&self.row_status)
            .filter(|&&status| status == VariableStatus::Basic)
            .count()
    }
}
