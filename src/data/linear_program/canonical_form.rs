//! # Canonical form
//!
//! The form in which the solver core receives a linear program: minimize or maximize `c'x`
//! subject to `L <= Ax <= U` and `l <= x <= u`, with `A` stored column-wise. Internally every
//! row is turned into an equality by a logical variable with bounds `[-U_i, -L_i]`, giving the
//! augmented matrix `[A | -I]`; that view lives in the solver, not here.
//!
//! The canonical program is borrowed read-only for the duration of a solve. Presolve, scaling
//! and name bookkeeping happen before this type is constructed.
use std::error::Error;
use std::fmt;

use crate::data::linear_algebra::matrix::ColumnMatrix;
use crate::data::linear_program::elements::Objective;

/// A linear program in canonical form.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalLp {
    num_row: usize,
    num_col: usize,
    columns: ColumnMatrix,
    cost: Vec<f64>,
    col_lower: Vec<f64>,
    col_upper: Vec<f64>,
    row_lower: Vec<f64>,
    row_upper: Vec<f64>,
    sense: Objective,
    offset: f64,
}

impl CanonicalLp {
    /// Assemble a canonical program, validating the dimensions of all parts.
    ///
    /// Bound vectors may contain `f64::INFINITY` / `f64::NEG_INFINITY`; an empty bound pair
    /// (`l > u`) is not rejected here, it surfaces as primal infeasibility during the solve.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        num_row: usize,
        num_col: usize,
        columns: ColumnMatrix,
        cost: Vec<f64>,
        col_lower: Vec<f64>,
        col_upper: Vec<f64>,
        row_lower: Vec<f64>,
        row_upper: Vec<f64>,
        sense: Objective,
        offset: f64,
    ) -> Result<Self, InconsistentDimensionsError> {
        let check = |name: &'static str, found: usize, expected: usize| {
            if found == expected {
                Ok(())
            } else {
                Err(InconsistentDimensionsError { name, found, expected })
            }
        };
        check("matrix rows", columns.num_row(), num_row)?;
        check("matrix columns", columns.num_col(), num_col)?;
        check("cost", cost.len(), num_col)?;
        check("column lower bounds", col_lower.len(), num_col)?;
        check("column upper bounds", col_upper.len(), num_col)?;
        check("row lower bounds", row_lower.len(), num_row)?;
        check("row upper bounds", row_upper.len(), num_row)?;

        Ok(Self {
            num_row,
            num_col,
            columns,
            cost,
            col_lower,
            col_upper,
            row_lower,
            row_upper,
            sense,
            offset,
        })
    }

    pub fn num_row(&self) -> usize {
        self.num_row
    }

    pub fn num_col(&self) -> usize {
        self.num_col
    }

    /// Number of variables in the augmented view: structural plus logical.
    pub fn num_tot(&self) -> usize {
        self.num_col + self.num_row
    }

    pub fn columns(&self) -> &ColumnMatrix {
        &self.columns
    }

    pub fn cost(&self) -> &[f64] {
        &self.cost
    }

    pub fn col_lower(&self) -> &[f64] {
        &self.col_lower
    }

    pub fn col_upper(&self) -> &[f64] {
        &self.col_upper
    }

    pub fn row_lower(&self) -> &[f64] {
        &self.row_lower
    }

    pub fn row_upper(&self) -> &[f64] {
        &self.row_upper
    }

    pub fn sense(&self) -> Objective {
        self.sense
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Bounds of augmented variable `var`: the column bounds for structurals, the negated and
    /// swapped row bounds for logicals.
    pub fn bounds(&self, var: usize) -> (f64, f64) {
        debug_assert!(var < self.num_tot());

        if var < self.num_col {
            (self.col_lower[var], self.col_upper[var])
        } else {
            let row = var - self.num_col;
            (-self.row_upper[row], -self.row_lower[row])
        }
    }

    /// Cost of augmented variable `var` as seen by the minimizing core.
    pub fn signed_cost(&self, var: usize) -> f64 {
        debug_assert!(var < self.num_tot());

        if var < self.num_col {
            self.sense.sign() * self.cost[var]
        } else {
            0.0
        }
    }
}

/// A part of the program did not have the size implied by `num_row` / `num_col`.
#[derive(Debug, Eq, PartialEq)]
pub struct InconsistentDimensionsError {
    name: &'static str,
    found: usize,
    expected: usize,
}

impl fmt::Display for InconsistentDimensionsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "inconsistent dimensions: {} has length {}, expected {}",
            self.name, self.found, self.expected,
        )
    }
}

impl Error for InconsistentDimensionsError {}

#[cfg(test)]
mod test {
    use crate::data::linear_algebra::matrix::ColumnMatrix;
    use crate::data::linear_program::canonical_form::CanonicalLp;
    use crate::data::linear_program::elements::Objective;

    fn one_by_one() -> CanonicalLp {
        CanonicalLp::new(
            1,
            1,
            ColumnMatrix::new(1, 1, vec![0, 1], vec![0], vec![1.0]),
            vec![1.0],
            vec![0.0],
            vec![2.0],
            vec![1.0],
            vec![f64::INFINITY],
            Objective::Minimize,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn logical_bounds_are_negated_row_bounds() {
        let lp = one_by_one();
        assert_eq!(lp.bounds(0), (0.0, 2.0));
        assert_eq!(lp.bounds(1), (f64::NEG_INFINITY, -1.0));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let result = CanonicalLp::new(
            1,
            1,
            ColumnMatrix::new(1, 1, vec![0, 1], vec![0], vec![1.0]),
            vec![1.0, 2.0],
            vec![0.0],
            vec![2.0],
            vec![1.0],
            vec![f64::INFINITY],
            Objective::Minimize,
            0.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn maximization_negates_structural_costs() {
        let mut lp = one_by_one();
        assert_eq!(lp.signed_cost(0), 1.0);
        lp.sense = Objective::Maximize;
        assert_eq!(lp.signed_cost(0), -1.0);
        assert_eq!(lp.signed_cost(1), 0.0);
    }
}
