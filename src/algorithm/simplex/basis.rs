//! # Basis state
//!
//! The partition of the augmented variables into basic and nonbasic, the ordering of the basic
//! ones (which ties them to rows of the tableau), and per nonbasic variable the bound it sits
//! at, encoded as the direction it may move in: `+1` away from its lower bound, `-1` away from
//! its upper bound, `0` for fixed and free variables.
use std::error::Error;
use std::fmt;

use crate::algorithm::simplex::cost_bound::Workspace;
use crate::data::linear_program::canonical_form::CanonicalLp;
use crate::data::linear_program::elements::VariableStatus;
use crate::data::linear_program::solution::ExternalBasis;

/// Move direction of a nonbasic variable sitting at its lower bound.
pub const MOVE_UP: i8 = 1;
/// Move direction of a nonbasic variable sitting at its upper bound.
pub const MOVE_DOWN: i8 = -1;
/// Move of basic, fixed and free-at-zero variables.
pub const MOVE_NONE: i8 = 0;

/// Basic/nonbasic partition with bound-side tracking.
///
/// Invariants, restored after every mutation:
/// - `basic_index` holds `num_row` distinct variables, exactly those with `nonbasic_flag = 0`;
/// - basic variables have `nonbasic_move = 0`;
/// - nonbasic variables with a single finite bound point away from it; boxed ones sit at one
///   of their bounds; fixed and free ones have move `0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasisState {
    /// Ordered variable indices of the basic variables; entry `i` backs row `i`.
    pub basic_index: Vec<usize>,
    /// Per augmented variable: `1` if nonbasic, `0` if basic.
    pub nonbasic_flag: Vec<i8>,
    /// Per augmented variable: which way a nonbasic variable may move.
    pub nonbasic_move: Vec<i8>,
}

impl BasisState {
    /// The logical basis: all structural columns nonbasic, all logicals basic.
    ///
    /// Boxed columns start at the bound nearer to zero.
    #[must_use]
    pub fn logical(lp: &CanonicalLp) -> Self {
        let num_col = lp.num_col();
        let num_row = lp.num_row();
        let num_tot = num_col + num_row;

        let mut nonbasic_flag = vec![1; num_tot];
        let mut nonbasic_move = vec![MOVE_NONE; num_tot];
        for var in 0..num_col {
            nonbasic_move[var] = Self::move_for_bounds(lp.bounds(var), None);
        }
        let mut basic_index = Vec::with_capacity(num_row);
        for row in 0..num_row {
            let var = num_col + row;
            nonbasic_flag[var] = 0;
            basic_index.push(var);
        }

        Self { basic_index, nonbasic_flag, nonbasic_move }
    }

    /// Install an externally supplied basis.
    ///
    /// # Errors
    ///
    /// When the number of basic entries is not the number of rows.
    pub fn from_external(lp: &CanonicalLp, basis: &ExternalBasis) -> Result<Self, InvalidBasisError> {
        if basis.col_status.len() != lp.num_col() || basis.row_status.len() != lp.num_row() {
            return Err(InvalidBasisError {
                num_basic: basis.num_basic(),
                num_row: lp.num_row(),
                dimensions_wrong: true,
            });
        }
        if basis.num_basic() != lp.num_row() {
            return Err(InvalidBasisError {
                num_basic: basis.num_basic(),
                num_row: lp.num_row(),
                dimensions_wrong: false,
            });
        }

        let num_col = lp.num_col();
        let num_tot = lp.num_tot();
        let mut nonbasic_flag = vec![1; num_tot];
        let mut nonbasic_move = vec![MOVE_NONE; num_tot];
        let mut basic_index = Vec::with_capacity(lp.num_row());

        for var in 0..num_tot {
            let status = if var < num_col {
                basis.col_status[var]
            } else {
                // Row statuses live in row-bound space; the backing logical has the bounds
                // negated and swapped, so lower and upper trade places.
                match basis.row_status[var - num_col] {
                    VariableStatus::Lower => VariableStatus::Upper,
                    VariableStatus::Upper => VariableStatus::Lower,
                    other => other,
                }
            };
            let (lower, upper) = lp.bounds(var);
            match status {
                VariableStatus::Basic => {
                    nonbasic_flag[var] = 0;
                    basic_index.push(var);
                },
                VariableStatus::Lower => {
                    nonbasic_move[var] = if lower == upper { MOVE_NONE } else { MOVE_UP };
                },
                VariableStatus::Upper => {
                    nonbasic_move[var] = MOVE_DOWN;
                },
                VariableStatus::Zero => {
                    nonbasic_move[var] = MOVE_NONE;
                },
            }
        }
        debug_assert_eq!(basic_index.len(), lp.num_row());

        Ok(Self { basic_index, nonbasic_flag, nonbasic_move })
    }

    /// Export in the external row/column convention.
    #[must_use]
    pub fn to_external(&self, lp: &CanonicalLp) -> ExternalBasis {
        let num_col = lp.num_col();
        let status_of = |var: usize| {
            let (lower, upper) = lp.bounds(var);
            if self.nonbasic_flag[var] == 0 {
                VariableStatus::Basic
            } else {
                match self.nonbasic_move[var] {
                    MOVE_UP => VariableStatus::Lower,
                    MOVE_DOWN => VariableStatus::Upper,
                    _ => {
                        if lower == upper {
                            VariableStatus::Lower
                        } else {
                            VariableStatus::Zero
                        }
                    },
                }
            }
        };

        let col_status = (0..num_col).map(status_of).collect();
        let row_status = (num_col..lp.num_tot())
            .map(|var| match status_of(var) {
                VariableStatus::Lower => VariableStatus::Upper,
                VariableStatus::Upper => VariableStatus::Lower,
                other => other,
            })
            .collect();
        ExternalBasis { col_status, row_status }
    }

    fn move_for_bounds((lower, upper): (f64, f64), current_move: Option<i8>) -> i8 {
        if lower == upper {
            MOVE_NONE
        } else if lower.is_finite() {
            if upper.is_finite() {
                // Boxed: keep a valid existing side, or start at the bound nearer zero.
                match current_move {
                    Some(MOVE_UP) => MOVE_UP,
                    Some(MOVE_DOWN) => MOVE_DOWN,
                    _ => {
                        if lower.abs() < upper.abs() {
                            MOVE_UP
                        } else {
                            MOVE_DOWN
                        }
                    },
                }
            } else {
                MOVE_UP
            }
        } else if upper.is_finite() {
            MOVE_DOWN
        } else {
            MOVE_NONE
        }
    }

    /// Derive `nonbasic_move` from the working bounds for every nonbasic variable.
    pub fn set_nonbasic_move(&mut self, workspace: &Workspace) {
        for var in 0..self.nonbasic_flag.len() {
            if self.nonbasic_flag[var] == 0 {
                self.nonbasic_move[var] = MOVE_NONE;
                continue;
            }
            self.nonbasic_move[var] = Self::move_for_bounds(
                (workspace.lower[var], workspace.upper[var]),
                Some(self.nonbasic_move[var]),
            );
        }
    }

    /// Set the working value of every nonbasic variable to the bound its move points away
    /// from, correcting invalid moves along the way.
    pub fn initialise_nonbasic_value_and_move(&mut self, workspace: &mut Workspace) {
        for var in 0..self.nonbasic_flag.len() {
            if self.nonbasic_flag[var] == 0 {
                self.nonbasic_move[var] = MOVE_NONE;
                continue;
            }
            let lower = workspace.lower[var];
            let upper = workspace.upper[var];
            let move_ = Self::move_for_bounds((lower, upper), Some(self.nonbasic_move[var]));
            self.nonbasic_move[var] = move_;
            workspace.value[var] = match move_ {
                MOVE_UP => lower,
                MOVE_DOWN => upper,
                _ => {
                    if lower == upper {
                        lower
                    } else {
                        0.0
                    }
                },
            };
        }
    }

    /// Toggle the bound a boxed nonbasic variable sits at.
    pub fn flip_bound(&mut self, workspace: &mut Workspace, var: usize) {
        debug_assert_eq!(self.nonbasic_flag[var], 1);
        debug_assert_ne!(self.nonbasic_move[var], MOVE_NONE);

        let move_ = -self.nonbasic_move[var];
        self.nonbasic_move[var] = move_;
        workspace.value[var] = if move_ == MOVE_UP {
            workspace.lower[var]
        } else {
            workspace.upper[var]
        };
    }

    /// Exchange basic and nonbasic variable after a pivot.
    ///
    /// The outgoing variable leaves towards the bound indicated by `move_out`: `-1` to its
    /// lower bound, `+1` to its upper bound (the direction it blocked in).
    ///
    /// # Return value
    ///
    /// The change in the updated dual objective value caused by the outgoing variable's new
    /// activity.
    pub fn update_pivots(
        &mut self,
        workspace: &mut Workspace,
        variable_in: usize,
        row_out: usize,
        move_out: i8,
    ) -> f64 {
        debug_assert!(row_out < self.basic_index.len());
        debug_assert_eq!(self.nonbasic_flag[variable_in], 1);

        let variable_out = self.basic_index[row_out];

        self.basic_index[row_out] = variable_in;
        self.nonbasic_flag[variable_in] = 0;
        self.nonbasic_move[variable_in] = MOVE_NONE;
        workspace.base_lower[row_out] = workspace.lower[variable_in];
        workspace.base_upper[row_out] = workspace.upper[variable_in];

        self.nonbasic_flag[variable_out] = 1;
        if workspace.lower[variable_out] == workspace.upper[variable_out] {
            workspace.value[variable_out] = workspace.lower[variable_out];
            self.nonbasic_move[variable_out] = MOVE_NONE;
        } else if move_out == MOVE_DOWN {
            workspace.value[variable_out] = workspace.lower[variable_out];
            self.nonbasic_move[variable_out] = MOVE_UP;
        } else {
            workspace.value[variable_out] = workspace.upper[variable_out];
            self.nonbasic_move[variable_out] = MOVE_DOWN;
        }

        workspace.value[variable_out] * workspace.dual[variable_out]
    }

    /// Repair rank deficiency reported by the factor: the logical of each missing pivot row
    /// replaces the basic variable at the corresponding deficient position. The factor already
    /// patched itself the same way, so basis and factor agree afterwards.
    pub fn handle_rank_deficiency(
        &mut self,
        num_col: usize,
        no_pivot_row: &[usize],
        no_pivot_col: &[usize],
    ) {
        debug_assert_eq!(no_pivot_row.len(), no_pivot_col.len());

        for (&row, &position) in no_pivot_row.iter().zip(no_pivot_col) {
            let variable_in = num_col + row;
            let variable_out = self.basic_index[position];
            self.basic_index[position] = variable_in;
            self.nonbasic_flag[variable_in] = 0;
            self.nonbasic_move[variable_in] = MOVE_NONE;
            self.nonbasic_flag[variable_out] = 1;
        }
    }

    /// Check the mutual-consistency invariants; used from debug assertions.
    pub fn is_consistent(&self) -> bool {
        let num_tot = self.nonbasic_flag.len();
        let num_basic_flags = self.nonbasic_flag.iter().filter(|&&flag| flag == 0).count();
        num_basic_flags == self.basic_index.len()
            && self.basic_index.iter().all(|&var| var < num_tot && self.nonbasic_flag[var] == 0)
            && self
                .basic_index
                .iter()
                .all(|&var| self.nonbasic_move[var] == MOVE_NONE)
    }
}

/// An externally supplied basis did not have one basic variable per row.
#[derive(Debug, Eq, PartialEq)]
pub struct InvalidBasisError {
    num_basic: usize,
    num_row: usize,
    dimensions_wrong: bool,
}

impl fmt::Display for InvalidBasisError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.dimensions_wrong {
            write!(f, "basis status vectors do not match the program dimensions")
        } else {
            write!(
                f,
                "basis has {} basic variables where exactly {} are required",
                self.num_basic, self.num_row,
            )
        }
    }
}

impl Error for InvalidBasisError {}

#[cfg(test)]
mod test {
    use crate::algorithm::simplex::basis::{BasisState, MOVE_DOWN, MOVE_NONE, MOVE_UP};
    use crate::algorithm::simplex::cost_bound::Workspace;
    use crate::data::linear_algebra::matrix::ColumnMatrix;
    use crate::data::linear_program::canonical_form::CanonicalLp;
    use crate::data::linear_program::elements::{Objective, VariableStatus};

    /// Two columns, one row; first column boxed [1, 2], second free.
    fn lp() -> CanonicalLp {
        CanonicalLp::new(
            1,
            2,
            ColumnMatrix::new(1, 2, vec![0, 1, 2], vec![0, 0], vec![1.0, 1.0]),
            vec![1.0, 0.0],
            vec![1.0, f64::NEG_INFINITY],
            vec![2.0, f64::INFINITY],
            vec![0.0],
            vec![4.0],
            Objective::Minimize,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn logical_basis_shape() {
        let lp = lp();
        let basis = BasisState::logical(&lp);
        assert!(basis.is_consistent());
        assert_eq!(basis.basic_index, vec![2]);
        // Boxed at the bound nearer zero, which is the lower bound 1.
        assert_eq!(basis.nonbasic_move[0], MOVE_UP);
        // Free variables rest at zero.
        assert_eq!(basis.nonbasic_move[1], MOVE_NONE);
    }

    #[test]
    fn external_round_trip() {
        let lp = lp();
        let mut basis = BasisState::logical(&lp);
        basis.nonbasic_move[0] = MOVE_DOWN;
        let external = basis.to_external(&lp);
        assert_eq!(external.col_status[0], VariableStatus::Upper);
        assert_eq!(external.row_status[0], VariableStatus::Basic);

        let restored = BasisState::from_external(&lp, &external).unwrap();
        assert_eq!(restored, basis);
    }

    #[test]
    fn cardinality_is_validated() {
        let lp = lp();
        let mut external = BasisState::logical(&lp).to_external(&lp);
        external.row_status[0] = VariableStatus::Upper;
        assert!(BasisState::from_external(&lp, &external).is_err());
    }

    #[test]
    fn pivot_moves_outgoing_to_blocking_bound(){
        let lp = lp();
        let mut basis = BasisState::logical(&lp);
        let mut workspace = Workspace::new(2, 1);
        workspace.lower = vec![1.0, f64::NEG_INFINITY, -4.0];
        workspace.upper = vec![2.0, f64::INFINITY, 0.0];
        workspace.value = vec![1.0, 0.0, 0.0];
        workspace.dual = vec![0.5, 0.0, -0.25];

        let objective_change = basis.update_pivots(&mut workspace, 0, 0, MOVE_DOWN);
        assert!(basis.is_consistent());
        assert_eq!(basis.basic_index, vec![0]);
        assert_eq!(basis.nonbasic_flag[0], 0);
        assert_eq!(basis.nonbasic_flag[2], 1);
        // The logical left downwards, so it now sits at its lower bound.
        assert_eq!(basis.nonbasic_move[2], MOVE_UP);
        assert_eq!(workspace.value[2], -4.0);
        assert_eq!(objective_change, -4.0 * -0.25);
        assert_eq!(workspace.base_lower[0], 1.0);
        assert_eq!(workspace.base_upper[0], 2.0);
    }

    #[test]
    fn rank_deficiency_swaps_in_logicals() {
        let lp = lp();
        let mut basis = BasisState::logical(&lp);
        // Make the structural column basic in place of the logical.
        basis.basic_index[0] = 0;
        basis.nonbasic_flag[0] = 0;
        basis.nonbasic_move[0] = MOVE_NONE;
        basis.nonbasic_flag[2] = 1;

        basis.handle_rank_deficiency(2, &[0], &[0]);
        assert!(basis.is_consistent());
        assert_eq!(basis.basic_index, vec![2]);
        assert_eq!(basis.nonbasic_flag[0], 1);
    }
}
