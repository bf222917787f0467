//! # The revised simplex engine
//!
//! The solver owns the canonical program it was handed, a basis, working copies of costs and
//! bounds, an invertible representation of the basis matrix and the pricing weights. The dual
//! and primal drivers are functions over this state: they borrow the solver mutably, pivot it
//! towards feasibility and record a model status. Everything the two drivers share (value and
//! dual recomputation, rebuild with backtracking, PRICE dispatch, budget bailout, dual
//! correction) lives here.
use std::error::Error;
use std::fmt;
use std::time::Instant;

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::algorithm::simplex::basis::{BasisState, InvalidBasisError, MOVE_DOWN, MOVE_UP};
use crate::algorithm::simplex::cost_bound::{initialise_bound, initialise_cost, Workspace};
use crate::algorithm::simplex::factor::Factor;
use crate::algorithm::simplex::infeasibility::{
    dual_infeasibility, dual_objective_value, primal_infeasibility, primal_objective_value,
    InfeasibilityMeasure,
};
use crate::algorithm::simplex::options::{
    Options, PriceStrategy, Strategy, MAX_PIVOT_THRESHOLD, PIVOT_THRESHOLD_CHANGE_FACTOR,
};
use crate::algorithm::simplex::pricing::DualPricing;
use crate::data::linear_algebra::matrix::{
    RowMatrix, COLUMN_PRICE_DENSITY, ROW_PRICE_SWITCH_DENSITY,
};
use crate::data::linear_algebra::vector::WorkVector;
use crate::data::linear_program::canonical_form::CanonicalLp;
use crate::data::linear_program::elements::{ModelStatus, SolveStatus};
use crate::data::linear_program::solution::{ExternalBasis, Solution};

pub mod basis;
pub mod cost_bound;
pub mod dual;
pub mod factor;
pub mod infeasibility;
pub mod options;
pub mod pricing;
pub mod primal;
pub mod ratio_test;

/// Which of the two drivers is running; decides how costs and bounds are initialised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimplexAlgorithm {
    Primal,
    Dual,
}

/// Phase of the running driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    One,
    Two,
}

/// Pivot elements computed through the column and through the row must agree to within this
/// relative tolerance; disagreement forces a refactorization.
pub(crate) const NUMERICAL_TROUBLE_TOLERANCE: f64 = 1e-7;
/// Bound on the refactorization cycles spent on one persistent numerical problem.
const MAX_NUMERICAL_RECOVERIES: usize = 16;

/// Errors of the solver interface; budget conditions are statuses, not errors.
#[derive(Debug)]
pub enum SolveError {
    /// No program was installed before the call.
    NoProgram,
    /// An externally supplied basis was rejected.
    InvalidBasis(InvalidBasisError),
    /// A basis was required (`only_from_known_basis`) but none is known, or it is singular.
    UnusableBasis,
    /// Numerical recovery failed repeatedly; the best known basis is preserved.
    NumericalFailure,
    /// An internal invariant was violated.
    Internal(&'static str),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoProgram => write!(f, "no linear program has been passed to the solver"),
            Self::InvalidBasis(error) => error.fmt(f),
            Self::UnusableBasis => {
                write!(f, "a known nonsingular basis is required but not available")
            },
            Self::NumericalFailure => {
                write!(f, "numerical recovery failed; returning the best known basis")
            },
            Self::Internal(what) => write!(f, "internal error: {}", what),
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBasis(error) => Some(error),
            _ => None,
        }
    }
}

impl From<InvalidBasisError> for SolveError {
    fn from(error: InvalidBasisError) -> Self {
        Self::InvalidBasis(error)
    }
}

/// A saved nonsingular basis to fall back to when a refactorization fails.
#[derive(Clone, Debug)]
pub(crate) struct BacktrackingBasis {
    basis: BasisState,
    costs_perturbed: bool,
    bounds_perturbed: bool,
    shift: Vec<f64>,
    /// Dual edge weights scattered by basic variable, so the restored basis can gather them
    /// whatever its ordering.
    edge_weights: Option<Vec<f64>>,
}

/// The revised simplex solver.
pub struct SimplexSolver {
    pub(crate) options: Options,
    pub(crate) lp: Option<CanonicalLp>,
    pub(crate) basis: Option<BasisState>,
    pub(crate) workspace: Workspace,
    pub(crate) row_matrix: Option<RowMatrix>,
    pub(crate) factor: Option<Factor>,
    random: ChaCha8Rng,
    pub(crate) random_value: Vec<f64>,

    pub(crate) model_status: ModelStatus,
    pub(crate) solve_status: SolveStatus,
    pub(crate) iteration_count: u64,
    /// Working copy of the update limit; halved on backtracking, restored on fresh builds.
    pub(crate) update_limit: usize,
    pub(crate) pivot_threshold: f64,
    pub(crate) costs_perturbed: bool,
    pub(crate) bounds_perturbed: bool,
    pub(crate) allow_cost_perturbation: bool,
    pub(crate) allow_bound_perturbation: bool,
    pub(crate) primal_measure: InfeasibilityMeasure,
    pub(crate) dual_measure: InfeasibilityMeasure,
    pub(crate) primal_objective: f64,
    pub(crate) dual_objective: f64,
    pub(crate) backtracking: Option<BacktrackingBasis>,
    pub(crate) numerical_recoveries: usize,
    pub(crate) primal_ray: Option<Vec<f64>>,
    pub(crate) dual_ray: Option<Vec<f64>>,
    pub(crate) solve_started: Option<Instant>,

    // Running averages of result densities, steering the sparse/dense choices.
    pub(crate) col_aq_density: f64,
    pub(crate) row_ep_density: f64,
    pub(crate) row_ap_density: f64,
}

impl SimplexSolver {
    #[must_use]
    pub fn new(options: Options) -> Self {
        let random = ChaCha8Rng::seed_from_u64(options.random_seed);
        Self {
            update_limit: options.update_limit,
            pivot_threshold: options.factor_pivot_threshold,
            options,
            lp: None,
            basis: None,
            workspace: Workspace::new(0, 0),
            row_matrix: None,
            factor: None,
            random,
            random_value: Vec::new(),
            model_status: ModelStatus::NotSet,
            solve_status: SolveStatus::Ok,
            iteration_count: 0,
            costs_perturbed: false,
            bounds_perturbed: false,
            allow_cost_perturbation: true,
            allow_bound_perturbation: true,
            primal_measure: InfeasibilityMeasure::default(),
            dual_measure: InfeasibilityMeasure::default(),
            primal_objective: 0.0,
            dual_objective: 0.0,
            backtracking: None,
            numerical_recoveries: 0,
            primal_ray: None,
            dual_ray: None,
            solve_started: None,
            col_aq_density: 0.0,
            row_ep_density: 0.0,
            row_ap_density: 0.0,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Install a new program. Any prior basis, factor and work arrays are invalidated.
    pub fn pass_lp(&mut self, lp: CanonicalLp) {
        self.random = ChaCha8Rng::seed_from_u64(self.options.random_seed);
        self.random_value = (0..lp.num_tot()).map(|_| self.random.gen::<f64>()).collect();
        self.workspace = Workspace::new(lp.num_col(), lp.num_row());
        self.lp = Some(lp);
        self.basis = None;
        self.row_matrix = None;
        self.factor = None;
        self.backtracking = None;
        self.model_status = ModelStatus::NotSet;
        self.solve_status = SolveStatus::Ok;
        self.iteration_count = 0;
        self.update_limit = self.options.update_limit;
        self.pivot_threshold = self.options.factor_pivot_threshold;
        self.costs_perturbed = false;
        self.bounds_perturbed = false;
        self.primal_ray = None;
        self.dual_ray = None;
    }

    /// Install the logical basis.
    pub fn set_logical_basis(&mut self) -> Result<(), SolveError> {
        let lp = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        self.basis = Some(BasisState::logical(lp));
        self.factor = None;
        self.row_matrix = None;
        self.backtracking = None;
        Ok(())
    }

    /// Install an externally supplied basis.
    pub fn set_basis(&mut self, external: &ExternalBasis) -> Result<(), SolveError> {
        let lp = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        self.basis = Some(BasisState::from_external(lp, external)?);
        self.factor = None;
        self.row_matrix = None;
        self.backtracking = None;
        Ok(())
    }

    /// Make sure a basis and a factorization of it exist.
    ///
    /// Without a basis, a logical one is generated unless `only_from_known_basis` forbids it.
    /// A rank-deficient basis is repaired by swapping the unfound pivot columns for the
    /// logicals of the missing pivot rows, unless `only_from_known_basis` demands the basis
    /// be usable as-is.
    pub fn initialise_basis_and_factor(
        &mut self,
        only_from_known_basis: bool,
    ) -> Result<(), SolveError> {
        let lp = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        if self.basis.is_none() {
            if only_from_known_basis {
                return Err(SolveError::UnusableBasis);
            }
            self.basis = Some(BasisState::logical(lp));
        }
        let deficiency = self.compute_factor();
        if deficiency > 0 {
            if only_from_known_basis {
                return Err(SolveError::UnusableBasis);
            }
            self.repair_rank_deficiency();
        }
        Ok(())
    }

    /// Solve the installed program with the driver selected by the options.
    ///
    /// # Return value
    ///
    /// The model status reached. Budget trips are statuses (`IterationLimit`, `TimeLimit`)
    /// combined with a `Warning` solve status, not errors.
    pub fn solve(&mut self) -> Result<ModelStatus, SolveError> {
        self.solve_started = Some(Instant::now());
        self.solve_status = SolveStatus::Ok;
        self.iteration_count = 0;
        self.primal_ray = None;
        self.dual_ray = None;
        self.allow_cost_perturbation = true;
        self.allow_bound_perturbation = true;
        self.numerical_recoveries = 0;

        self.initialise_for_solve()?;
        if self.model_status == ModelStatus::Optimal {
            return Ok(self.model_status);
        }

        let strategy = match self.options.strategy {
            Strategy::Choose => {
                if self.primal_measure.num > 0 {
                    Strategy::Dual
                } else {
                    Strategy::Primal
                }
            },
            other => other,
        };

        match strategy {
            Strategy::Primal => {
                debug!("using the primal simplex driver");
                primal::solve(self)?;
            },
            _ => {
                debug!("using the dual simplex driver (serial)");
                dual::solve(self)?;
                if self.model_status == ModelStatus::UnboundedOrInfeasible {
                    // The dual driver proved dual unboundedness but could not tell primal
                    // infeasibility from unboundedness; a primal run distinguishes them.
                    debug!("distinguishing unbounded from infeasible with the primal driver");
                    primal::solve(self)?;
                    if self.model_status == ModelStatus::NotSet {
                        self.model_status = ModelStatus::UnboundedOrInfeasible;
                    }
                }
            },
        }

        if self.model_status == ModelStatus::NotSet {
            self.cleanup()?;
        }
        match self.model_status {
            ModelStatus::IterationLimit | ModelStatus::TimeLimit | ModelStatus::NotSet => {
                self.solve_status = SolveStatus::Warning;
            },
            _ => {},
        }
        debug!(
            "solve finished: {:?} after {} iterations, {} primal and {} dual infeasibilities",
            self.model_status,
            self.iteration_count,
            self.primal_measure.num,
            self.dual_measure.num,
        );
        Ok(self.model_status)
    }

    /// Remove residual one-sided infeasibility with the opposite driver, perturbation
    /// disabled.
    fn cleanup(&mut self) -> Result<(), SolveError> {
        if self.primal_measure.num > 0 && self.dual_measure.num == 0 {
            debug!("cleanup: dual simplex with perturbation disabled");
            self.allow_cost_perturbation = false;
            dual::solve(self)?;
        } else if self.dual_measure.num > 0 && self.primal_measure.num == 0 {
            debug!("cleanup: primal simplex with perturbation disabled");
            self.allow_bound_perturbation = false;
            primal::solve(self)?;
        }
        Ok(())
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model_status
    }

    pub fn status(&self) -> SolveStatus {
        self.solve_status
    }

    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }

    pub fn primal_infeasibilities(&self) -> InfeasibilityMeasure {
        self.primal_measure
    }

    pub fn dual_infeasibilities(&self) -> InfeasibilityMeasure {
        self.dual_measure
    }

    /// A direction of unbounded primal improvement over the structural variables, when the
    /// last solve proved unboundedness.
    pub fn primal_ray(&self) -> Option<&[f64]> {
        self.primal_ray.as_deref()
    }

    /// A row-space certificate of primal infeasibility, when the last solve proved
    /// infeasibility.
    pub fn dual_ray(&self) -> Option<&[f64]> {
        self.dual_ray.as_deref()
    }

    /// Primal and dual values in the original row/column convention.
    pub fn solution(&self) -> Option<Solution> {
        let lp = self.lp.as_ref()?;
        let basis = self.basis.as_ref()?;
        let num_col = lp.num_col();
        let num_row = lp.num_row();

        // Scatter the basic values and zero the basic duals on local copies.
        let mut value = self.workspace.value.clone();
        let mut dual = self.workspace.dual.clone();
        for (row, &var) in basis.basic_index.iter().enumerate() {
            value[var] = self.workspace.base_value[row];
            dual[var] = 0.0;
        }

        let sense = lp.sense().sign();
        Some(Solution {
            col_value: value[..num_col].to_vec(),
            col_dual: (0..num_col).map(|j| sense * dual[j]).collect(),
            row_value: (0..num_row).map(|i| -value[num_col + i]).collect(),
            row_dual: (0..num_row).map(|i| sense * dual[num_col + i]).collect(),
            objective_value: self.primal_objective,
            num_primal_infeasibility: self.primal_measure.num,
            max_primal_infeasibility: self.primal_measure.max,
            sum_primal_infeasibility: self.primal_measure.sum,
            num_dual_infeasibility: self.dual_measure.num,
            max_dual_infeasibility: self.dual_measure.max,
            sum_dual_infeasibility: self.dual_measure.sum,
        })
    }

    /// The current basis in the external convention.
    pub fn basis(&self) -> Option<ExternalBasis> {
        let lp = self.lp.as_ref()?;
        self.basis.as_ref().map(|basis| basis.to_external(lp))
    }

    /// Replace the program by one with additional columns (appended last, before the
    /// logicals). The basis keeps every existing variable; new columns start nonbasic.
    pub fn add_cols(&mut self, lp: CanonicalLp) -> Result<(), SolveError> {
        let old = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        if lp.num_row() != old.num_row() || lp.num_col() < old.num_col() {
            return Err(SolveError::Internal("column addition changed the row dimension"));
        }
        let old_num_col = old.num_col();
        let shift = lp.num_col() - old_num_col;
        if let Some(basis) = &mut self.basis {
            for var in &mut basis.basic_index {
                if *var >= old_num_col {
                    *var += shift;
                }
            }
            let logical_flag = basis.nonbasic_flag.split_off(old_num_col);
            let logical_move = basis.nonbasic_move.split_off(old_num_col);
            for var in old_num_col..lp.num_col() {
                let (lower, upper) = lp.bounds(var);
                basis.nonbasic_flag.push(1);
                basis.nonbasic_move.push(if lower == upper {
                    0
                } else if lower.is_finite() {
                    MOVE_UP
                } else if upper.is_finite() {
                    MOVE_DOWN
                } else {
                    0
                });
            }
            basis.nonbasic_flag.extend(logical_flag);
            basis.nonbasic_move.extend(logical_move);
        }
        self.install_resized(lp);
        Ok(())
    }

    /// Replace the program by one with additional rows (appended last). The new logicals
    /// enter the basis.
    pub fn add_rows(&mut self, lp: CanonicalLp) -> Result<(), SolveError> {
        let old = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        if lp.num_col() != old.num_col() || lp.num_row() < old.num_row() {
            return Err(SolveError::Internal("row addition changed the column dimension"));
        }
        let old_num_row = old.num_row();
        if let Some(basis) = &mut self.basis {
            for row in old_num_row..lp.num_row() {
                let var = lp.num_col() + row;
                basis.nonbasic_flag.push(0);
                basis.nonbasic_move.push(0);
                basis.basic_index.push(var);
            }
        }
        self.install_resized(lp);
        Ok(())
    }

    /// Replace the program by one with the columns `deleted` (sorted) removed. Deleting a
    /// basic column discards the basis.
    pub fn delete_cols(&mut self, lp: CanonicalLp, deleted: &[usize]) -> Result<(), SolveError> {
        debug_assert!(deleted.windows(2).all(|w| w[0] < w[1]));
        let old = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        let old_num_col = old.num_col();
        if let Some(basis) = self.basis.take() {
            let any_basic_deleted =
                deleted.iter().any(|&var| var < old_num_col && basis.nonbasic_flag[var] == 0);
            if !any_basic_deleted {
                self.basis = Some(Self::remap_deleted(basis, deleted));
            }
        }
        self.install_resized(lp);
        Ok(())
    }

    /// Replace the program by one with the rows `deleted` (sorted) removed. Deleting a row
    /// whose logical is nonbasic discards the basis.
    pub fn delete_rows(&mut self, lp: CanonicalLp, deleted: &[usize]) -> Result<(), SolveError> {
        debug_assert!(deleted.windows(2).all(|w| w[0] < w[1]));
        let old = self.lp.as_ref().ok_or(SolveError::NoProgram)?;
        let old_num_col = old.num_col();
        if let Some(basis) = self.basis.take() {
            let any_logical_nonbasic = deleted
                .iter()
                .any(|&row| basis.nonbasic_flag[old_num_col + row] == 1);
            if !any_logical_nonbasic {
                let deleted_vars: Vec<usize> =
                    deleted.iter().map(|&row| old_num_col + row).collect();
                self.basis = Some(Self::remap_deleted(basis, &deleted_vars));
            }
        }
        self.install_resized(lp);
        Ok(())
    }

    /// Rebuild a basis after variable deletion: surviving variables keep their status, the
    /// indices compact.
    fn remap_deleted(basis: BasisState, deleted: &[usize]) -> BasisState {
        let old_num_tot = basis.nonbasic_flag.len();
        let mut new_index = vec![usize::MAX; old_num_tot];
        let mut kept = 0;
        let mut cursor = 0;
        for var in 0..old_num_tot {
            if cursor < deleted.len() && deleted[cursor] == var {
                cursor += 1;
                continue;
            }
            new_index[var] = kept;
            kept += 1;
        }

        let mut nonbasic_flag = Vec::with_capacity(kept);
        let mut nonbasic_move = Vec::with_capacity(kept);
        for var in 0..old_num_tot {
            if new_index[var] != usize::MAX {
                nonbasic_flag.push(basis.nonbasic_flag[var]);
                nonbasic_move.push(basis.nonbasic_move[var]);
            }
        }
        let basic_index = basis
            .basic_index
            .iter()
            .filter(|&&var| new_index[var] != usize::MAX)
            .map(|&var| new_index[var])
            .collect();
        BasisState { basic_index, nonbasic_flag, nonbasic_move }
    }

    /// Common tail of the resizing operations: the factor, matrix views and work arrays
    /// depend on the dimensions and are dropped; the random values are regenerated.
    fn install_resized(&mut self, lp: CanonicalLp) {
        self.random = ChaCha8Rng::seed_from_u64(self.options.random_seed);
        self.random_value = (0..lp.num_tot()).map(|_| self.random.gen::<f64>()).collect();
        self.workspace = Workspace::new(lp.num_col(), lp.num_row());
        self.lp = Some(lp);
        self.row_matrix = None;
        self.factor = None;
        self.backtracking = None;
        self.model_status = ModelStatus::NotSet;
    }

    // ------------------------------------------------------------------
    // Shared machinery of the two drivers.
    // ------------------------------------------------------------------

    pub(crate) fn lp_ref(&self) -> &CanonicalLp {
        self.lp.as_ref().expect("a program is installed at this point")
    }

    pub(crate) fn basis_ref(&self) -> &BasisState {
        self.basis.as_ref().expect("a basis is installed at this point")
    }

    /// Build the factor for the current basis; returns the rank deficiency.
    pub(crate) fn compute_factor(&mut self) -> usize {
        let lp = self.lp.as_ref().expect("a program is installed at this point");
        let basis = self.basis.as_ref().expect("a basis is installed at this point");
        let pivot_threshold = self.pivot_threshold;
        let pivot_tolerance = self.options.factor_pivot_tolerance;
        let factor = self
            .factor
            .get_or_insert_with(|| Factor::setup(lp.num_row(), pivot_threshold, pivot_tolerance));
        factor.set_pivot_threshold(pivot_threshold);
        factor.build(lp.columns(), &basis.basic_index)
    }

    /// Apply the factor's rank-deficiency repair to the basis and refresh the dependent
    /// state.
    pub(crate) fn repair_rank_deficiency(&mut self) {
        let factor = self.factor.as_ref().expect("factor exists after compute_factor");
        let no_pivot_row = factor.no_pivot_row().to_vec();
        let no_pivot_col = factor.no_pivot_col().to_vec();
        let num_col = self.lp_ref().num_col();
        let basis = self.basis.as_mut().expect("a basis is installed at this point");
        basis.handle_rank_deficiency(num_col, &no_pivot_row, &no_pivot_col);
        self.row_matrix = None;
        debug!("repaired rank deficiency of {} by logical swaps", no_pivot_row.len());
    }

    /// Prepare all working state for a solve and classify the starting point.
    pub(crate) fn initialise_for_solve(&mut self) -> Result<(), SolveError> {
        self.initialise_basis_and_factor(false)?;
        let lp = self.lp.as_ref().expect("a program is installed at this point");
        if self.workspace.cost.len() != lp.num_tot() {
            self.workspace = Workspace::new(lp.num_col(), lp.num_row());
        }

        let basis = self.basis.as_mut().expect("a basis is installed at this point");
        initialise_cost(
            &mut self.workspace,
            lp,
            SimplexAlgorithm::Primal,
            false,
            0.0,
            &self.random_value,
        );
        initialise_bound(
            &mut self.workspace,
            lp,
            basis,
            SimplexAlgorithm::Primal,
            Phase::Two,
            false,
            0.0,
            &self.random_value,
        );
        self.costs_perturbed = false;
        self.bounds_perturbed = false;
        basis.set_nonbasic_move(&self.workspace);
        basis.initialise_nonbasic_value_and_move(&mut self.workspace);

        self.ensure_row_matrix();
        self.compute_primal_values();
        self.compute_duals();
        self.compute_measures(Phase::Two);

        self.model_status = if self.primal_measure.num == 0 && self.dual_measure.num == 0 {
            ModelStatus::Optimal
        } else {
            ModelStatus::NotSet
        };
        Ok(())
    }

    /// Recompute the values of the basic variables from scratch: FTRAN of the nonbasic
    /// activity, negated.
    pub(crate) fn compute_primal_values(&mut self) {
        let lp = self.lp.as_ref().expect("a program is installed at this point");
        let basis = self.basis.as_ref().expect("a basis is installed at this point");
        let factor = self.factor.as_mut().expect("a factor is installed at this point");
        let num_row = lp.num_row();

        let mut buffer = WorkVector::new(num_row);
        for var in 0..lp.num_tot() {
            if basis.nonbasic_flag[var] == 1 && self.workspace.value[var] != 0.0 {
                lp.columns().collect_column(&mut buffer, var, self.workspace.value[var]);
            }
        }
        if buffer.count() > 0 {
            factor.ftran(&mut buffer, 1.0);
        }
        for (row, &var) in basis.basic_index.iter().enumerate() {
            self.workspace.base_value[row] = -buffer.get(row);
            self.workspace.base_lower[row] = self.workspace.lower[var];
            self.workspace.base_upper[row] = self.workspace.upper[var];
        }
    }

    /// Recompute all reduced costs from scratch: BTRAN of the basic costs, PRICEd over the
    /// structural columns.
    pub(crate) fn compute_duals(&mut self) {
        let lp = self.lp.as_ref().expect("a program is installed at this point");
        let basis = self.basis.as_ref().expect("a basis is installed at this point");
        let factor = self.factor.as_mut().expect("a factor is installed at this point");
        let num_col = lp.num_col();
        let num_row = lp.num_row();

        let mut pi = WorkVector::new(num_row);
        for (row, &var) in basis.basic_index.iter().enumerate() {
            let cost = self.workspace.cost[var] + self.workspace.shift[var];
            if cost != 0.0 {
                pi.add(row, cost);
            }
        }
        for var in 0..lp.num_tot() {
            self.workspace.dual[var] = self.workspace.cost[var] + self.workspace.shift[var];
        }
        if pi.count() > 0 {
            factor.btran(&mut pi, 1.0);
            let mut row_ap = WorkVector::new(num_col);
            lp.columns().price_by_column(&mut row_ap, &pi);
            for var in 0..num_col {
                self.workspace.dual[var] -= row_ap.get(var);
            }
            for row in 0..num_row {
                self.workspace.dual[num_col + row] -= pi.get(row);
            }
        }
    }

    /// Refresh the infeasibility measures and both objective values.
    pub(crate) fn compute_measures(&mut self, phase: Phase) {
        let lp = self.lp.as_ref().expect("a program is installed at this point");
        let basis = self.basis.as_ref().expect("a basis is installed at this point");
        self.primal_measure = primal_infeasibility(
            &self.workspace,
            basis,
            self.options.primal_feasibility_tolerance,
        );
        self.dual_measure =
            dual_infeasibility(&self.workspace, basis, self.options.dual_feasibility_tolerance);
        self.primal_objective = primal_objective_value(lp, &self.workspace, basis);
        self.dual_objective = dual_objective_value(lp, &self.workspace, basis, phase);
    }

    /// Restore dual feasibility of the nonbasic variables in place: boxed violators flip to
    /// their other bound (exact), one-sided violators get their cost shifted just past
    /// feasibility when perturbation is allowed.
    ///
    /// # Return value
    ///
    /// `false` when a shift was needed but not allowed; the caller must change strategy.
    pub(crate) fn correct_dual(&mut self) -> bool {
        let tolerance = self.options.dual_feasibility_tolerance;
        let num_tot = self.lp_ref().num_tot();
        let basis = self.basis.as_mut().expect("a basis is installed at this point");
        let mut num_flip = 0;
        let mut num_shift = 0;
        for var in 0..num_tot {
            if basis.nonbasic_flag[var] != 1 {
                continue;
            }
            let move_ = basis.nonbasic_move[var];
            if move_ == 0 {
                continue;
            }
            if f64::from(move_) * self.workspace.dual[var] > -tolerance {
                continue;
            }
            let boxed =
                self.workspace.lower[var].is_finite() && self.workspace.upper[var].is_finite();
            if boxed {
                basis.flip_bound(&mut self.workspace, var);
                num_flip += 1;
            } else if self.allow_cost_perturbation {
                // Shift the cost by the smallest amount taking the dual just past feasible.
                let target = f64::from(move_) * (1.0 + self.random.gen::<f64>()) * tolerance;
                let shift = target - self.workspace.dual[var];
                self.workspace.shift[var] += shift;
                self.workspace.dual[var] = target;
                self.costs_perturbed = true;
                num_shift += 1;
            } else {
                return false;
            }
        }
        if num_flip > 0 || num_shift > 0 {
            debug!("dual correction: {} bound flips, {} cost shifts", num_flip, num_shift);
        }
        true
    }

    /// Save the current (nonsingular) basis as the backtracking target.
    pub(crate) fn save_backtracking(&mut self, pricing: Option<&DualPricing>) {
        let basis = self.basis.as_ref().expect("a basis is installed at this point");
        let edge_weights = pricing.map(|pricing| {
            let mut scattered = vec![0.0; self.lp_ref().num_tot()];
            for (row, &var) in basis.basic_index.iter().enumerate() {
                scattered[var] = pricing.weights()[row];
            }
            scattered
        });
        self.backtracking = Some(BacktrackingBasis {
            basis: basis.clone(),
            costs_perturbed: self.costs_perturbed,
            bounds_perturbed: self.bounds_perturbed,
            shift: self.workspace.shift.clone(),
            edge_weights,
        });
    }

    /// Refactorize, falling back to the last saved nonsingular basis on rank deficiency.
    ///
    /// On a successful build the current basis becomes the new backtracking target and the
    /// update limit returns to its option value. On a deficient build the saved basis is
    /// restored (with its perturbation state, shifts and edge weights) and the update limit
    /// is halved so the trouble spot is approached more carefully.
    pub(crate) fn get_nonsingular_inverse(
        &mut self,
        mut pricing: Option<&mut DualPricing>,
    ) -> Result<(), SolveError> {
        let update_count = self.factor.as_ref().map_or(0, Factor::update_count);
        let deficiency = self.compute_factor();
        if deficiency == 0 {
            self.save_backtracking(pricing.as_deref());
            self.update_limit = self.options.update_limit;
            return Ok(());
        }

        let snapshot = self.backtracking.take().ok_or(SolveError::NumericalFailure)?;
        debug!("rank deficiency of {} after {} updates; backtracking", deficiency, update_count);
        self.basis = Some(snapshot.basis);
        self.costs_perturbed = snapshot.costs_perturbed;
        self.bounds_perturbed = snapshot.bounds_perturbed;
        self.workspace.shift = snapshot.shift;
        self.row_matrix = None;
        if self.compute_factor() > 0 {
            // The saved basis factorized before; it failing now is unrecoverable.
            return Err(SolveError::NumericalFailure);
        }
        if let (Some(pricing), Some(weights)) = (pricing.as_deref_mut(), snapshot.edge_weights) {
            let basis = self.basis.as_ref().expect("basis restored above");
            for (row, &var) in basis.basic_index.iter().enumerate() {
                pricing.weights_mut()[row] = weights[var];
            }
        }
        if update_count <= 1 {
            return Err(SolveError::NumericalFailure);
        }
        self.update_limit = (update_count / 2).max(1);
        debug!("update limit reduced to {}", self.update_limit);
        self.save_backtracking(pricing.as_deref());
        Ok(())
    }

    /// Rebuild the row-wise matrix if a basis change outside the incremental path (repair,
    /// backtracking) invalidated it.
    pub(crate) fn ensure_row_matrix(&mut self) {
        if self.row_matrix.is_none() {
            let lp = self.lp.as_ref().expect("a program is installed at this point");
            let basis = self.basis.as_ref().expect("a basis is installed at this point");
            self.row_matrix = Some(RowMatrix::new(lp.columns(), &basis.nonbasic_flag));
        }
    }

    /// PRICE the tableau row from the BTRANed unit row, by the strategy in the options.
    pub(crate) fn price_row(&mut self, row_ep: &WorkVector, row_ap: &mut WorkVector) {
        let lp = self.lp.as_ref().expect("a program is installed at this point");
        let basis = self.basis.as_ref().expect("a basis is installed at this point");
        let row_matrix = self.row_matrix.as_ref().expect("row matrix maintained");
        let num_col = lp.num_col();

        let ep_density = row_ep.density();
        let use_col_price = match self.options.price {
            PriceStrategy::Col => true,
            PriceStrategy::RowSwitchColSwitch => ep_density > COLUMN_PRICE_DENSITY,
            _ => false,
        };
        if use_col_price {
            lp.columns().price_by_column(row_ap, row_ep);
            // Column-wise PRICE fills components of basic columns; they are meaningless and
            // must be zeroed.
            for var in 0..num_col {
                if basis.nonbasic_flag[var] == 0 {
                    row_ap.set(var, 0.0);
                }
            }
        } else if self.options.price == PriceStrategy::Row {
            row_matrix.price(row_ap, row_ep);
        } else {
            row_matrix.price_with_switch(row_ap, row_ep, ROW_PRICE_SWITCH_DENSITY);
        }
        Self::record_density(&mut self.row_ap_density, row_ap);
    }

    /// Fold a result density into a running average.
    pub(crate) fn record_density(average: &mut f64, result: &WorkVector) {
        *average = 0.95 * *average + 0.05 * result.density();
    }

    /// Check the agreement between the pivot element seen in the FTRANed column and in the
    /// PRICEd row. Disagreement is numerical trouble: the factorization must be refreshed
    /// and, when the trouble struck early, the Markowitz threshold grows.
    ///
    /// # Return value
    ///
    /// Whether the pivot must be rejected and the basis refactorized.
    pub(crate) fn reinvert_on_numerical_trouble(&mut self, alpha_col: f64, alpha_row: f64) -> bool {
        let min_alpha = f64::min(alpha_col.abs(), alpha_row.abs());
        let measure = (alpha_col.abs() - alpha_row.abs()).abs() / min_alpha;
        let update_count = self.factor.as_ref().map_or(0, Factor::update_count);
        let trouble = measure > NUMERICAL_TROUBLE_TOLERANCE && update_count > 0;
        if trouble {
            debug!(
                "pivot disagreement {:.2e} between column {:.6e} and row {:.6e}; refactorizing",
                measure, alpha_col, alpha_row,
            );
            if self.pivot_threshold < MAX_PIVOT_THRESHOLD && update_count < 10 {
                self.pivot_threshold =
                    f64::min(self.pivot_threshold * PIVOT_THRESHOLD_CHANGE_FACTOR, MAX_PIVOT_THRESHOLD);
                debug!("Markowitz threshold increased to {}", self.pivot_threshold);
            }
        }
        trouble
    }

    /// Whether numerical recovery attempts are exhausted.
    pub(crate) fn numerical_recovery_exhausted(&self) -> bool {
        self.numerical_recoveries > MAX_NUMERICAL_RECOVERIES
    }

    /// Check the iteration and wall-clock budgets; on a trip, record the limit status.
    ///
    /// # Return value
    ///
    /// Whether the driver must bail out. The basis state remains valid and the solve can be
    /// resumed.
    pub(crate) fn bailout(&mut self) -> bool {
        if self.iteration_count >= self.options.iteration_limit {
            self.model_status = ModelStatus::IterationLimit;
            return true;
        }
        if let Some(started) = self.solve_started {
            if started.elapsed().as_secs_f64() >= self.options.time_limit {
                self.model_status = ModelStatus::TimeLimit;
                return true;
            }
        }
        false
    }
}
