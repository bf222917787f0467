//! # Solver options
//!
//! The option values the core recognizes, with their defaults. Parsing and plumbing of user
//! option files is the caller's concern; this struct is plain data.
#![allow(missing_docs)]

/// Which driver runs the solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Dual simplex unless the current basis is primal feasible.
    #[default]
    Choose,
    Dual,
    Primal,
    /// Task-parallel dual simplex; executes the serial dual path in this implementation.
    DualTasks,
    /// Multi-pivot parallel dual simplex; executes the serial dual path in this
    /// implementation.
    DualMulti,
}

/// Edge weight scheme of the dual driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DualEdgeWeight {
    #[default]
    Choose,
    Dantzig,
    Devex,
    SteepestEdge,
    SteepestEdgeToDevex,
}

/// How PRICE computes the tableau row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PriceStrategy {
    /// Always column-wise.
    Col,
    /// Always hyper-sparse row-wise.
    Row,
    /// Row-wise, switching to dense bookkeeping when the result fills in.
    RowSwitch,
    /// Row-wise with the density switch, and column-wise for dense BTRAN results.
    #[default]
    RowSwitchColSwitch,
}

/// Option values of the simplex core.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub strategy: Strategy,
    pub dual_edge_weight: DualEdgeWeight,
    pub price: PriceStrategy,
    pub primal_feasibility_tolerance: f64,
    pub dual_feasibility_tolerance: f64,
    /// Scale of dual cost perturbation; zero disables it.
    pub dual_cost_perturbation_multiplier: f64,
    /// Scale of primal bound perturbation; zero disables it.
    pub primal_bound_perturbation_multiplier: f64,
    /// Relative Markowitz threshold of the factorization.
    pub factor_pivot_threshold: f64,
    /// Absolute smallest acceptable pivot magnitude of the factorization.
    pub factor_pivot_tolerance: f64,
    /// Product-form updates allowed before a forced refactorization.
    pub update_limit: usize,
    pub iteration_limit: u64,
    /// Wall-clock budget in seconds.
    pub time_limit: f64,
    /// The dual objective reaching this value ends the solve early.
    pub objective_bound: f64,
    pub random_seed: u64,
}

/// Default Markowitz threshold, and the range the solver may move it in when recovering from
/// numerical trouble.
pub const DEFAULT_PIVOT_THRESHOLD: f64 = 0.1;
pub const MIN_PIVOT_THRESHOLD: f64 = 8e-4;
pub const MAX_PIVOT_THRESHOLD: f64 = 0.5;
/// Factor by which the pivot threshold grows on numerical trouble.
pub const PIVOT_THRESHOLD_CHANGE_FACTOR: f64 = 5.0;

impl Default for Options {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            dual_edge_weight: DualEdgeWeight::default(),
            price: PriceStrategy::default(),
            primal_feasibility_tolerance: 1e-7,
            dual_feasibility_tolerance: 1e-7,
            dual_cost_perturbation_multiplier: 1.0,
            primal_bound_perturbation_multiplier: 1.0,
            factor_pivot_threshold: DEFAULT_PIVOT_THRESHOLD,
            factor_pivot_tolerance: 1e-10,
            update_limit: 5000,
            iteration_limit: u64::MAX,
            time_limit: f64::INFINITY,
            objective_bound: f64::INFINITY,
            random_seed: 0,
        }
    }
}
