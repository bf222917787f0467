//! # Pricing
//!
//! Selection of the leaving row (dual simplex) and the entering column (primal simplex),
//! guided by edge weights that approximate the norms of the candidate pivot columns. Weights
//! normalize the raw merit figures so that candidates with long tableau columns do not look
//! better than they are.
//!
//! Three weight schemes are supported for the dual driver: Dantzig (unit weights), Devex
//! (cheap reference weights, reset when they grow stale) and projected steepest edge (exact
//! row norms, maintained with an extra solve per pivot). The combined scheme starts with
//! steepest edge and demotes itself to Devex when the maintained weights repeatedly disagree
//! with the computed ones. The primal driver prices with Devex.
use log::debug;

use crate::algorithm::simplex::basis::BasisState;
use crate::algorithm::simplex::cost_bound::Workspace;
use crate::data::linear_algebra::vector::{Iteration, WorkVector};

/// A Devex framework is restarted once some weight exceeds this value.
const DEVEX_RESET_WEIGHT: f64 = 1e7;
/// Weights never drop below this floor; roundoff must not produce negative norms.
const MIN_WEIGHT: f64 = 1e-4;
/// Steepest-edge weights disagreeing with the computed norm by more than this factor count
/// as failures.
const WEIGHT_AGREEMENT_FACTOR: f64 = 10.0;
/// Number of weight failures after which steepest edge demotes itself to Devex.
const MAX_WEIGHT_FAILURES: usize = 3;

/// The weight scheme actually in use, after resolving the option value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightMode {
    Dantzig,
    Devex,
    SteepestEdge,
}

/// Row selection and edge weights for the dual driver.
///
/// The weights are identified with rows and survive refactorization unchanged; for
/// backtracking they are scattered by basic variable and gathered back after the basis is
/// restored.
#[derive(Clone, Debug)]
pub struct DualPricing {
    mode: WeightMode,
    demote_on_failure: bool,
    weight: Vec<f64>,
    weight_failures: usize,
}

impl DualPricing {
    /// Set up pricing for `num_row` rows.
    ///
    /// Exact steepest-edge weights are only cheap to start from a logical basis (where they
    /// are all one); from any other basis the steepest-edge variants begin as Devex.
    #[must_use]
    pub fn new(mode: WeightMode, demote_on_failure: bool, num_row: usize, logical_start: bool) -> Self {
        let mode = match mode {
            WeightMode::SteepestEdge if !logical_start => WeightMode::Devex,
            other => other,
        };
        Self {
            mode,
            demote_on_failure,
            weight: vec![1.0; num_row],
            weight_failures: 0,
        }
    }

    pub fn mode(&self) -> WeightMode {
        self.mode
    }

    /// Whether the update step needs `tau = B^-1 row_ep` for this scheme.
    pub fn needs_tau(&self) -> bool {
        self.mode == WeightMode::SteepestEdge
    }

    pub fn weights(&self) -> &[f64] {
        &self.weight
    }

    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weight
    }

    /// Choose the leaving row: the row whose primal infeasibility, squared and divided by its
    /// weight, is largest. Ties go to the smaller basic variable index.
    pub fn select_row(
        &self,
        workspace: &Workspace,
        basis: &BasisState,
        tolerance: f64,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for row in 0..basis.basic_index.len() {
            let infeasibility = Workspace::infeasibility(
                workspace.base_value[row],
                workspace.base_lower[row],
                workspace.base_upper[row],
            );
            if infeasibility <= tolerance {
                continue;
            }
            let weight = match self.mode {
                WeightMode::Dantzig => 1.0,
                _ => self.weight[row],
            };
            let merit = infeasibility * infeasibility / weight;
            let better = match best {
                None => true,
                Some((incumbent_row, incumbent)) => {
                    merit > incumbent
                        || (merit == incumbent
                            && basis.basic_index[row] < basis.basic_index[incumbent_row])
                },
            };
            if better {
                best = Some((row, merit));
            }
        }
        best.map(|(row, _)| row)
    }

    /// Update the weights after a pivot on `row_out`.
    ///
    /// # Arguments
    ///
    /// * `pivot`: The pivot element `alpha_r` of the FTRANed entering column `col_aq`.
    /// * `row_ep_norm2`: Squared norm of the BTRANed unit row, the exact weight of the
    ///   leaving row.
    /// * `tau`: `B^-1 row_ep`, required for steepest edge only.
    pub fn update(
        &mut self,
        row_out: usize,
        pivot: f64,
        col_aq: &WorkVector,
        row_ep_norm2: f64,
        tau: Option<&WorkVector>,
    ) {
        match self.mode {
            WeightMode::Dantzig => {},
            WeightMode::Devex => {
                let reference = self.weight[row_out].max(1.0);
                let update_row = |weight: &mut f64, alpha: f64| {
                    let candidate = (alpha / pivot) * (alpha / pivot) * reference;
                    if candidate > *weight {
                        *weight = candidate;
                    }
                };
                match col_aq.iteration() {
                    Iteration::Sparse(indices) => {
                        for &i in indices {
                            if i != row_out && col_aq.get(i) != 0.0 {
                                update_row(&mut self.weight[i], col_aq.get(i));
                            }
                        }
                    },
                    Iteration::Dense(dim) => {
                        for i in 0..dim {
                            if i != row_out && col_aq.get(i) != 0.0 {
                                update_row(&mut self.weight[i], col_aq.get(i));
                            }
                        }
                    },
                }
                self.weight[row_out] = (reference / (pivot * pivot)).max(1.0);
                if self.weight.iter().any(|&w| w > DEVEX_RESET_WEIGHT) {
                    debug!("Devex weights grew past {DEVEX_RESET_WEIGHT:.0e}; starting a new framework");
                    self.weight.iter_mut().for_each(|w| *w = 1.0);
                }
            },
            WeightMode::SteepestEdge => {
                let tau = tau.expect("steepest edge update requires tau");
                let maintained = self.weight[row_out];
                // The maintained weight drifting from the computed norm signals that the
                // whole vector is going stale.
                if maintained > WEIGHT_AGREEMENT_FACTOR * row_ep_norm2
                    || row_ep_norm2 > WEIGHT_AGREEMENT_FACTOR * maintained
                {
                    self.weight_failures += 1;
                    if self.demote_on_failure && self.weight_failures >= MAX_WEIGHT_FAILURES {
                        debug!(
                            "steepest-edge weights failed agreement {} times; demoting to Devex",
                            self.weight_failures,
                        );
                        self.mode = WeightMode::Devex;
                        self.weight.iter_mut().for_each(|w| *w = 1.0);
                        return;
                    }
                }
                let exact = row_ep_norm2.max(MIN_WEIGHT);
                let apply = |weight: &mut f64, alpha: f64, tau_i: f64| {
                    let ratio = alpha / pivot;
                    *weight = (*weight - 2.0 * ratio * tau_i + ratio * ratio * exact)
                        .max(MIN_WEIGHT);
                };
                match col_aq.iteration() {
                    Iteration::Sparse(indices) => {
                        for &i in indices {
                            if i != row_out && col_aq.get(i) != 0.0 {
                                apply(&mut self.weight[i], col_aq.get(i), tau.get(i));
                            }
                        }
                    },
                    Iteration::Dense(dim) => {
                        for i in 0..dim {
                            if i != row_out && col_aq.get(i) != 0.0 {
                                apply(&mut self.weight[i], col_aq.get(i), tau.get(i));
                            }
                        }
                    },
                }
                self.weight[row_out] = (exact / (pivot * pivot)).max(MIN_WEIGHT);
            },
        }
    }
}

/// Column selection for the primal driver, priced with Devex weights over all variables.
#[derive(Clone, Debug)]
pub struct PrimalPricing {
    dantzig: bool,
    weight: Vec<f64>,
}

impl PrimalPricing {
    #[must_use]
    pub fn new(num_tot: usize, dantzig: bool) -> Self {
        Self { dantzig, weight: vec![1.0; num_tot] }
    }

    /// Restart the reference framework.
    pub fn reset(&mut self) {
        self.weight.iter_mut().for_each(|w| *w = 1.0);
    }

    /// Choose the entering column: largest squared dual infeasibility over weight among the
    /// nonbasic variables whose reduced cost is improving in their move direction. Ties go to
    /// the smaller variable index.
    pub fn select_column(
        &self,
        workspace: &Workspace,
        basis: &BasisState,
        tolerance: f64,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for var in 0..basis.nonbasic_flag.len() {
            if basis.nonbasic_flag[var] == 0 {
                continue;
            }
            let dual = workspace.dual[var];
            let free =
                workspace.lower[var].is_infinite() && workspace.upper[var].is_infinite();
            let infeasibility = if free {
                dual.abs()
            } else {
                -f64::from(basis.nonbasic_move[var]) * dual
            };
            if infeasibility <= tolerance {
                continue;
            }
            let weight = if self.dantzig { 1.0 } else { self.weight[var] };
            let merit = infeasibility * infeasibility / weight;
            let better = match best {
                None => true,
                Some((incumbent_var, incumbent)) => {
                    merit > incumbent || (merit == incumbent && var < incumbent_var)
                },
            };
            if better {
                best = Some((var, merit));
            }
        }
        best.map(|(var, _)| var)
    }

    /// Devex update from the pivot row after variable `variable_in` entered and
    /// `variable_out` left.
    ///
    /// # Arguments
    ///
    /// * `row_ap`/`row_ep`: The priced tableau row over structural and logical variables.
    /// * `pivot`: The tableau row entry of the entering variable.
    pub fn update(
        &mut self,
        variable_in: usize,
        variable_out: usize,
        row_ap: &WorkVector,
        row_ep: &WorkVector,
        pivot: f64,
        num_col: usize,
    ) {
        if self.dantzig {
            return;
        }
        let reference = self.weight[variable_in].max(1.0);
        let mut update_var = |weight: &mut f64, alpha: f64| {
            let candidate = (alpha / pivot) * (alpha / pivot) * reference;
            if candidate > *weight {
                *weight = candidate;
            }
        };
        let mut visit = |vector: &WorkVector, offset: usize, weight: &mut Vec<f64>| {
            match vector.iteration() {
                Iteration::Sparse(indices) => {
                    for &i in indices {
                        if vector.get(i) != 0.0 {
                            update_var(&mut weight[offset + i], vector.get(i));
                        }
                    }
                },
                Iteration::Dense(dim) => {
                    for i in 0..dim {
                        if vector.get(i) != 0.0 {
                            update_var(&mut weight[offset + i], vector.get(i));
                        }
                    }
                },
            }
        };
        visit(row_ap, 0, &mut self.weight);
        visit(row_ep, num_col, &mut self.weight);
        self.weight[variable_out] = (reference / (pivot * pivot)).max(1.0);
        if self.weight.iter().any(|&w| w > DEVEX_RESET_WEIGHT) {
            debug!("primal Devex weights grew past {DEVEX_RESET_WEIGHT:.0e}; resetting");
            self.reset();
        }
    }
}
