//! # Dual simplex driver
//!
//! Maintains dual feasibility and drives out primal infeasibility, in two phases. Phase 1
//! replaces the bounds by artificial ones chosen so the dual objective equals the negated sum
//! of dual infeasibilities of the real program: reaching zero proves a dual-feasible point
//! exists, stalling below zero proves there is none. Phase 2 runs on the real (possibly
//! cost-perturbed) data.
//!
//! One iteration: pick the leaving row by weighted infeasibility, BTRAN the unit row, PRICE
//! the tableau row, pick the entering variable with the Harris ratio test, FTRAN the entering
//! column, check that the two pivot values agree, then flip what can be flipped and pivot.
//! The factorization absorbs the pivot as a product-form update until a rebuild is due.
use log::{debug, trace};

use crate::algorithm::simplex::cost_bound::{initialise_bound, initialise_cost};
use crate::algorithm::simplex::factor::UpdateHint;
use crate::algorithm::simplex::options::DualEdgeWeight;
use crate::algorithm::simplex::pricing::{DualPricing, WeightMode};
use crate::algorithm::simplex::ratio_test::{dual_ratio_test, ALPHA_TOLERANCE};
use crate::algorithm::simplex::{Phase, SimplexAlgorithm, SimplexSolver, SolveError};
use crate::data::linear_algebra::vector::{Iteration, WorkVector};
use crate::data::linear_program::elements::ModelStatus;

/// The phase-1 dual objective is considered zero below this threshold, scaled by the cost
/// magnitude.
const PHASE1_OBJECTIVE_ZERO: f64 = 1e-9;

/// What a phase loop decided.
enum Outcome {
    Switch(Phase),
    Finished,
}

/// What a rebuild concluded.
enum Rebuild {
    Ok,
    /// Dual correction would need a cost shift that is not allowed; the caller must leave
    /// the rest to the primal driver.
    FallbackToPrimal,
    ObjectiveBound,
}

/// Work vectors of the driver, allocated once per solve.
struct Buffers {
    row_ep: WorkVector,
    row_ap: WorkVector,
    col_aq: WorkVector,
    tau: WorkVector,
    flips: WorkVector,
}

/// Run the dual simplex on the solver state.
pub(crate) fn solve(solver: &mut SimplexSolver) -> Result<(), SolveError> {
    let num_row = solver.lp_ref().num_row();
    let num_col = solver.lp_ref().num_col();
    if num_row == 0 {
        // Nothing to pivot; any dual infeasibility is the primal driver's to fix.
        return Ok(());
    }

    let (mode, demote) = match solver.options.dual_edge_weight {
        DualEdgeWeight::Dantzig => (WeightMode::Dantzig, false),
        DualEdgeWeight::Devex => (WeightMode::Devex, false),
        DualEdgeWeight::SteepestEdge => (WeightMode::SteepestEdge, false),
        DualEdgeWeight::Choose | DualEdgeWeight::SteepestEdgeToDevex => {
            (WeightMode::SteepestEdge, true)
        },
    };
    let logical_start = {
        let basis = solver.basis_ref();
        basis
            .basic_index
            .iter()
            .enumerate()
            .all(|(row, &var)| var == num_col + row)
    };
    let mut pricing = DualPricing::new(mode, demote, num_row, logical_start);
    let mut buffers = Buffers {
        row_ep: WorkVector::new(num_row),
        row_ap: WorkVector::new(num_col),
        col_aq: WorkVector::new(num_row),
        tau: WorkVector::new(num_row),
        flips: WorkVector::new(num_row),
    };

    let mut phase = if unflippable_dual_infeasibilities(solver) > 0 {
        Phase::One
    } else {
        Phase::Two
    };
    debug!("dual simplex starts in phase {:?} with {:?} weights", phase, pricing.mode());

    let mut phase_switches = 0;
    loop {
        match phase_loop(solver, &mut pricing, &mut buffers, phase)? {
            Outcome::Switch(next) => {
                if next != phase {
                    phase_switches += 1;
                    if phase_switches > MAX_PHASE_SWITCHES {
                        return Err(SolveError::NumericalFailure);
                    }
                }
                phase = next;
            },
            Outcome::Finished => return Ok(()),
        }
    }
}

/// Phases flip-flopping past this count indicates tolerance-level cycling.
const MAX_PHASE_SWITCHES: usize = 100;

/// Dual infeasibilities that a bound flip cannot remove: those of free and one-sided
/// variables. They decide whether phase 1 is needed at all.
fn unflippable_dual_infeasibilities(solver: &SimplexSolver) -> usize {
    let tolerance = solver.options.dual_feasibility_tolerance;
    let basis = solver.basis_ref();
    let workspace = &solver.workspace;
    let mut count = 0;
    for var in 0..basis.nonbasic_flag.len() {
        if basis.nonbasic_flag[var] != 1 {
            continue;
        }
        let lower = workspace.lower[var];
        let upper = workspace.upper[var];
        if lower.is_finite() && upper.is_finite() {
            continue;
        }
        let dual = workspace.dual[var];
        let infeasibility = if lower.is_infinite() && upper.is_infinite() {
            dual.abs()
        } else {
            -f64::from(basis.nonbasic_move[var]) * dual
        };
        if infeasibility >= tolerance {
            count += 1;
        }
    }
    count
}

fn rebuild(
    solver: &mut SimplexSolver,
    pricing: &mut DualPricing,
    phase: Phase,
) -> Result<Rebuild, SolveError> {
    solver.get_nonsingular_inverse(Some(pricing))?;
    solver.ensure_row_matrix();

    let lp = solver.lp.as_ref().expect("a program is installed at this point");
    let perturb = solver.allow_cost_perturbation;
    solver.costs_perturbed = initialise_cost(
        &mut solver.workspace,
        lp,
        SimplexAlgorithm::Dual,
        perturb,
        solver.options.dual_cost_perturbation_multiplier,
        &solver.random_value,
    );
    solver.bounds_perturbed = initialise_bound(
        &mut solver.workspace,
        lp,
        solver.basis.as_ref().expect("a basis is installed at this point"),
        SimplexAlgorithm::Dual,
        phase,
        false,
        0.0,
        &solver.random_value,
    );
    let basis = solver.basis.as_mut().expect("a basis is installed at this point");
    basis.initialise_nonbasic_value_and_move(&mut solver.workspace);

    solver.compute_duals();
    if !solver.correct_dual() {
        return Ok(Rebuild::FallbackToPrimal);
    }
    solver.compute_primal_values();
    solver.compute_measures(phase);
    trace!(
        "rebuild (phase {:?}): dual objective {:.6e}, {} primal infeasibilities",
        phase,
        solver.dual_objective,
        solver.primal_measure.num,
    );

    if phase == Phase::Two && solver.dual_objective > solver.options.objective_bound {
        return Ok(Rebuild::ObjectiveBound);
    }
    Ok(Rebuild::Ok)
}

fn phase_loop(
    solver: &mut SimplexSolver,
    pricing: &mut DualPricing,
    buffers: &mut Buffers,
    phase: Phase,
) -> Result<Outcome, SolveError> {
    let num_col = solver.lp_ref().num_col();
    let mut rebuild_needed = true;

    loop {
        if rebuild_needed {
            match rebuild(solver, pricing, phase)? {
                Rebuild::Ok => {},
                Rebuild::FallbackToPrimal => {
                    solver.model_status = ModelStatus::NotSet;
                    return Ok(Outcome::Finished);
                },
                Rebuild::ObjectiveBound => {
                    solver.model_status = ModelStatus::ObjectiveBoundReached;
                    return Ok(Outcome::Finished);
                },
            }
            rebuild_needed = false;
            if solver.numerical_recovery_exhausted() {
                return Err(SolveError::NumericalFailure);
            }
        }
        if solver.bailout() {
            return Ok(Outcome::Finished);
        }

        // CHUZR: the leaving row.
        let row_out = match pricing.select_row(
            &solver.workspace,
            solver.basis_ref(),
            solver.options.primal_feasibility_tolerance,
        ) {
            Some(row) => row,
            None => {
                let fresh = solver.factor.as_ref().map_or(0, |f| f.update_count()) == 0;
                if !fresh {
                    rebuild_needed = true;
                    continue;
                }
                return phase_optimal(solver, phase);
            },
        };
        let leaving_increases =
            solver.workspace.base_value[row_out] < solver.workspace.base_lower[row_out];
        let move_out = if leaving_increases { -1 } else { 1 };

        // BTRAN the unit row, then PRICE the tableau row.
        buffers.row_ep.clear();
        buffers.row_ep.add(row_out, 1.0);
        {
            let expected = solver.row_ep_density;
            solver.factor.as_mut().expect("factor present").btran(&mut buffers.row_ep, expected);
        }
        SimplexSolver::record_density(&mut solver.row_ep_density, &buffers.row_ep);
        let row_ep_norm2 = squared_norm(&buffers.row_ep);
        solver.price_row(&buffers.row_ep, &mut buffers.row_ap);

        // CHUZC: the entering variable.
        let step = match dual_ratio_test(
            &solver.workspace,
            solver.basis_ref(),
            &buffers.row_ap,
            &buffers.row_ep,
            leaving_increases,
            solver.options.dual_feasibility_tolerance,
        ) {
            Some(step) => step,
            None => {
                if solver.costs_perturbed {
                    // The blockage may be an artefact of perturbed costs: remove them and
                    // measure again before concluding anything.
                    debug!("dual ratio test failed with perturbed costs; removing perturbation");
                    solver.allow_cost_perturbation = false;
                    rebuild_needed = true;
                    continue;
                }
                return dual_unbounded(solver, phase, row_out, &buffers.row_ep, leaving_increases);
            },
        };
        let variable_in = step.variable;

        // FTRAN the entering column.
        buffers.col_aq.clear();
        solver.lp_ref().columns().collect_column(&mut buffers.col_aq, variable_in, 1.0);
        {
            let expected = solver.col_aq_density;
            solver.factor.as_mut().expect("factor present").ftran(&mut buffers.col_aq, expected);
        }
        SimplexSolver::record_density(&mut solver.col_aq_density, &buffers.col_aq);

        let alpha_col = buffers.col_aq.get(row_out);
        if alpha_col.abs() < ALPHA_TOLERANCE
            || solver.reinvert_on_numerical_trouble(alpha_col, step.alpha_row)
        {
            solver.numerical_recoveries += 1;
            rebuild_needed = true;
            continue;
        }

        // The steepest-edge update needs `B^-1 row_ep`.
        let tau = if pricing.needs_tau() {
            buffers.tau.clear();
            match buffers.row_ep.iteration() {
                Iteration::Sparse(indices) => {
                    for &i in indices {
                        buffers.tau.add(i, buffers.row_ep.get(i));
                    }
                },
                Iteration::Dense(dim) => {
                    buffers.tau.set_dense();
                    for i in 0..dim {
                        buffers.tau.add(i, buffers.row_ep.get(i));
                    }
                },
            }
            let expected = solver.col_aq_density;
            solver.factor.as_mut().expect("factor present").ftran(&mut buffers.tau, expected);
            true
        } else {
            false
        };

        // Dual updates: every touched nonbasic variable moves by `-theta_dual * alpha`.
        let theta_dual = solver.workspace.dual[variable_in] / step.alpha_row;
        update_duals(solver, &buffers.row_ap, &buffers.row_ep, num_col, theta_dual);
        solver.workspace.dual[variable_in] = 0.0;
        let variable_out = solver.basis_ref().basic_index[row_out];
        solver.workspace.dual[variable_out] = -theta_dual;

        // Boxed variables whose dual changed sign flip instead of blocking; their combined
        // primal effect is one FTRAN.
        collect_and_apply_flips(solver, buffers, variable_in, num_col);

        // Primal updates, measured after the flips landed.
        let delta_primal = if leaving_increases {
            solver.workspace.base_value[row_out] - solver.workspace.base_lower[row_out]
        } else {
            solver.workspace.base_value[row_out] - solver.workspace.base_upper[row_out]
        };
        let theta_primal = delta_primal / alpha_col;
        apply_primal_step(solver, &buffers.col_aq, theta_primal);
        solver.workspace.base_value[row_out] =
            solver.workspace.value[variable_in] + theta_primal;

        pricing.update(
            row_out,
            alpha_col,
            &buffers.col_aq,
            row_ep_norm2,
            if tau { Some(&buffers.tau) } else { None },
        );

        let basis = solver.basis.as_mut().expect("a basis is installed at this point");
        let objective_change =
            basis.update_pivots(&mut solver.workspace, variable_in, row_out, move_out);
        solver.dual_objective += objective_change;
        let row_matrix = solver.row_matrix.as_mut().expect("row matrix maintained");
        let lp = solver.lp.as_ref().expect("a program is installed at this point");
        if variable_in < num_col {
            row_matrix.to_basic(variable_in, lp.columns());
        }
        if variable_out < num_col {
            row_matrix.to_nonbasic(variable_out, lp.columns());
        }
        solver.iteration_count += 1;
        trace!(
            "dual pivot: variable {} enters, variable {} leaves row {}, theta ({:.3e}, {:.3e})",
            variable_in,
            variable_out,
            row_out,
            theta_dual,
            theta_primal,
        );

        let factor = solver.factor.as_mut().expect("factor present");
        let hint = factor.update(&buffers.col_aq, row_out);
        if hint == UpdateHint::Refactor || factor.update_count() >= solver.update_limit {
            rebuild_needed = true;
        }
    }
}

/// No leaving row with a fresh factorization: the phase reached its optimum.
fn phase_optimal(solver: &mut SimplexSolver, phase: Phase) -> Result<Outcome, SolveError> {
    solver.compute_measures(phase);
    match phase {
        Phase::One => {
            let cost_scale = 1.0
                + solver
                    .workspace
                    .cost
                    .iter()
                    .fold(0.0_f64, |acc, &cost| acc.max(cost.abs()));
            if solver.dual_objective.abs() <= PHASE1_OBJECTIVE_ZERO * cost_scale {
                debug!("dual phase 1 reached a dual-feasible point");
                Ok(Outcome::Switch(Phase::Two))
            } else {
                // A nonzero phase-1 optimum: no dual-feasible point exists.
                debug!(
                    "dual phase 1 optimum {:.6e} is nonzero: no dual-feasible point",
                    solver.dual_objective,
                );
                solver.model_status = ModelStatus::UnboundedOrInfeasible;
                Ok(Outcome::Finished)
            }
        },
        Phase::Two => {
            if solver.costs_perturbed {
                // The optimum may be an artefact of the perturbation: remove it, rebuild
                // and let the loop settle the remaining infeasibilities.
                debug!("phase 2 optimum under perturbed costs; removing perturbation");
                solver.allow_cost_perturbation = false;
                return Ok(Outcome::Switch(Phase::Two));
            }
            if solver.dual_measure.num > 0 {
                // Residual dual infeasibilities that flips cannot remove; the primal
                // driver cleans them up.
                solver.model_status = ModelStatus::NotSet;
                return Ok(Outcome::Finished);
            }
            if solver.primal_measure.num == 0 {
                solver.model_status = ModelStatus::Optimal;
                return Ok(Outcome::Finished);
            }
            // Values moved during the final rebuild; keep going.
            Ok(Outcome::Switch(Phase::Two))
        },
    }
}

/// The ratio test found no entering candidate with exact costs: the dual is unbounded along
/// this row.
fn dual_unbounded(
    solver: &mut SimplexSolver,
    phase: Phase,
    row_out: usize,
    row_ep: &WorkVector,
    leaving_increases: bool,
) -> Result<Outcome, SolveError> {
    match phase {
        Phase::One => {
            // The phase-1 program always has a bounded dual; failing the ratio test here
            // still certifies that no dual-feasible point was found.
            solver.model_status = ModelStatus::UnboundedOrInfeasible;
        },
        Phase::Two => {
            debug!("dual ray on row {}: the program is primal infeasible", row_out);
            let sign = if leaving_increases { -1.0 } else { 1.0 };
            solver.dual_ray =
                Some(row_ep.values().iter().map(|&value| sign * value).collect());
            solver.model_status = ModelStatus::Infeasible;
        },
    }
    Ok(Outcome::Finished)
}

fn squared_norm(vector: &WorkVector) -> f64 {
    match vector.iteration() {
        Iteration::Sparse(indices) => {
            indices.iter().map(|&i| vector.get(i) * vector.get(i)).sum()
        },
        Iteration::Dense(dim) => (0..dim).map(|i| vector.get(i) * vector.get(i)).sum(),
    }
}

/// Subtract `theta * alpha` from the dual of every touched nonbasic variable.
fn update_duals(
    solver: &mut SimplexSolver,
    row_ap: &WorkVector,
    row_ep: &WorkVector,
    num_col: usize,
    theta_dual: f64,
) {
    let basis = solver.basis.as_ref().expect("a basis is installed at this point");
    let workspace = &mut solver.workspace;
    let mut apply = |var: usize, alpha: f64| {
        if basis.nonbasic_flag[var] == 1 && alpha != 0.0 {
            workspace.dual[var] -= theta_dual * alpha;
        }
    };
    match row_ap.iteration() {
        Iteration::Sparse(indices) => {
            for &j in indices {
                apply(j, row_ap.get(j));
            }
        },
        Iteration::Dense(dim) => {
            for j in 0..dim {
                apply(j, row_ap.get(j));
            }
        },
    }
    match row_ep.iteration() {
        Iteration::Sparse(indices) => {
            for &i in indices {
                apply(num_col + i, row_ep.get(i));
            }
        },
        Iteration::Dense(dim) => {
            for i in 0..dim {
                apply(num_col + i, row_ep.get(i));
            }
        },
    }
}

/// Flip every boxed nonbasic variable whose dual now points past its bound, and apply the
/// aggregated effect on the basic values with a single FTRAN.
fn collect_and_apply_flips(
    solver: &mut SimplexSolver,
    buffers: &mut Buffers,
    variable_in: usize,
    num_col: usize,
) {
    let tolerance = solver.options.dual_feasibility_tolerance;
    buffers.flips.clear();
    let mut any = false;
    {
        let lp = solver.lp.as_ref().expect("a program is installed at this point");
        let basis = solver.basis.as_mut().expect("a basis is installed at this point");
        let workspace = &mut solver.workspace;
        let mut consider = |var: usize| {
            if var == variable_in || basis.nonbasic_flag[var] != 1 {
                return;
            }
            if !workspace.lower[var].is_finite() || !workspace.upper[var].is_finite() {
                return;
            }
            let move_ = basis.nonbasic_move[var];
            if move_ == 0 {
                return;
            }
            if f64::from(move_) * workspace.dual[var] <= -tolerance {
                let old_value = workspace.value[var];
                basis.flip_bound(workspace, var);
                let delta = workspace.value[var] - old_value;
                lp.columns().collect_column(&mut buffers.flips, var, delta);
                any = true;
            }
        };
        match buffers.row_ap.iteration() {
            Iteration::Sparse(indices) => {
                for &j in indices {
                    consider(j);
                }
            },
            Iteration::Dense(dim) => {
                for j in 0..dim {
                    consider(j);
                }
            },
        }
        match buffers.row_ep.iteration() {
            Iteration::Sparse(indices) => {
                for &i in indices {
                    consider(num_col + i);
                }
            },
            Iteration::Dense(dim) => {
                for i in 0..dim {
                    consider(num_col + i);
                }
            },
        }
    }
    if any {
        let expected = solver.col_aq_density;
        solver.factor.as_mut().expect("factor present").ftran(&mut buffers.flips, expected);
        let flips = &buffers.flips;
        match flips.iteration() {
            Iteration::Sparse(indices) => {
                for &i in indices {
                    solver.workspace.base_value[i] -= flips.get(i);
                }
            },
            Iteration::Dense(dim) => {
                for i in 0..dim {
                    solver.workspace.base_value[i] -= flips.get(i);
                }
            },
        }
        trace!("applied dual bound flips");
    }
}

/// Move every basic value by `-theta * alpha_i`.
fn apply_primal_step(solver: &mut SimplexSolver, col_aq: &WorkVector, theta_primal: f64) {
    match col_aq.iteration() {
        Iteration::Sparse(indices) => {
            for &i in indices {
                solver.workspace.base_value[i] -= theta_primal * col_aq.get(i);
            }
        },
        Iteration::Dense(dim) => {
            for i in 0..dim {
                solver.workspace.base_value[i] -= theta_primal * col_aq.get(i);
            }
        },
    }
}
