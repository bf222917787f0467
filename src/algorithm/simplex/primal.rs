//! # Primal simplex driver
//!
//! Maintains primal feasibility and drives out dual infeasibility. Phase 1 minimizes the sum
//! of primal infeasibilities with shifted costs: every basic variable outside its bounds
//! contributes a unit cost pointing back towards feasibility, and the bound it violates is the
//! only one that blocks the ratio test. Phase 2 runs on the original costs with the (possibly
//! perturbed) bounds.
//!
//! The driver doubles as the disambiguation pass after the dual simplex reports "unbounded or
//! infeasible", and as the cleanup pass when only dual infeasibilities remain.
use log::{debug, trace};

use crate::algorithm::simplex::basis::{MOVE_DOWN, MOVE_UP};
use crate::algorithm::simplex::cost_bound::{initialise_bound, initialise_cost};
use crate::algorithm::simplex::factor::UpdateHint;
use crate::algorithm::simplex::pricing::PrimalPricing;
use crate::algorithm::simplex::ratio_test::{primal_ratio_test, PrimalStep, ALPHA_TOLERANCE};
use crate::algorithm::simplex::{Phase, SimplexAlgorithm, SimplexSolver, SolveError};
use crate::data::linear_algebra::vector::{Iteration, WorkVector};
use crate::data::linear_program::elements::ModelStatus;

/// What a phase loop decided.
enum Outcome {
    Switch(Phase),
    Finished,
}

/// Work vectors of the driver, allocated once per solve.
struct Buffers {
    col_aq: WorkVector,
    row_ep: WorkVector,
    row_ap: WorkVector,
}

/// Run the primal simplex on the solver state.
pub(crate) fn solve(solver: &mut SimplexSolver) -> Result<(), SolveError> {
    let num_row = solver.lp_ref().num_row();
    let num_col = solver.lp_ref().num_col();

    let mut pricing = PrimalPricing::new(num_col + num_row, false);
    let mut buffers = Buffers {
        col_aq: WorkVector::new(num_row),
        row_ep: WorkVector::new(num_row),
        row_ap: WorkVector::new(num_col),
    };

    rebuild(solver, Phase::Two)?;
    let mut phase = if solver.primal_measure.num > 0 { Phase::One } else { Phase::Two };
    debug!("primal simplex starts in phase {:?}", phase);

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

fn rebuild(solver: &mut SimplexSolver, phase: Phase) -> Result<(), SolveError> {
    solver.get_nonsingular_inverse(None)?;
    solver.ensure_row_matrix();

    let lp = solver.lp.as_ref().expect("a program is installed at this point");
    initialise_cost(
        &mut solver.workspace,
        lp,
        SimplexAlgorithm::Primal,
        false,
        0.0,
        &solver.random_value,
    );
    solver.costs_perturbed = false;
    let perturb = solver.allow_bound_perturbation;
    solver.bounds_perturbed = initialise_bound(
        &mut solver.workspace,
        lp,
        solver.basis.as_ref().expect("a basis is installed at this point"),
        SimplexAlgorithm::Primal,
        phase,
        perturb,
        solver.options.primal_bound_perturbation_multiplier,
        &solver.random_value,
    );
    let basis = solver.basis.as_mut().expect("a basis is installed at this point");
    basis.initialise_nonbasic_value_and_move(&mut solver.workspace);

    solver.compute_primal_values();
    if phase == Phase::One {
        set_phase1_costs(solver);
    }
    solver.compute_duals();
    solver.compute_measures(phase);
    trace!(
        "rebuild (phase {:?}): objective {:.6e}, {} primal and {} dual infeasibilities",
        phase,
        solver.primal_objective,
        solver.primal_measure.num,
        solver.dual_measure.num,
    );
    Ok(())
}

/// Phase-1 costs: a unit gradient on every basic variable outside its bounds, pointing the
/// objective towards feasibility. All other costs vanish.
fn set_phase1_costs(solver: &mut SimplexSolver) {
    let tolerance = solver.options.primal_feasibility_tolerance;
    let basis = solver.basis.as_ref().expect("a basis is installed at this point");
    let workspace = &mut solver.workspace;
    workspace.cost.iter_mut().for_each(|cost| *cost = 0.0);
    workspace.shift.iter_mut().for_each(|shift| *shift = 0.0);
    for (row, &var) in basis.basic_index.iter().enumerate() {
        if workspace.base_value[row] < workspace.base_lower[row] - tolerance {
            workspace.cost[var] = -1.0;
        } else if workspace.base_value[row] > workspace.base_upper[row] + tolerance {
            workspace.cost[var] = 1.0;
        }
    }
}

/// Refresh the dual side of the phase-1 state after the infeasible set changed.
fn refresh_phase1(solver: &mut SimplexSolver) {
    set_phase1_costs(solver);
    solver.compute_duals();
    solver.compute_measures(Phase::One);
}

fn phase_loop(
    solver: &mut SimplexSolver,
    pricing: &mut PrimalPricing,
    buffers: &mut Buffers,
    phase: Phase,
) -> Result<Outcome, SolveError> {
    let mut rebuild_needed = true;

    loop {
        if rebuild_needed {
            rebuild(solver, phase)?;
            rebuild_needed = false;
            if solver.numerical_recovery_exhausted() {
                return Err(SolveError::NumericalFailure);
            }
        }
        if solver.bailout() {
            return Ok(Outcome::Finished);
        }
        if phase == Phase::One && solver.primal_measure.num == 0 {
            debug!("primal phase 1 reached feasibility");
            return Ok(Outcome::Switch(Phase::Two));
        }

        // CHUZC: the entering variable.
        let variable_in = match pricing.select_column(
            &solver.workspace,
            solver.basis_ref(),
            solver.options.dual_feasibility_tolerance,
        ) {
            Some(var) => var,
            None => {
                let fresh = solver.factor.as_ref().map_or(0, |f| f.update_count()) == 0;
                if !fresh {
                    rebuild_needed = true;
                    continue;
                }
                return phase_optimal(solver, phase);
            },
        };
        let entering_increases = solver.workspace.dual[variable_in] < 0.0;

        // FTRAN the entering column.
        buffers.col_aq.clear();
        solver.lp_ref().columns().collect_column(&mut buffers.col_aq, variable_in, 1.0);
        {
            let expected = solver.col_aq_density;
            solver.factor.as_mut().expect("factor present").ftran(&mut buffers.col_aq, expected);
        }
        SimplexSolver::record_density(&mut solver.col_aq_density, &buffers.col_aq);

        // In phase 1 an infeasible basic variable blocks only at the bound it violates; the
        // push through the other is what the composite objective rewards.
        let saved_base_bounds = if phase == Phase::One {
            Some(relax_infeasible_base_bounds(solver))
        } else {
            None
        };
        let entering_range = solver.workspace.range[variable_in];
        let step = primal_ratio_test(
            &solver.workspace,
            &buffers.col_aq,
            entering_range,
            entering_increases,
            solver.options.primal_feasibility_tolerance,
        );
        if let Some((lower, upper)) = saved_base_bounds {
            solver.workspace.base_lower = lower;
            solver.workspace.base_upper = upper;
        }

        match step {
            PrimalStep::BoundFlip => {
                let delta = if entering_increases { entering_range } else { -entering_range };
                let basis = solver.basis.as_mut().expect("a basis is installed at this point");
                basis.flip_bound(&mut solver.workspace, variable_in);
                apply_column_step(solver, &buffers.col_aq, delta);
                solver.iteration_count += 1;
                trace!("bound flip of variable {} by {:.3e}", variable_in, delta);
                if phase == Phase::One {
                    refresh_phase1(solver);
                }
            },
            PrimalStep::Unbounded => {
                if solver.bounds_perturbed {
                    debug!("unblocked column under perturbed bounds; removing perturbation");
                    solver.allow_bound_perturbation = false;
                    rebuild_needed = true;
                    continue;
                }
                if phase == Phase::One {
                    // The composite objective is bounded below by zero, so an unblocked
                    // column is numerical: the infeasible rows this column helps must have
                    // lost their entries. Count it against the recovery budget and rebuild.
                    solver.numerical_recoveries += 1;
                    rebuild_needed = true;
                    continue;
                }
                record_primal_ray(solver, &buffers.col_aq, variable_in, entering_increases);
                solver.model_status = ModelStatus::Unbounded;
                debug!("variable {} is unblocked: the program is unbounded", variable_in);
                return Ok(Outcome::Finished);
            },
            PrimalStep::Pivot { row, alpha } => {
                rebuild_needed = pivot(
                    solver,
                    pricing,
                    buffers,
                    phase,
                    variable_in,
                    entering_increases,
                    row,
                    alpha,
                )?;
                if phase == Phase::One && !rebuild_needed {
                    refresh_phase1(solver);
                }
            },
        }
    }
}

/// Bounds for the phase-1 ratio test: an infeasible basic variable keeps only its violated
/// bound. Returns the original bounds for restoration.
fn relax_infeasible_base_bounds(solver: &mut SimplexSolver) -> (Vec<f64>, Vec<f64>) {
    let tolerance = solver.options.primal_feasibility_tolerance;
    let workspace = &mut solver.workspace;
    let saved = (workspace.base_lower.clone(), workspace.base_upper.clone());
    for row in 0..workspace.base_value.len() {
        if workspace.base_value[row] < workspace.base_lower[row] - tolerance {
            workspace.base_upper[row] = workspace.base_lower[row];
            workspace.base_lower[row] = f64::NEG_INFINITY;
        } else if workspace.base_value[row] > workspace.base_upper[row] + tolerance {
            workspace.base_lower[row] = workspace.base_upper[row];
            workspace.base_upper[row] = f64::INFINITY;
        }
    }
    saved
}

/// Apply one basis-changing pivot.
///
/// # Return value
///
/// Whether the caller must refactorize before iterating further (update budget reached, or
/// the pivot was abandoned on numerical trouble).
#[allow(clippy::too_many_arguments)]
fn pivot(
    solver: &mut SimplexSolver,
    pricing: &mut PrimalPricing,
    buffers: &mut Buffers,
    phase: Phase,
    variable_in: usize,
    entering_increases: bool,
    row_out: usize,
    alpha: f64,
) -> Result<bool, SolveError> {
    let num_col = solver.lp_ref().num_col();
    let tolerance = solver.options.primal_feasibility_tolerance;

    // The bound the blocking variable settles at. An infeasible phase-1 row blocks at its
    // violated bound whatever the direction.
    let decreasing = (alpha > 0.0) == entering_increases;
    let value = solver.workspace.base_value[row_out];
    let lower = solver.workspace.base_lower[row_out];
    let upper = solver.workspace.base_upper[row_out];
    let blocking_bound = if phase == Phase::One && value < lower - tolerance {
        lower
    } else if phase == Phase::One && value > upper + tolerance {
        upper
    } else if decreasing {
        lower
    } else {
        upper
    };
    let variable_out = solver.basis_ref().basic_index[row_out];
    let move_out = if blocking_bound == solver.workspace.lower[variable_out] {
        MOVE_DOWN
    } else {
        MOVE_UP
    };
    let theta_primal = (value - blocking_bound) / alpha;

    // BTRAN the unit row and PRICE it: the dual updates and the Devex update both need the
    // pivot row.
    buffers.row_ep.clear();
    buffers.row_ep.add(row_out, 1.0);
    {
        let expected = solver.row_ep_density;
        solver.factor.as_mut().expect("factor present").btran(&mut buffers.row_ep, expected);
    }
    SimplexSolver::record_density(&mut solver.row_ep_density, &buffers.row_ep);
    solver.price_row(&buffers.row_ep, &mut buffers.row_ap);

    let alpha_row = if variable_in < num_col {
        buffers.row_ap.get(variable_in)
    } else {
        buffers.row_ep.get(variable_in - num_col)
    };
    if alpha_row.abs() < ALPHA_TOLERANCE || solver.reinvert_on_numerical_trouble(alpha, alpha_row)
    {
        solver.numerical_recoveries += 1;
        return Ok(true);
    }

    // Dual updates over the touched nonbasic variables.
    let theta_dual = solver.workspace.dual[variable_in] / alpha_row;
    {
        let basis = solver.basis.as_ref().expect("a basis is installed at this point");
        let workspace = &mut solver.workspace;
        let mut apply = |var: usize, entry: f64| {
            if basis.nonbasic_flag[var] == 1 && entry != 0.0 {
                workspace.dual[var] -= theta_dual * entry;
            }
        };
        match buffers.row_ap.iteration() {
            Iteration::Sparse(indices) => {
                for &j in indices {
                    apply(j, buffers.row_ap.get(j));
                }
            },
            Iteration::Dense(dim) => {
                for j in 0..dim {
                    apply(j, buffers.row_ap.get(j));
                }
            },
        }
        match buffers.row_ep.iteration() {
            Iteration::Sparse(indices) => {
                for &i in indices {
                    apply(num_col + i, buffers.row_ep.get(i));
                }
            },
            Iteration::Dense(dim) => {
                for i in 0..dim {
                    apply(num_col + i, buffers.row_ep.get(i));
                }
            },
        }
    }
    solver.workspace.dual[variable_in] = 0.0;
    solver.workspace.dual[variable_out] = -theta_dual;

    // Primal updates.
    apply_column_step(solver, &buffers.col_aq, theta_primal);
    solver.workspace.base_value[row_out] = solver.workspace.value[variable_in] + theta_primal;

    pricing.update(variable_in, variable_out, &buffers.row_ap, &buffers.row_ep, alpha_row, num_col);

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
        "primal pivot: variable {} enters, variable {} leaves row {}, theta ({:.3e}, {:.3e})",
        variable_in,
        variable_out,
        row_out,
        theta_dual,
        theta_primal,
    );

    let factor = solver.factor.as_mut().expect("factor present");
    let hint = factor.update(&buffers.col_aq, row_out);
    Ok(hint == UpdateHint::Refactor || factor.update_count() >= solver.update_limit)
}

/// No entering candidate with a fresh factorization: the phase reached its optimum.
fn phase_optimal(solver: &mut SimplexSolver, phase: Phase) -> Result<Outcome, SolveError> {
    solver.compute_measures(phase);
    match phase {
        Phase::One => {
            if solver.primal_measure.num == 0 {
                Ok(Outcome::Switch(Phase::Two))
            } else {
                // The infeasibility sum is minimal and positive: no feasible point exists.
                debug!(
                    "primal phase 1 optimum leaves {} infeasibilities (sum {:.6e}): infeasible",
                    solver.primal_measure.num,
                    solver.primal_measure.sum,
                );
                solver.model_status = ModelStatus::Infeasible;
                Ok(Outcome::Finished)
            }
        },
        Phase::Two => {
            if solver.bounds_perturbed {
                debug!("phase 2 optimum under perturbed bounds; removing perturbation");
                solver.allow_bound_perturbation = false;
                return Ok(Outcome::Switch(Phase::Two));
            }
            if solver.primal_measure.num > 0 {
                return Ok(Outcome::Switch(Phase::One));
            }
            if solver.dual_measure.num == 0 {
                solver.model_status = ModelStatus::Optimal;
            } else {
                // Dual infeasibilities the pricing cannot reach; surface the state instead
                // of looping.
                solver.model_status = ModelStatus::NotSet;
            }
            Ok(Outcome::Finished)
        },
    }
}

/// Record the unbounded direction over the structural variables.
fn record_primal_ray(
    solver: &mut SimplexSolver,
    col_aq: &WorkVector,
    variable_in: usize,
    entering_increases: bool,
) {
    let num_col = solver.lp_ref().num_col();
    let direction = if entering_increases { 1.0 } else { -1.0 };
    let mut ray = vec![0.0; num_col];
    if variable_in < num_col {
        ray[variable_in] = direction;
    }
    let basis = solver.basis_ref();
    match col_aq.iteration() {
        Iteration::Sparse(indices) => {
            for &i in indices {
                let var = basis.basic_index[i];
                if var < num_col {
                    ray[var] = -direction * col_aq.get(i);
                }
            }
        },
        Iteration::Dense(dim) => {
            for i in 0..dim {
                let var = basis.basic_index[i];
                if var < num_col {
                    ray[var] = -direction * col_aq.get(i);
                }
            }
        },
    }
    solver.primal_ray = Some(ray);
}

/// Move every basic value by `-delta * alpha_i` after the entering variable moved by `delta`.
fn apply_column_step(solver: &mut SimplexSolver, col_aq: &WorkVector, delta: f64) {
    match col_aq.iteration() {
        Iteration::Sparse(indices) => {
            for &i in indices {
                solver.workspace.base_value[i] -= delta * col_aq.get(i);
            }
        },
        Iteration::Dense(dim) => {
            for i in 0..dim {
                solver.workspace.base_value[i] -= delta * col_aq.get(i);
            }
        },
    }
}
