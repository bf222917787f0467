//! End-to-end solves of small programs with known outcomes.
use approx::assert_abs_diff_eq;

use revlp::algorithm::simplex::options::{Options, Strategy};
use revlp::algorithm::simplex::SimplexSolver;
use revlp::data::linear_algebra::matrix::ColumnMatrix;
use revlp::data::linear_program::canonical_form::CanonicalLp;
use revlp::data::linear_program::elements::{ModelStatus, Objective, SolveStatus, VariableStatus};

const INF: f64 = f64::INFINITY;

/// Assemble a canonical program from dense row data.
fn lp(
    sense: Objective,
    offset: f64,
    cost: &[f64],
    col_bounds: &[(f64, f64)],
    rows: &[(&[f64], f64, f64)],
) -> CanonicalLp {
    let num_col = cost.len();
    let num_row = rows.len();
    assert_eq!(col_bounds.len(), num_col);

    let mut start = vec![0];
    let mut index = Vec::new();
    let mut value = Vec::new();
    for column in 0..num_col {
        for (row, (coefficients, _, _)) in rows.iter().enumerate() {
            assert_eq!(coefficients.len(), num_col);
            if coefficients[column] != 0.0 {
                index.push(row);
                value.push(coefficients[column]);
            }
        }
        start.push(index.len());
    }

    CanonicalLp::new(
        num_row,
        num_col,
        ColumnMatrix::new(num_row, num_col, start, index, value),
        cost.to_vec(),
        col_bounds.iter().map(|&(lower, _)| lower).collect(),
        col_bounds.iter().map(|&(_, upper)| upper).collect(),
        rows.iter().map(|&(_, lower, _)| lower).collect(),
        rows.iter().map(|&(_, _, upper)| upper).collect(),
        sense,
        offset,
    )
    .unwrap()
}

fn solver_with(lp: CanonicalLp, options: Options) -> SimplexSolver {
    let mut solver = SimplexSolver::new(options);
    solver.pass_lp(lp);
    solver
}

mod scenarios {
    use super::*;

    #[test]
    fn empty_program_is_optimal_at_the_offset() {
        let program = lp(Objective::Minimize, 7.5, &[], &[], &[]);
        let mut solver = solver_with(program, Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_eq!(solver.iteration_count(), 0);
        assert_abs_diff_eq!(solver.solution().unwrap().objective_value, 7.5);
    }

    #[test]
    fn boxed_variable_needs_no_iterations() {
        let program = lp(Objective::Minimize, 0.0, &[1.0], &[(1.0, 2.0)], &[]);
        let mut solver = solver_with(program, Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_eq!(solver.iteration_count(), 0);

        let solution = solver.solution().unwrap();
        assert_abs_diff_eq!(solution.col_value[0], 1.0);
        assert_abs_diff_eq!(solution.objective_value, 1.0);
    }

    /// The classical cycling example: it must terminate even with perturbation disabled.
    #[test]
    fn beale_terminates_at_minus_one_twentieth() {
        let program = lp(
            Objective::Minimize,
            0.0,
            &[-0.75, 150.0, -0.02, 6.0],
            &[(0.0, INF), (0.0, INF), (0.0, INF), (0.0, INF)],
            &[
                (&[0.25, -60.0, -0.04, 9.0], -INF, 0.0),
                (&[0.5, -90.0, -0.02, 3.0], -INF, 0.0),
                (&[0.0, 0.0, 1.0, 0.0], -INF, 1.0),
            ],
        );
        let mut options = Options::default();
        options.dual_cost_perturbation_multiplier = 0.0;
        options.primal_bound_perturbation_multiplier = 0.0;
        options.iteration_limit = 1000;
        let mut solver = solver_with(program, options);
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_abs_diff_eq!(
            solver.solution().unwrap().objective_value,
            -0.05,
            epsilon = 1e-9,
        );
    }

    #[test]
    fn unbounded_program_reports_a_ray() {
        let program = lp(Objective::Maximize, 0.0, &[1.0], &[(0.0, INF)], &[]);
        let mut solver = solver_with(program, Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Unbounded);

        let ray = solver.primal_ray().unwrap();
        assert_abs_diff_eq!(ray[0], 1.0);
    }

    #[test]
    fn contradictory_rows_are_infeasible_with_a_dual_ray() {
        let program = lp(
            Objective::Minimize,
            0.0,
            &[0.0],
            &[(-INF, INF)],
            &[(&[1.0], 2.0, INF), (&[1.0], -INF, 1.0)],
        );
        let mut solver = solver_with(program, Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Infeasible);
        assert!(solver.dual_ray().is_some());
    }

    #[test]
    fn rank_deficient_start_is_repaired() {
        let program = lp(
            Objective::Minimize,
            0.0,
            &[-1.0, -1.0],
            &[(0.0, 3.0), (0.0, 3.0)],
            &[(&[1.0, 1.0], -INF, 4.0), (&[1.0, 1.0], -INF, 4.0)],
        );
        let mut solver = solver_with(program, Options::default());
        // Declare both structural columns basic: the basis matrix has two identical
        // columns and is singular; one of them must give way to a logical.
        let mut external = {
            solver.set_logical_basis().unwrap();
            solver.basis().unwrap()
        };
        external.col_status = vec![VariableStatus::Basic, VariableStatus::Basic];
        external.row_status = vec![VariableStatus::Upper, VariableStatus::Upper];
        solver.set_basis(&external).unwrap();
        solver.initialise_basis_and_factor(false).unwrap();

        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_abs_diff_eq!(solver.solution().unwrap().objective_value, -4.0, epsilon = 1e-9);
    }
}

mod laws {
    use super::*;

    fn two_by_two() -> CanonicalLp {
        lp(
            Objective::Minimize,
            0.0,
            &[-2.0, -3.0],
            &[(0.0, 10.0), (0.0, 10.0)],
            &[(&[1.0, 1.0], -INF, 4.0), (&[1.0, 3.0], -INF, 6.0)],
        )
    }

    #[test]
    fn resolving_an_optimal_basis_takes_no_iterations() {
        let mut solver = solver_with(two_by_two(), Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_abs_diff_eq!(solver.solution().unwrap().objective_value, -9.0, epsilon = 1e-9);
        let basis = solver.basis().unwrap();

        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_eq!(solver.iteration_count(), 0);
        assert_eq!(solver.basis().unwrap(), basis);
    }

    #[test]
    fn basis_round_trips_through_the_external_convention() {
        let mut solver = solver_with(two_by_two(), Options::default());
        solver.solve().unwrap();
        let external = solver.basis().unwrap();

        let mut warm = solver_with(two_by_two(), Options::default());
        warm.set_basis(&external).unwrap();
        assert_eq!(warm.solve().unwrap(), ModelStatus::Optimal);
        assert_eq!(warm.iteration_count(), 0);
        assert_eq!(warm.basis().unwrap(), external);
    }

    #[test]
    fn same_seed_gives_identical_runs() {
        let run = || {
            let mut solver = solver_with(two_by_two(), Options::default());
            solver.solve().unwrap();
            (solver.iteration_count(), solver.solution().unwrap().objective_value)
        };
        let (iterations_a, objective_a) = run();
        let (iterations_b, objective_b) = run();
        assert_eq!(iterations_a, iterations_b);
        assert_eq!(objective_a, objective_b);
    }

    #[test]
    fn forced_refactorization_does_not_change_the_result() {
        let mut eager = Options::default();
        eager.update_limit = 1;
        let mut frequent = solver_with(two_by_two(), eager);
        frequent.solve().unwrap();

        let mut lazy = solver_with(two_by_two(), Options::default());
        lazy.solve().unwrap();

        assert_abs_diff_eq!(
            frequent.solution().unwrap().objective_value,
            lazy.solution().unwrap().objective_value,
            epsilon = 1e-9,
        );
    }

    #[test]
    fn iteration_limit_is_a_warning_and_the_solve_resumes() {
        let mut options = Options::default();
        options.iteration_limit = 1;
        let mut solver = solver_with(two_by_two(), options);
        let status = solver.solve().unwrap();
        assert_eq!(status, ModelStatus::IterationLimit);
        assert_eq!(solver.status(), SolveStatus::Warning);

        // The partial basis is valid: warm-starting from it reaches the optimum.
        let external = solver.basis().unwrap();
        let mut resumed = solver_with(two_by_two(), Options::default());
        resumed.set_basis(&external).unwrap();
        assert_eq!(resumed.solve().unwrap(), ModelStatus::Optimal);
        assert_abs_diff_eq!(
            resumed.solution().unwrap().objective_value,
            -9.0,
            epsilon = 1e-9,
        );
    }
}

mod conventions {
    use super::*;

    #[test]
    fn maximization_and_row_values_follow_the_interface_conventions() {
        let program = lp(
            Objective::Maximize,
            0.0,
            &[3.0, 2.0],
            &[(0.0, INF), (0.0, INF)],
            &[(&[1.0, 1.0], -INF, 4.0), (&[1.0, 3.0], -INF, 6.0)],
        );
        let mut solver = solver_with(program, Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);

        let solution = solver.solution().unwrap();
        assert_abs_diff_eq!(solution.objective_value, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.col_value[0], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.col_value[1], 0.0, epsilon = 1e-9);
        // Row values are the activities of the original rows.
        assert_abs_diff_eq!(solution.row_value[0], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.row_value[1], 4.0, epsilon = 1e-9);
        // The binding row prices the objective, the slack row does not.
        assert_abs_diff_eq!(solution.row_dual[0].abs(), 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.row_dual[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn forced_dual_strategy_reaches_the_same_optimum() {
        let mut options = Options::default();
        options.strategy = Strategy::Dual;
        let program = lp(
            Objective::Minimize,
            0.0,
            &[-2.0, -3.0],
            &[(0.0, 10.0), (0.0, 10.0)],
            &[(&[1.0, 1.0], -INF, 4.0), (&[1.0, 3.0], -INF, 6.0)],
        );
        let mut solver = solver_with(program, options);
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_abs_diff_eq!(solver.solution().unwrap().objective_value, -9.0, epsilon = 1e-9);
    }

    #[test]
    fn dual_phase_one_reaches_the_optimum_of_a_one_sided_program() {
        let mut options = Options::default();
        options.strategy = Strategy::Dual;
        // A one-sided dual infeasibility at the start forces dual phase 1.
        let program = lp(
            Objective::Minimize,
            0.0,
            &[-1.0],
            &[(0.0, INF)],
            &[(&[1.0], -INF, 2.0)],
        );
        let mut solver = solver_with(program, options);
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        let solution = solver.solution().unwrap();
        assert_abs_diff_eq!(solution.col_value[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.objective_value, -2.0, epsilon = 1e-9);
    }

    #[test]
    fn deleting_a_nonbasic_column_keeps_the_basis_usable() {
        let full = lp(
            Objective::Minimize,
            0.0,
            &[-2.0, -3.0, 5.0],
            &[(0.0, 10.0), (0.0, 10.0), (0.0, 10.0)],
            &[(&[1.0, 1.0, 1.0], -INF, 4.0), (&[1.0, 3.0, 0.0], -INF, 6.0)],
        );
        let mut solver = solver_with(full, Options::default());
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);

        // The expensive third column never enters the basis; removing it must leave a
        // solvable state behind.
        let reduced = lp(
            Objective::Minimize,
            0.0,
            &[-2.0, -3.0],
            &[(0.0, 10.0), (0.0, 10.0)],
            &[(&[1.0, 1.0], -INF, 4.0), (&[1.0, 3.0], -INF, 6.0)],
        );
        solver.delete_cols(reduced, &[2]).unwrap();
        assert_eq!(solver.solve().unwrap(), ModelStatus::Optimal);
        assert_abs_diff_eq!(solver.solution().unwrap().objective_value, -9.0, epsilon = 1e-9);
    }
}
