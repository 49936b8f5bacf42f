//! Unconstrained solves on a double integrator: exactness against the
//! finite-horizon Riccati recursion, rollout consistency, repeat-solve
//! stability, and regularization escalation on an indefinite problem.

mod common;

use common::{double_integrator_ab, DoubleIntegrator};
use ddp_core::{Cddp, CddpOptions, QuadraticObjective, RegularizationOptions, SolutionAccess};
use nalgebra::{DMatrix, DVector};

const HORIZON: usize = 20;
const TIMESTEP: f64 = 0.1;

fn lqr_problem() -> Cddp {
    let q = DMatrix::identity(2, 2);
    let r = DMatrix::identity(1, 1) * 0.1;
    let qf = DMatrix::identity(2, 2) * 10.0;
    let x0 = DVector::from_vec(vec![1.0, 0.0]);
    let goal = DVector::zeros(2);

    let objective = QuadraticObjective::new(q, r, qf, goal.clone(), TIMESTEP);
    let options = CddpOptions {
        max_iterations: 20,
        tolerance: 1e-8,
        regularization: RegularizationOptions {
            initial_value: 1e-9,
            min_value: 1e-10,
            ..Default::default()
        },
        ..Default::default()
    };

    Cddp::new(
        x0,
        goal,
        HORIZON,
        TIMESTEP,
        Box::new(DoubleIntegrator { timestep: TIMESTEP }),
        Box::new(objective),
        options,
    )
}

/// Optimal finite-horizon LQR cost via the exact Riccati recursion, with
/// the same cost convention the solver sees (running weights scaled by
/// the timestep, no 1/2 factors).
fn riccati_optimal_cost(x0: &DVector<f64>) -> f64 {
    let (a, b) = double_integrator_ab(TIMESTEP);
    let q = DMatrix::identity(2, 2) * TIMESTEP;
    let r = DMatrix::identity(1, 1) * (0.1 * TIMESTEP);
    let qf = DMatrix::identity(2, 2) * 10.0;

    let mut p = qf;
    for _ in 0..HORIZON {
        let btpb = &r + b.transpose() * &p * &b;
        let btpa = b.transpose() * &p * &a;
        let gain = btpb
            .try_inverse()
            .expect("R + BᵀPB must be invertible")
            * &btpa;
        p = &q + a.transpose() * &p * &a - btpa.transpose() * gain;
    }

    (x0.transpose() * &p * x0)[(0, 0)]
}

#[test]
fn lqr_matches_riccati_in_few_iterations() {
    let mut problem = lqr_problem();
    let solution = problem.solve("IPDDP").expect("solve failed");

    assert_eq!(
        solution.text("status_message"),
        Some("OptimalSolutionFound"),
        "unexpected status: {:?}",
        solution.text("status_message")
    );
    assert!(solution.int("iterations_completed").unwrap() <= 3);

    let expected = riccati_optimal_cost(&DVector::from_vec(vec![1.0, 0.0]));
    let final_cost = solution.float("final_objective").unwrap();
    assert!(
        (final_cost - expected).abs() < 1e-6,
        "cost {final_cost} vs Riccati {expected}"
    );

    let controls = solution.vector_list("control_trajectory").unwrap();
    let u_max = controls.iter().map(|u| u.amax()).fold(0.0_f64, f64::max);
    assert!(u_max < 10.0);
}

#[test]
fn accepted_states_are_the_exact_rollout() {
    let mut problem = lqr_problem();
    let solution = problem.solve("IPDDP").expect("solve failed");

    let states = solution.vector_list("state_trajectory").unwrap();
    let controls = solution.vector_list("control_trajectory").unwrap();

    let system = DoubleIntegrator { timestep: TIMESTEP };
    let mut x = states[0].clone();
    for t in 0..HORIZON {
        use ddp_core::DynamicalSystem;
        x = system.discrete_dynamics(&x, &controls[t], t as f64 * TIMESTEP);
        let gap = (&x - &states[t + 1]).amax();
        assert!(gap < 1e-12, "rollout mismatch at stage {t}: {gap}");
    }
}

#[test]
fn repeated_solve_is_stable() {
    let mut problem = lqr_problem();
    let first = problem.solve("IPDDP").expect("first solve failed");
    let second = problem.solve("IPDDP").expect("second solve failed");

    let states_a = first.vector_list("state_trajectory").unwrap();
    let states_b = second.vector_list("state_trajectory").unwrap();
    let controls_a = first.vector_list("control_trajectory").unwrap();
    let controls_b = second.vector_list("control_trajectory").unwrap();

    for (xa, xb) in states_a.iter().zip(states_b) {
        assert!((xa - xb).amax() < 1e-10);
    }
    for (ua, ub) in controls_a.iter().zip(controls_b) {
        assert!((ua - ub).amax() < 1e-10);
    }
}

#[test]
fn indefinite_control_cost_escalates_regularization() {
    // Negative control curvature keeps Q_uu indefinite for any
    // regularization the (deliberately low) cap allows, so the solver
    // must escalate to the limit and report it, with finite outputs.
    let q = DMatrix::zeros(2, 2);
    let r = DMatrix::identity(1, 1) * -1.0;
    let qf = DMatrix::identity(2, 2);
    let goal = DVector::zeros(2);

    let objective = QuadraticObjective::new(q, r, qf, goal.clone(), TIMESTEP);
    let options = CddpOptions {
        max_iterations: 50,
        regularization: RegularizationOptions {
            initial_value: 1e-6,
            update_factor: 10.0,
            min_value: 1e-8,
            max_value: 0.1,
        },
        ..Default::default()
    };

    let mut problem = Cddp::new(
        DVector::from_vec(vec![1.0, 0.0]),
        goal,
        HORIZON,
        TIMESTEP,
        Box::new(DoubleIntegrator { timestep: TIMESTEP }),
        Box::new(objective),
        options,
    );

    let solution = problem.solve("IPDDP").expect("solve failed");
    assert_eq!(
        solution.text("status_message"),
        Some("RegularizationLimitReached_NotConverged")
    );

    assert!(solution.float("final_objective").unwrap().is_finite());
    let reg = solution.float("final_regularization").unwrap();
    assert!(reg <= 0.1 + 1e-15 && reg >= 1e-8);
    for x in solution.vector_list("state_trajectory").unwrap() {
        assert!(x.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn unknown_solver_returns_status_record() {
    let mut problem = lqr_problem();
    let solution = problem.solve("NoSuchSolver").expect("solve failed");

    let status = solution.text("status_message").unwrap();
    assert!(status.starts_with("UnknownSolver"), "status: {status}");
    assert_eq!(solution.int("iterations_completed"), Some(0));
    assert!(solution
        .vector_list("state_trajectory")
        .unwrap()
        .is_empty());
}
