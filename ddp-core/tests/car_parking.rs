//! Car parking: kinematic bicycle over 500 stages with box-bounded
//! steering and acceleration, driven to the origin with smooth-absolute
//! (pseudo-Huber) state costs.

use ddp_core::{
    Cddp, CddpOptions, ControlConstraint, DynamicalSystem, Objective, QuadraticObjective,
    RegularizationOptions, SolutionAccess,
};
use nalgebra::{DMatrix, DVector};

const HORIZON: usize = 500;
const TIMESTEP: f64 = 0.03;
const WHEELBASE: f64 = 2.0;

/// Kinematic bicycle, state `(x, y, θ, v)`, control `(δ, a)`.
struct Car;

impl Car {
    fn vector_field(x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let theta = x[2];
        let v = x[3];
        DVector::from_vec(vec![
            v * theta.cos(),
            v * theta.sin(),
            v * u[0].tan() / WHEELBASE,
            u[1],
        ])
    }
}

impl DynamicalSystem for Car {
    fn state_dim(&self) -> usize {
        4
    }

    fn control_dim(&self) -> usize {
        2
    }

    fn discrete_dynamics(&self, x: &DVector<f64>, u: &DVector<f64>, _t: f64) -> DVector<f64> {
        x + TIMESTEP * Self::vector_field(x, u)
    }

    fn jacobians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _t: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let theta = x[2];
        let v = x[3];
        let delta = u[0];

        let mut fx = DMatrix::zeros(4, 4);
        fx[(0, 2)] = -v * theta.sin();
        fx[(0, 3)] = theta.cos();
        fx[(1, 2)] = v * theta.cos();
        fx[(1, 3)] = theta.sin();
        fx[(2, 3)] = delta.tan() / WHEELBASE;

        let mut fu = DMatrix::zeros(4, 2);
        let sec = 1.0 / delta.cos();
        fu[(2, 0)] = v * sec * sec / WHEELBASE;
        fu[(3, 1)] = 1.0;

        (fx, fu)
    }
}

/// Smooth absolute value `√(z² + p²) − p` and its derivatives.
fn sabs(z: f64, p: f64) -> f64 {
    (z * z + p * p).sqrt() - p
}

fn sabs_d1(z: f64, p: f64) -> f64 {
    z / (z * z + p * p).sqrt()
}

fn sabs_d2(z: f64, p: f64) -> f64 {
    let r = z * z + p * p;
    p * p / (r * r.sqrt())
}

/// Parking objective: quadratic control effort plus pseudo-Huber pulls
/// on position (running) and on the full state (terminal).
struct CarParkingObjective {
    cu: [f64; 2],
    cx: [f64; 2],
    px: [f64; 2],
    cf: [f64; 4],
    pf: [f64; 4],
    reference_state: DVector<f64>,
}

impl CarParkingObjective {
    fn new(goal: DVector<f64>) -> Self {
        Self {
            cu: [1e-2, 1e-4],
            cx: [1e-3, 1e-3],
            px: [0.1, 0.1],
            cf: [0.1, 0.1, 1.0, 0.3],
            pf: [0.01, 0.01, 0.01, 1.0],
            reference_state: goal,
        }
    }
}

impl Objective for CarParkingObjective {
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, _index: usize) -> f64 {
        let lu: f64 = (0..2).map(|i| self.cu[i] * u[i] * u[i]).sum();
        let lx: f64 = (0..2).map(|i| self.cx[i] * sabs(x[i], self.px[i])).sum();
        lu + lx
    }

    fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        let lf: f64 = (0..4).map(|i| self.cf[i] * sabs(x[i], self.pf[i])).sum();
        let lx: f64 = (0..2).map(|i| self.cx[i] * sabs(x[i], self.px[i])).sum();
        lf + lx
    }

    fn running_cost_gradients(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        _index: usize,
    ) -> (DVector<f64>, DVector<f64>) {
        let mut l_x = DVector::zeros(4);
        for i in 0..2 {
            l_x[i] = self.cx[i] * sabs_d1(x[i], self.px[i]);
        }
        let l_u = DVector::from_vec(vec![2.0 * self.cu[0] * u[0], 2.0 * self.cu[1] * u[1]]);
        (l_x, l_u)
    }

    fn running_cost_hessians(
        &self,
        x: &DVector<f64>,
        _u: &DVector<f64>,
        _index: usize,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let mut l_xx = DMatrix::zeros(4, 4);
        for i in 0..2 {
            l_xx[(i, i)] = self.cx[i] * sabs_d2(x[i], self.px[i]);
        }
        let mut l_uu = DMatrix::zeros(2, 2);
        l_uu[(0, 0)] = 2.0 * self.cu[0];
        l_uu[(1, 1)] = 2.0 * self.cu[1];
        (l_xx, l_uu, DMatrix::zeros(2, 4))
    }

    fn terminal_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut grad = DVector::zeros(4);
        for i in 0..4 {
            grad[i] = self.cf[i] * sabs_d1(x[i], self.pf[i]);
        }
        for i in 0..2 {
            grad[i] += self.cx[i] * sabs_d1(x[i], self.px[i]);
        }
        grad
    }

    fn terminal_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut hess = DMatrix::zeros(4, 4);
        for i in 0..4 {
            hess[(i, i)] = self.cf[i] * sabs_d2(x[i], self.pf[i]);
        }
        for i in 0..2 {
            hess[(i, i)] += self.cx[i] * sabs_d2(x[i], self.px[i]);
        }
        hess
    }

    fn reference_state(&self) -> DVector<f64> {
        self.reference_state.clone()
    }

    fn set_reference_state(&mut self, reference_state: DVector<f64>) {
        self.reference_state = reference_state;
    }

    fn set_reference_states(&mut self, _reference_states: Vec<DVector<f64>>) {}
}

#[test]
fn car_parks_within_tolerance() {
    let initial_state = DVector::from_vec(vec![1.0, 1.0, 1.5 * std::f64::consts::PI, 0.0]);
    let goal = DVector::zeros(4);

    let mut options = CddpOptions {
        max_iterations: 600,
        tolerance: 1e-7,
        acceptable_tolerance: 1e-6,
        use_ilqr: true,
        regularization: RegularizationOptions {
            initial_value: 1e-7,
            ..Default::default()
        },
        ..Default::default()
    };
    options.ipddp.barrier.mu_initial = 1.0;
    options.ipddp.dual_var_init_scale = 1e-1;
    options.ipddp.slack_var_init_scale = 1e-2;

    let mut problem = Cddp::new(
        initial_state.clone(),
        goal.clone(),
        HORIZON,
        TIMESTEP,
        Box::new(Car),
        Box::new(CarParkingObjective::new(goal)),
        options,
    );
    problem
        .add_path_constraint(
            "control_bounds",
            Box::new(ControlConstraint::new(DVector::from_vec(vec![0.5, 2.0]))),
        )
        .expect("constraint registration failed");

    // Creep forward slowly as the initial guess, like a driver easing
    // into the maneuver.
    let car = Car;
    let u0 = DVector::from_vec(vec![0.01, 0.01]);
    let mut xs = vec![initial_state.clone()];
    for t in 0..HORIZON {
        let next = car.discrete_dynamics(&xs[t], &u0, t as f64 * TIMESTEP);
        xs.push(next);
    }
    problem.set_initial_trajectory(xs, vec![u0; HORIZON]);

    let solution = problem.solve("IPDDP").expect("solve failed");

    let states = solution.vector_list("state_trajectory").unwrap();
    let controls = solution.vector_list("control_trajectory").unwrap();

    for u in controls {
        assert!(u[0].abs() <= 0.5 + 1e-6, "steering out of bounds: {}", u[0]);
        assert!(u[1].abs() <= 2.0 + 1e-6, "acceleration out of bounds: {}", u[1]);
    }

    let terminal = states.last().unwrap();
    let position_error = (terminal[0] * terminal[0] + terminal[1] * terminal[1]).sqrt();
    assert!(
        position_error <= 0.05,
        "terminal position {position_error} m from goal (status {:?})",
        solution.text("status_message")
    );
    assert!(
        terminal[2].abs() <= 0.05,
        "terminal heading {} rad (status {:?})",
        terminal[2],
        solution.text("status_message")
    );
}

#[test]
fn parallel_solve_matches_serial() {
    // The α-trials and derivative chunks are pure functions of the
    // committed iterate, so enabling the parallel regions must not
    // change the first-accepted trajectory beyond merit tie-breaking.
    let build = |parallel: bool| {
        let q = DMatrix::identity(4, 4) * 0.1;
        let r = DMatrix::identity(2, 2) * 0.1;
        let qf = DMatrix::identity(4, 4) * 10.0;
        let goal = DVector::zeros(4);
        let options = CddpOptions {
            max_iterations: 200,
            tolerance: 1e-6,
            enable_parallel: parallel,
            num_threads: 4,
            ..Default::default()
        };
        let mut problem = Cddp::new(
            DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0]),
            goal.clone(),
            60,
            TIMESTEP,
            Box::new(Car),
            Box::new(QuadraticObjective::new(q, r, qf, goal, TIMESTEP)),
            options,
        );
        problem
            .add_path_constraint(
                "control_bounds",
                Box::new(ControlConstraint::new(DVector::from_vec(vec![0.5, 2.0]))),
            )
            .expect("constraint registration failed");
        problem.solve("IPDDP").expect("solve failed")
    };

    let serial = build(false);
    let parallel = build(true);

    let cost_serial = serial.float("final_objective").unwrap();
    let cost_parallel = parallel.float("final_objective").unwrap();
    assert!(
        (cost_serial - cost_parallel).abs() <= 1e-5 * cost_serial.abs().max(1.0),
        "serial {cost_serial} vs parallel {cost_parallel}"
    );
}
