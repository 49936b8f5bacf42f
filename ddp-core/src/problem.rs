//! Optimal control problem context.
//!
//! [`Cddp`] owns the problem definition (dynamics, objective, constraint
//! sets, horizon, timestep), the live trajectories, and the scalar solver
//! state shared by every algorithm (cost, merit, infeasibility metrics,
//! regularization, line-search ladder). Algorithms mutate the context
//! through the crate-internal fields; callers interact through the
//! setters, accessors, and [`Cddp::solve`].

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::constraint::Constraint;
use crate::error::CddpError;
use crate::objective::Objective;
use crate::options::{CddpOptions, LineSearchOptions};
use crate::solution::{CddpSolution, SolutionValue};
use crate::solver::{self, SolverType};
use crate::system::DynamicalSystem;

/// Problem context for constrained DDP solvers.
pub struct Cddp {
    pub(crate) initial_state: DVector<f64>,
    pub(crate) reference_state: DVector<f64>,
    pub(crate) reference_states: Vec<DVector<f64>>,
    pub(crate) horizon: usize,
    pub(crate) timestep: f64,
    pub(crate) system: Box<dyn DynamicalSystem>,
    pub(crate) objective: Box<dyn Objective>,
    pub(crate) options: CddpOptions,

    pub(crate) path_constraints: BTreeMap<String, Box<dyn Constraint>>,
    pub(crate) terminal_constraints: BTreeMap<String, Box<dyn Constraint>>,
    pub(crate) total_dual_dim: usize,

    // Live trajectories; `x_traj[0]` always equals `initial_state`.
    pub(crate) x_traj: Vec<DVector<f64>>,
    pub(crate) u_traj: Vec<DVector<f64>>,

    // Scalar solver state shared across algorithms.
    pub(crate) cost: f64,
    pub(crate) merit_function: f64,
    pub(crate) inf_pr: f64,
    pub(crate) inf_du: f64,
    pub(crate) inf_comp: f64,
    pub(crate) step_norm: f64,
    pub(crate) alpha_pr: f64,
    pub(crate) alpha_du: f64,
    pub(crate) regularization: f64,
    pub(crate) terminal_regularization: f64,

    pub(crate) alphas: Vec<f64>,
    pub(crate) initialized: bool,
}

impl Cddp {
    /// Create a context from a fully specified problem.
    pub fn new(
        initial_state: DVector<f64>,
        reference_state: DVector<f64>,
        horizon: usize,
        timestep: f64,
        system: Box<dyn DynamicalSystem>,
        mut objective: Box<dyn Objective>,
        options: CddpOptions,
    ) -> Self {
        // A zero reference is treated as "unset" and left to the
        // objective's own centering.
        if reference_state.len() > 0 && reference_state.iter().any(|&v| v != 0.0) {
            objective.set_reference_state(reference_state.clone());
        }

        let alphas = build_alpha_ladder(&options.line_search);
        let alpha_pr = options.line_search.initial_step_size;
        let regularization = options.regularization.initial_value;

        Self {
            initial_state,
            reference_state,
            reference_states: Vec::new(),
            horizon,
            timestep,
            system,
            objective,
            options,
            path_constraints: BTreeMap::new(),
            terminal_constraints: BTreeMap::new(),
            total_dual_dim: 0,
            x_traj: Vec::new(),
            u_traj: Vec::new(),
            cost: 0.0,
            merit_function: 0.0,
            inf_pr: 0.0,
            inf_du: 0.0,
            inf_comp: 0.0,
            step_norm: 0.0,
            alpha_pr,
            alpha_du: 0.0,
            regularization,
            terminal_regularization: regularization,
            alphas,
            initialized: false,
        }
    }

    // --- Configuration -------------------------------------------------

    /// Replace the dynamical system. Dimensions may change, so the
    /// context must be re-initialized before the next solve.
    pub fn set_system(&mut self, system: Box<dyn DynamicalSystem>) {
        self.system = system;
        self.initialized = false;
    }

    /// Replace the initial state; patches `x_traj[0]` when compatible.
    pub fn set_initial_state(&mut self, initial_state: DVector<f64>) {
        if let Some(x0) = self.x_traj.first_mut() {
            if x0.len() == initial_state.len() {
                x0.copy_from(&initial_state);
            }
        }
        self.initial_state = initial_state;
    }

    /// Replace the reference state; forwarded to the objective and
    /// collapsing any reference trajectory to this single entry.
    pub fn set_reference_state(&mut self, reference_state: DVector<f64>) {
        self.objective.set_reference_state(reference_state.clone());
        self.reference_states = vec![reference_state.clone()];
        self.reference_state = reference_state;
    }

    /// Replace the per-stage reference trajectory; the scalar reference
    /// becomes its final entry.
    pub fn set_reference_states(&mut self, reference_states: Vec<DVector<f64>>) {
        self.objective.set_reference_states(reference_states.clone());
        if let Some(last) = reference_states.last() {
            self.reference_state = last.clone();
        }
        self.reference_states = reference_states;
    }

    /// Change the horizon; trajectory sizes change, so the context must
    /// be re-initialized.
    pub fn set_horizon(&mut self, horizon: usize) {
        self.horizon = horizon;
        self.initialized = false;
    }

    /// Change the timestep.
    pub fn set_timestep(&mut self, timestep: f64) {
        self.timestep = timestep;
    }

    /// Replace the options; rebuilds the line-search ladder.
    pub fn set_options(&mut self, options: CddpOptions) {
        self.options = options;
        self.alphas = build_alpha_ladder(&self.options.line_search);
        self.alpha_pr = self.options.line_search.initial_step_size;
    }

    /// Replace the objective; re-applies the context's reference
    /// state/trajectory so both sides stay consistent.
    pub fn set_objective(&mut self, objective: Box<dyn Objective>) {
        self.objective = objective;
        if self.reference_state.len() > 0 && self.reference_state.iter().any(|&v| v != 0.0) {
            self.objective
                .set_reference_state(self.reference_state.clone());
        }
        if !self.reference_states.is_empty() {
            self.objective
                .set_reference_states(self.reference_states.clone());
        }
    }

    /// Seed the solve with an initial trajectory.
    ///
    /// A size mismatch with the horizon is only warned about; the next
    /// initialization pass resizes as needed. The initial state is
    /// re-derived from `x[0]`.
    pub fn set_initial_trajectory(&mut self, x: Vec<DVector<f64>>, u: Vec<DVector<f64>>) {
        if x.len() != self.horizon + 1 || u.len() != self.horizon {
            eprintln!(
                "warning: initial trajectory sizes ({}, {}) do not match horizon {}",
                x.len(),
                u.len(),
                self.horizon
            );
        }
        self.x_traj = x;
        self.u_traj = u;
        if let Some(x0) = self.x_traj.first() {
            self.initial_state = x0.clone();
        }
    }

    // --- Constraint management -----------------------------------------

    /// Add a path (stage-wise) constraint under a unique name.
    pub fn add_path_constraint(
        &mut self,
        name: impl Into<String>,
        constraint: Box<dyn Constraint>,
    ) -> Result<(), CddpError> {
        let dual_dim = constraint.dual_dim();
        if dual_dim == 0 {
            return Err(CddpError::Configuration(
                "cannot add a constraint with zero dual dimension".into(),
            ));
        }
        let name = name.into();
        if let Some(previous) = self.path_constraints.insert(name, constraint) {
            self.total_dual_dim -= previous.dual_dim();
        }
        self.total_dual_dim += dual_dim;
        self.initialized = false;
        Ok(())
    }

    /// Remove a path constraint; returns whether it existed.
    pub fn remove_path_constraint(&mut self, name: &str) -> bool {
        match self.path_constraints.remove(name) {
            Some(constraint) => {
                self.total_dual_dim -= constraint.dual_dim();
                self.initialized = false;
                true
            }
            None => false,
        }
    }

    /// Add a terminal constraint under a unique name.
    pub fn add_terminal_constraint(
        &mut self,
        name: impl Into<String>,
        constraint: Box<dyn Constraint>,
    ) -> Result<(), CddpError> {
        let dual_dim = constraint.dual_dim();
        if dual_dim == 0 {
            return Err(CddpError::Configuration(
                "cannot add a constraint with zero dual dimension".into(),
            ));
        }
        let name = name.into();
        if let Some(previous) = self.terminal_constraints.insert(name, constraint) {
            self.total_dual_dim -= previous.dual_dim();
        }
        self.total_dual_dim += dual_dim;
        self.initialized = false;
        Ok(())
    }

    /// Remove a terminal constraint; returns whether it existed.
    pub fn remove_terminal_constraint(&mut self, name: &str) -> bool {
        match self.terminal_constraints.remove(name) {
            Some(constraint) => {
                self.total_dual_dim -= constraint.dual_dim();
                self.initialized = false;
                true
            }
            None => false,
        }
    }

    // --- Accessors ------------------------------------------------------

    pub fn state_dim(&self) -> usize {
        self.system.state_dim()
    }

    pub fn control_dim(&self) -> usize {
        self.system.control_dim()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn initial_state(&self) -> &DVector<f64> {
        &self.initial_state
    }

    pub fn reference_state(&self) -> &DVector<f64> {
        &self.reference_state
    }

    pub fn options(&self) -> &CddpOptions {
        &self.options
    }

    pub fn system(&self) -> &dyn DynamicalSystem {
        self.system.as_ref()
    }

    pub fn objective(&self) -> &dyn Objective {
        self.objective.as_ref()
    }

    /// Path constraints in name order.
    pub fn path_constraint_set(&self) -> &BTreeMap<String, Box<dyn Constraint>> {
        &self.path_constraints
    }

    /// Terminal constraints in name order.
    pub fn terminal_constraint_set(&self) -> &BTreeMap<String, Box<dyn Constraint>> {
        &self.terminal_constraints
    }

    /// Combined dual dimension over all registered constraints.
    pub fn total_dual_dim(&self) -> usize {
        self.total_dual_dim
    }

    pub fn state_trajectory(&self) -> &[DVector<f64>] {
        &self.x_traj
    }

    pub fn control_trajectory(&self) -> &[DVector<f64>] {
        &self.u_traj
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn merit_function(&self) -> f64 {
        self.merit_function
    }

    pub fn primal_infeasibility(&self) -> f64 {
        self.inf_pr
    }

    pub fn dual_infeasibility(&self) -> f64 {
        self.inf_du
    }

    pub fn complementary_infeasibility(&self) -> f64 {
        self.inf_comp
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// The descending line-search step-size ladder.
    pub fn alphas(&self) -> &[f64] {
        &self.alphas
    }

    /// Whether the unscaled KKT residuals are within tolerance.
    pub fn is_kkt_tolerance_satisfied(&self) -> bool {
        self.inf_pr <= self.options.tolerance && self.inf_du <= self.options.tolerance
    }

    // --- Regularization control ------------------------------------------

    pub fn increase_regularization(&mut self) {
        let reg = &self.options.regularization;
        self.regularization = (self.regularization * reg.update_factor).min(reg.max_value);
    }

    pub fn decrease_regularization(&mut self) {
        let reg = &self.options.regularization;
        self.regularization = (self.regularization / reg.update_factor).max(reg.min_value);
    }

    pub fn is_regularization_limit_reached(&self) -> bool {
        self.regularization >= self.options.regularization.max_value
    }

    pub fn increase_terminal_regularization(&mut self) {
        let reg = &self.options.regularization;
        self.terminal_regularization =
            (self.terminal_regularization * reg.update_factor).min(reg.max_value);
    }

    pub fn decrease_terminal_regularization(&mut self) {
        let reg = &self.options.regularization;
        self.terminal_regularization =
            (self.terminal_regularization / reg.update_factor).max(reg.min_value);
    }

    // --- Solve ------------------------------------------------------------

    /// Solve with a well-known algorithm.
    pub fn solve_type(&mut self, solver_type: SolverType) -> Result<CddpSolution, CddpError> {
        self.solve(solver_type.as_str())
    }

    /// Solve with the algorithm registered under `solver_name`.
    ///
    /// An unknown name is not an error: the returned record carries an
    /// `UnknownSolver` status and empty trajectories.
    pub fn solve(&mut self, solver_name: &str) -> Result<CddpSolution, CddpError> {
        self.initialize_if_necessary();

        let Some(mut algorithm) = solver::create_solver(solver_name) else {
            if self.options.verbose {
                let mut known = solver::registered_solvers();
                known.push("IPDDP".to_string());
                eprintln!(
                    "solver '{}' not found; registered solvers: {}",
                    solver_name,
                    known.join(" ")
                );
            }
            return Ok(unknown_solver_solution(solver_name));
        };

        algorithm.initialize(self)?;
        algorithm.solve(self)
    }

    /// Size trajectories and reset scalar state ahead of a solve.
    ///
    /// Compatible trajectories are preserved (the warm-start path and
    /// repeated solves rely on this); anything mis-sized is zero-filled.
    /// The first state is always forced to the initial state.
    fn initialize_if_necessary(&mut self) {
        if self.initialized {
            return;
        }

        let n = self.system.state_dim();
        let m = self.system.control_dim();

        let states_compatible = self.x_traj.len() == self.horizon + 1
            && self.x_traj.iter().all(|x| x.len() == n);
        if !states_compatible {
            self.x_traj = vec![DVector::zeros(n); self.horizon + 1];
        } else if self.options.warm_start && self.options.verbose {
            println!("CDDP: warm start, preserving existing state trajectory");
        }

        self.x_traj[0] = self.initial_state.clone();

        let controls_compatible =
            self.u_traj.len() == self.horizon && self.u_traj.iter().all(|u| u.len() == m);
        if !controls_compatible {
            self.u_traj = vec![DVector::zeros(m); self.horizon];
        } else if self.options.warm_start && self.options.verbose {
            println!("CDDP: warm start, preserving existing control trajectory");
        }

        self.cost = f64::INFINITY;
        self.merit_function = f64::INFINITY;
        self.inf_pr = f64::INFINITY;
        self.inf_du = f64::INFINITY;
        self.inf_comp = f64::INFINITY;
        self.regularization = self.options.regularization.initial_value;
        self.terminal_regularization = self.options.regularization.initial_value;

        self.initialized = true;
    }
}

/// Result record for an unrecognized solver name.
fn unknown_solver_solution(solver_name: &str) -> CddpSolution {
    let mut solution = CddpSolution::new();
    solution.insert(
        "solver_name".into(),
        SolutionValue::Text(solver_name.to_string()),
    );
    solution.insert(
        "status_message".into(),
        SolutionValue::Text(format!(
            "UnknownSolver - No solver registered for '{solver_name}'"
        )),
    );
    solution.insert("iterations_completed".into(), SolutionValue::Int(0));
    solution.insert("solve_time_ms".into(), SolutionValue::Float(0.0));
    solution.insert("final_objective".into(), SolutionValue::Float(0.0));
    solution.insert("final_step_length".into(), SolutionValue::Float(1.0));
    solution.insert("time_points".into(), SolutionValue::FloatList(Vec::new()));
    solution.insert(
        "state_trajectory".into(),
        SolutionValue::VectorList(Vec::new()),
    );
    solution.insert(
        "control_trajectory".into(),
        SolutionValue::VectorList(Vec::new()),
    );
    solution
}

/// Build the descending geometric step-size ladder.
///
/// Starts at `initial_step_size`, multiplies by `step_reduction_factor`,
/// caps the length at `max_iterations`, and always ends exactly on
/// `min_step_size`.
fn build_alpha_ladder(line_search: &LineSearchOptions) -> Vec<f64> {
    if line_search.max_iterations == 0 {
        return vec![line_search.initial_step_size];
    }

    let mut alphas = Vec::with_capacity(line_search.max_iterations);
    let mut alpha = line_search.initial_step_size;
    while alpha > line_search.min_step_size && alphas.len() + 1 < line_search.max_iterations {
        alphas.push(alpha);
        alpha *= line_search.step_reduction_factor;
    }
    alphas.push(line_search.min_step_size);
    alphas
}
