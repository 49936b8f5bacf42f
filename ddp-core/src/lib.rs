//! Constrained differential dynamic programming for finite-horizon
//! discrete-time optimal control.
//!
//! The crate solves problems of the form
//!
//! ```text
//! minimize    Σₜ l(xₜ, uₜ, t) + φ(x_H)
//! subject to  xₜ₊₁ = f(xₜ, uₜ, t·Δ)
//!             g_c(xₜ, uₜ) ≤ ub_c          for every path constraint c
//! ```
//!
//! over a horizon of `H` stages with timestep `Δ`. Dynamics, objectives,
//! and constraints are supplied through the [`DynamicalSystem`],
//! [`Objective`], and [`Constraint`] traits; the solver only sees their
//! values and first/second derivatives.
//!
//! # Algorithm
//!
//! The built-in solver is **IPDDP**, a primal-dual interior-point method
//! layered on the DDP backward recursion:
//!
//! - a Riccati-style backward pass augmented with slack and dual
//!   variables, regularized Levenberg–Marquardt style,
//! - a nonlinear rollout forward pass with a fraction-to-the-boundary
//!   rule and filter line-search acceptance,
//! - barrier parameter scheduling (monotonic, IPOPT-style, or adaptive),
//! - IPOPT-scaled KKT residuals driving termination.
//!
//! # Example
//!
//! ```ignore
//! use ddp_core::{Cddp, CddpOptions, QuadraticObjective, SolverType};
//!
//! let objective = QuadraticObjective::new(q, r, qf, x_goal, 0.1);
//! let mut problem = Cddp::new(x0, x_goal, 100, 0.1,
//!                             Box::new(system), Box::new(objective),
//!                             CddpOptions::default());
//! problem.add_path_constraint("control_bounds",
//!     Box::new(ControlConstraint::new(u_max)))?;
//!
//! let solution = problem.solve_type(SolverType::Ipddp)?;
//! println!("status: {}", solution.text("status_message").unwrap());
//! ```
//!
//! Additional solver algorithms can be attached at runtime through
//! [`register_solver`]; selecting a name with no registered algorithm
//! yields a result record with an `UnknownSolver` status rather than an
//! error.

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // DDP recursions carry many operands

pub mod constraint;
pub mod error;
pub mod ipddp;
pub mod objective;
pub mod options;
pub mod problem;
pub mod solution;
pub mod solver;
pub mod system;

pub use constraint::{Constraint, ControlConstraint};
pub use error::CddpError;
pub use objective::{Objective, QuadraticObjective};
pub use options::{
    BarrierOptions, BarrierStrategy, CddpOptions, FilterOptions, IpddpOptions,
    LineSearchOptions, RegularizationOptions,
};
pub use problem::Cddp;
pub use solution::{CddpSolution, SolutionAccess, SolutionValue};
pub use solver::{
    is_solver_registered, register_solver, registered_solvers, SolverAlgorithm, SolverType,
};
pub use system::DynamicalSystem;
