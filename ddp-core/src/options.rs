//! Solver options.
//!
//! A flat top-level [`CddpOptions`] struct with grouped sub-options for
//! the line search, regularization control, filter line-search, and the
//! IPDDP barrier method. All fields have working defaults; construct with
//! struct-update syntax:
//!
//! ```
//! use ddp_core::CddpOptions;
//!
//! let options = CddpOptions {
//!     max_iterations: 200,
//!     tolerance: 1e-8,
//!     ..Default::default()
//! };
//! ```

use std::fmt;

/// Barrier parameter update strategy for interior-point solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierStrategy {
    /// Reduce μ by a fixed factor after every iteration.
    Monotonic,

    /// IPOPT-style update: reduce only once the KKT error has dropped
    /// below `10·μ`, then take the smaller of the linear and superlinear
    /// reductions.
    Ipopt,

    /// Tier the reduction factor on the ratio of KKT error to μ, so the
    /// barrier collapses quickly when the current subproblem is nearly
    /// solved.
    Adaptive,
}

impl fmt::Display for BarrierStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarrierStrategy::Monotonic => write!(f, "MONOTONIC"),
            BarrierStrategy::Ipopt => write!(f, "IPOPT"),
            BarrierStrategy::Adaptive => write!(f, "ADAPTIVE"),
        }
    }
}

/// Backtracking line-search configuration.
///
/// The step-size ladder is geometric: `initial_step_size`,
/// `initial_step_size·r`, `initial_step_size·r²`, … with
/// `r = step_reduction_factor`, capped at `max_iterations` entries and
/// always ending on `min_step_size`.
#[derive(Debug, Clone)]
pub struct LineSearchOptions {
    /// First (largest) trial step size.
    pub initial_step_size: f64,

    /// Smallest step size ever tried; always the last ladder entry.
    pub min_step_size: f64,

    /// Geometric reduction factor between consecutive trial steps.
    pub step_reduction_factor: f64,

    /// Maximum number of ladder entries.
    pub max_iterations: usize,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        Self {
            initial_step_size: 1.0,
            min_step_size: 1e-6,
            step_reduction_factor: 0.5,
            max_iterations: 20,
        }
    }
}

/// Levenberg–Marquardt-style regularization control.
#[derive(Debug, Clone)]
pub struct RegularizationOptions {
    /// Regularization at the start of a solve.
    pub initial_value: f64,

    /// Multiplicative factor for escalation (and divisor for relaxation).
    pub update_factor: f64,

    /// Lower clamp.
    pub min_value: f64,

    /// Upper clamp; reaching it terminates the solve with
    /// `RegularizationLimitReached_NotConverged`.
    pub max_value: f64,
}

impl Default for RegularizationOptions {
    fn default() -> Self {
        Self {
            initial_value: 1e-6,
            update_factor: 10.0,
            min_value: 1e-8,
            max_value: 1e10,
        }
    }
}

/// Filter line-search acceptance thresholds.
///
/// A trial `(φ', θ')` (merit, ℓ₁ constraint violation) is judged against
/// the current filter entry `(φ, θ)`:
///
/// - `θ' > max_violation_threshold`: accept only on sufficient violation
///   reduction, `θ' < (1 − violation_acceptance_threshold)·θ`.
/// - both violations below `min_violation_for_armijo_check` and a descent
///   direction: switched Armijo test on the merit function.
/// - otherwise: sufficient merit decrease or sufficient violation
///   reduction.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// Merit-decrease margin per unit of constraint violation.
    pub merit_acceptance_threshold: f64,

    /// Relative violation decrease required of a violation-reducing step.
    pub violation_acceptance_threshold: f64,

    /// Violations beyond this are only acceptable if strictly shrinking.
    pub max_violation_threshold: f64,

    /// Below this violation the Armijo test governs acceptance.
    pub min_violation_for_armijo_check: f64,

    /// Armijo slope constant.
    pub armijo_constant: f64,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            merit_acceptance_threshold: 1e-4,
            violation_acceptance_threshold: 1e-4,
            max_violation_threshold: 1e8,
            min_violation_for_armijo_check: 1e-7,
            armijo_constant: 1e-4,
        }
    }
}

/// Barrier parameter schedule.
#[derive(Debug, Clone)]
pub struct BarrierOptions {
    /// Update strategy.
    pub strategy: BarrierStrategy,

    /// Initial barrier parameter μ for constrained problems.
    pub mu_initial: f64,

    /// Floor for μ under the monotonic strategy.
    pub mu_min_value: f64,

    /// Linear reduction factor κ_μ.
    pub mu_update_factor: f64,

    /// Superlinear reduction exponent θ_μ (μ ← μ^θ_μ when smaller).
    pub mu_update_power: f64,

    /// Lower bound on the fraction-to-boundary parameter
    /// τ = max(this, 1 − μ).
    pub min_fraction_to_boundary: f64,
}

impl Default for BarrierOptions {
    fn default() -> Self {
        Self {
            strategy: BarrierStrategy::Adaptive,
            mu_initial: 1e-1,
            mu_min_value: 1e-9,
            mu_update_factor: 0.2,
            mu_update_power: 1.2,
            min_fraction_to_boundary: 0.99,
        }
    }
}

/// IPDDP-specific options.
#[derive(Debug, Clone)]
pub struct IpddpOptions {
    /// Barrier schedule.
    pub barrier: BarrierOptions,

    /// Scale for dual variable initialization; duals are clamped to
    /// `[0.01·scale, 100·scale]`.
    pub dual_var_init_scale: f64,

    /// Minimum initial slack; slacks start at `max(scale, −g)`.
    pub slack_var_init_scale: f64,
}

impl Default for IpddpOptions {
    fn default() -> Self {
        Self {
            barrier: BarrierOptions::default(),
            dual_var_init_scale: 1.0,
            slack_var_init_scale: 1e-2,
        }
    }
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct CddpOptions {
    /// Maximum outer iterations.
    pub max_iterations: usize,

    /// Wall-clock limit in seconds; `0.0` disables the check.
    pub max_cpu_time: f64,

    /// KKT tolerance for `OptimalSolutionFound`.
    pub tolerance: f64,

    /// Cost-change tolerance for `AcceptableSolutionFound`.
    pub acceptable_tolerance: f64,

    /// Print the per-iteration table.
    pub verbose: bool,

    /// Print backward/forward pass diagnostics.
    pub debug: bool,

    /// Drop the dynamics-Hessian terms from the recursion (iLQR).
    pub use_ilqr: bool,

    /// Parallelize derivative evaluation and the forward-pass α-search.
    pub enable_parallel: bool,

    /// Worker threads for the parallel regions.
    pub num_threads: usize,

    /// Reuse trajectories, duals, and slacks from a previous solve.
    pub warm_start: bool,

    /// Record per-iteration histories into the result record.
    pub return_iteration_info: bool,

    /// Print the solver banner before iterating.
    pub print_solver_header: bool,

    /// Print the full option set before iterating.
    pub print_solver_options: bool,

    /// `s_max` in the IPOPT dual-infeasibility scaling.
    pub termination_scaling_max_factor: f64,

    /// Line-search ladder configuration.
    pub line_search: LineSearchOptions,

    /// Regularization control.
    pub regularization: RegularizationOptions,

    /// Filter acceptance thresholds.
    pub filter: FilterOptions,

    /// IPDDP algorithm options.
    pub ipddp: IpddpOptions,
}

impl Default for CddpOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            max_cpu_time: 0.0,
            tolerance: 1e-6,
            acceptable_tolerance: 1e-4,
            verbose: false,
            debug: false,
            use_ilqr: false,
            enable_parallel: false,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            warm_start: false,
            return_iteration_info: false,
            print_solver_header: false,
            print_solver_options: false,
            termination_scaling_max_factor: 100.0,
            line_search: LineSearchOptions::default(),
            regularization: RegularizationOptions::default(),
            filter: FilterOptions::default(),
            ipddp: IpddpOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let opts = CddpOptions::default();
        assert!(opts.tolerance < opts.acceptable_tolerance);
        assert!(opts.line_search.min_step_size < opts.line_search.initial_step_size);
        assert!(opts.regularization.min_value < opts.regularization.max_value);
        assert!(opts.ipddp.barrier.mu_min_value < opts.ipddp.barrier.mu_initial);
        assert!(opts.num_threads >= 1);
    }

    #[test]
    fn barrier_strategy_display() {
        assert_eq!(BarrierStrategy::Monotonic.to_string(), "MONOTONIC");
        assert_eq!(BarrierStrategy::Ipopt.to_string(), "IPOPT");
        assert_eq!(BarrierStrategy::Adaptive.to_string(), "ADAPTIVE");
    }
}
