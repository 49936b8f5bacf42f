//! Interior-point differential dynamic programming (IPDDP).
//!
//! A primal-dual barrier method on top of the DDP recursion. Inequality
//! constraints get per-stage slack and dual variables kept strictly
//! positive by a fraction-to-the-boundary rule; the log-barrier weight μ
//! is driven toward zero by a configurable schedule while a filter
//! line-search arbitrates between merit decrease and constraint
//! violation decrease.
//!
//! Per outer iteration:
//!
//! 1. refresh the derivative cache and run the backward pass, escalating
//!    regularization until the control block factors;
//! 2. run the forward pass over the step-size ladder (serial
//!    first-accepted or parallel best-merit);
//! 3. commit the accepted trial, relax regularization, check the scaled
//!    KKT residuals for termination;
//! 4. update μ and reset the filter.
//!
//! The solver value itself carries the slack/dual trajectories and all
//! gains, so a caller holding an `IpddpSolver` across solves gets warm
//! restarts of the full primal-dual state.

pub(crate) mod backward;
pub(crate) mod barrier;
pub(crate) mod derivatives;
pub(crate) mod forward;
pub(crate) mod init;
pub(crate) mod termination;

use std::time::Instant;

use nalgebra::{DMatrix, DVector};

use crate::error::CddpError;
use crate::options::CddpOptions;
use crate::problem::Cddp;
use crate::solution::{CddpSolution, SolutionValue};
use crate::solver::SolverAlgorithm;

use derivatives::{ConstraintLayout, DerivativeCache};
use forward::ForwardPassResult;

/// One `(merit, violation)` filter entry; the filter holds the most
/// recent accepted pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FilterPoint {
    pub merit: f64,
    pub violation: f64,
}

/// Interior-point DDP solver state.
///
/// Slack (`s`), dual (`y`), and constraint-residual (`g`) trajectories
/// are stage-major and stacked over the ordered constraint set; gains
/// mirror that layout.
#[allow(non_snake_case)] // K_* are the standard feedback-gain symbols
pub struct IpddpSolver {
    pub(crate) mu: f64,
    pub(crate) layout: ConstraintLayout,
    pub(crate) cache: DerivativeCache,
    pub(crate) dv: [f64; 2],
    pub(crate) filter: Vec<FilterPoint>,

    pub(crate) k_u: Vec<DVector<f64>>,
    pub(crate) K_u: Vec<DMatrix<f64>>,
    pub(crate) k_y: Vec<DVector<f64>>,
    pub(crate) K_y: Vec<DMatrix<f64>>,
    pub(crate) k_s: Vec<DVector<f64>>,
    pub(crate) K_s: Vec<DMatrix<f64>>,

    pub(crate) y_traj: Vec<DVector<f64>>,
    pub(crate) s_traj: Vec<DVector<f64>>,
    pub(crate) g_traj: Vec<DVector<f64>>,
}

impl IpddpSolver {
    pub fn new() -> Self {
        Self {
            mu: 1e-1,
            layout: ConstraintLayout::default(),
            cache: DerivativeCache::default(),
            dv: [0.0, 0.0],
            filter: Vec::new(),
            k_u: Vec::new(),
            K_u: Vec::new(),
            k_y: Vec::new(),
            K_y: Vec::new(),
            k_s: Vec::new(),
            K_s: Vec::new(),
            y_traj: Vec::new(),
            s_traj: Vec::new(),
            g_traj: Vec::new(),
        }
    }

    /// Current barrier parameter.
    pub fn barrier_parameter(&self) -> f64 {
        self.mu
    }
}

impl Default for IpddpSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverAlgorithm for IpddpSolver {
    fn solver_name(&self) -> &'static str {
        "IPDDP"
    }

    fn initialize(&mut self, context: &mut Cddp) -> Result<(), CddpError> {
        self.initialize_solver(context)
    }

    fn solve(&mut self, context: &mut Cddp) -> Result<CddpSolution, CddpError> {
        Ok(self.run(context))
    }
}

/// Per-iteration scalar histories, recorded when requested.
#[derive(Default)]
struct IterationHistory {
    objective: Vec<f64>,
    merit_function: Vec<f64>,
    step_length_primal: Vec<f64>,
    step_length_dual: Vec<f64>,
    dual_infeasibility: Vec<f64>,
    primal_infeasibility: Vec<f64>,
    complementary_infeasibility: Vec<f64>,
    barrier_mu: Vec<f64>,
}

impl IterationHistory {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            objective: Vec::with_capacity(capacity),
            merit_function: Vec::with_capacity(capacity),
            step_length_primal: Vec::with_capacity(capacity),
            step_length_dual: Vec::with_capacity(capacity),
            dual_infeasibility: Vec::with_capacity(capacity),
            primal_infeasibility: Vec::with_capacity(capacity),
            complementary_infeasibility: Vec::with_capacity(capacity),
            barrier_mu: Vec::with_capacity(capacity),
        }
    }

    fn record(&mut self, context: &Cddp, mu: f64, alpha_pr: f64, alpha_du: f64) {
        self.objective.push(context.cost);
        self.merit_function.push(context.merit_function);
        self.step_length_primal.push(alpha_pr);
        self.step_length_dual.push(alpha_du);
        self.dual_infeasibility.push(context.inf_du);
        self.primal_infeasibility.push(context.inf_pr);
        self.complementary_infeasibility.push(context.inf_comp);
        self.barrier_mu.push(mu);
    }
}

impl IpddpSolver {
    /// Main solve loop.
    fn run(&mut self, context: &mut Cddp) -> CddpSolution {
        let options = context.options.clone();

        if options.print_solver_header {
            print_header();
        }
        if options.print_solver_options {
            print_options(&options);
        }

        let mut history = IterationHistory::with_capacity(if options.return_iteration_info {
            options.max_iterations + 1
        } else {
            0
        });
        if options.return_iteration_info {
            history.record(context, self.mu, 1.0, 1.0);
        }

        if options.verbose {
            self.print_iteration(0, context, context.alpha_du, context.alpha_pr);
        }

        let start = Instant::now();
        let mut iter = 0;
        let mut status: &'static str = "MaxIterationsReached";
        let mut d_j = 0.0;
        let mut last_alpha_du = 0.0;

        while iter < options.max_iterations {
            iter += 1;

            if options.max_cpu_time > 0.0 && start.elapsed().as_secs_f64() > options.max_cpu_time
            {
                status = "MaxCpuTimeReached";
                if options.verbose {
                    eprintln!("IPDDP: maximum CPU time reached");
                }
                break;
            }

            // Backward pass, escalating regularization on factorization
            // failure up to the configured limit.
            let mut backward_ok = false;
            while !backward_ok {
                backward_ok = self.backward_pass(context);
                if !backward_ok {
                    context.increase_regularization();
                    if context.is_regularization_limit_reached() {
                        status = "RegularizationLimitReached_NotConverged";
                        if options.verbose {
                            eprintln!("IPDDP: regularization limit reached");
                        }
                        break;
                    }
                }
            }
            if !backward_ok {
                break;
            }

            let best = self.perform_forward_pass(context);
            let forward_success = best.success;

            if forward_success {
                let ForwardPassResult {
                    cost,
                    merit_function,
                    constraint_violation,
                    alpha_pr,
                    alpha_du,
                    state_trajectory,
                    control_trajectory,
                    dual_trajectory,
                    slack_trajectory,
                    constraint_trajectory,
                    ..
                } = best;

                if options.debug {
                    println!(
                        "[forward] cost: {cost:.4e} α: {alpha_pr:.4} cv: {constraint_violation:.4e}"
                    );
                }

                context.x_traj = state_trajectory;
                context.u_traj = control_trajectory;
                if let Some(y) = dual_trajectory {
                    self.y_traj = y;
                }
                if let Some(s) = slack_trajectory {
                    self.s_traj = s;
                }
                if let Some(g) = constraint_trajectory {
                    self.g_traj = g;
                }

                d_j = context.cost - cost;
                context.cost = cost;
                context.merit_function = merit_function;
                context.alpha_pr = alpha_pr;
                context.alpha_du = alpha_du;
                last_alpha_du = alpha_du;

                if options.return_iteration_info {
                    history.record(context, self.mu, context.alpha_pr, alpha_du);
                }

                context.decrease_regularization();
            } else {
                context.increase_regularization();
                if context.is_regularization_limit_reached() {
                    status = "RegularizationLimitReached_NotConverged";
                    if options.verbose {
                        eprintln!("IPDDP: regularization limit reached");
                    }
                    break;
                }
            }

            if let Some(reason) = self.check_convergence(context, &options, d_j, iter) {
                status = reason;
                break;
            }

            if options.verbose {
                self.print_iteration(iter, context, last_alpha_du, context.alpha_pr);
            }

            self.update_barrier_parameters(context, &options);
        }

        let solve_time_ms = start.elapsed().as_secs_f64() * 1e3;
        self.assemble_solution(context, &options, status, iter, solve_time_ms, history)
    }

    fn assemble_solution(
        &self,
        context: &Cddp,
        options: &CddpOptions,
        status: &str,
        iterations: usize,
        solve_time_ms: f64,
        history: IterationHistory,
    ) -> CddpSolution {
        let mut solution = CddpSolution::new();
        solution.insert(
            "solver_name".into(),
            SolutionValue::Text(self.solver_name().to_string()),
        );
        solution.insert(
            "status_message".into(),
            SolutionValue::Text(status.to_string()),
        );
        solution.insert("iterations_completed".into(), SolutionValue::Int(iterations));
        solution.insert("solve_time_ms".into(), SolutionValue::Float(solve_time_ms));
        solution.insert("final_objective".into(), SolutionValue::Float(context.cost));
        solution.insert(
            "final_step_length".into(),
            SolutionValue::Float(context.alpha_pr),
        );

        let time_points: Vec<f64> = (0..=context.horizon)
            .map(|t| t as f64 * context.timestep)
            .collect();
        solution.insert("time_points".into(), SolutionValue::FloatList(time_points));
        solution.insert(
            "state_trajectory".into(),
            SolutionValue::VectorList(context.x_traj.clone()),
        );
        solution.insert(
            "control_trajectory".into(),
            SolutionValue::VectorList(context.u_traj.clone()),
        );
        solution.insert(
            "control_feedback_gains_K".into(),
            SolutionValue::MatrixList(self.K_u.clone()),
        );

        solution.insert(
            "final_regularization".into(),
            SolutionValue::Float(context.regularization),
        );
        solution.insert(
            "final_barrier_parameter_mu".into(),
            SolutionValue::Float(self.mu),
        );
        solution.insert(
            "final_primal_infeasibility".into(),
            SolutionValue::Float(context.inf_pr),
        );
        solution.insert(
            "final_dual_infeasibility".into(),
            SolutionValue::Float(context.inf_du),
        );
        solution.insert(
            "final_complementary_infeasibility".into(),
            SolutionValue::Float(context.inf_comp),
        );

        if options.return_iteration_info {
            solution.insert(
                "history_objective".into(),
                SolutionValue::FloatList(history.objective),
            );
            solution.insert(
                "history_merit_function".into(),
                SolutionValue::FloatList(history.merit_function),
            );
            solution.insert(
                "history_step_length_primal".into(),
                SolutionValue::FloatList(history.step_length_primal),
            );
            solution.insert(
                "history_step_length_dual".into(),
                SolutionValue::FloatList(history.step_length_dual),
            );
            solution.insert(
                "history_dual_infeasibility".into(),
                SolutionValue::FloatList(history.dual_infeasibility),
            );
            solution.insert(
                "history_primal_infeasibility".into(),
                SolutionValue::FloatList(history.primal_infeasibility),
            );
            solution.insert(
                "history_complementary_infeasibility".into(),
                SolutionValue::FloatList(history.complementary_infeasibility),
            );
            solution.insert(
                "history_barrier_mu".into(),
                SolutionValue::FloatList(history.barrier_mu),
            );
        }

        if options.verbose {
            print_summary(&solution, status, iterations, solve_time_ms, context.cost, self.mu);
        }

        solution
    }

    /// IPOPT-style iteration line with a header at iteration zero.
    fn print_iteration(&self, iter: usize, context: &Cddp, alpha_du: f64, alpha_pr: f64) {
        if iter == 0 {
            println!(
                "{:>4} {:>12} {:>9} {:>9} {:>9} {:>7} {:>9} {:>7} {:>9} {:>9}",
                "iter", "objective", "inf_pr", "inf_du", "inf_comp", "lg(mu)", "||d||", "lg(rg)",
                "alpha_du", "alpha_pr"
            );
        }

        let lg_mu = if self.mu > 0.0 {
            format!("{:7.1}", self.mu.log10())
        } else {
            format!("{:>7}", "-inf")
        };
        let lg_rg = if context.regularization > 0.0 {
            format!("{:7.1}", context.regularization.log10())
        } else {
            format!("{:>7}", "-")
        };

        println!(
            "{:>4} {:>12.6e} {:>9.2e} {:>9.2e} {:>9.2e} {} {:>9.2e} {} {:>9.6} {:>9.6}",
            iter,
            context.cost,
            context.inf_pr,
            context.inf_du,
            context.inf_comp,
            lg_mu,
            context.step_norm,
            lg_rg,
            alpha_du,
            alpha_pr,
        );
    }
}

fn print_header() {
    println!("\n========================================");
    println!("   Constrained DDP — interior point");
    println!("========================================\n");
}

fn print_options(options: &CddpOptions) {
    println!("\n========================================");
    println!("            Solver options");
    println!("========================================");
    println!("  Tolerance:            {:>10.3e}", options.tolerance);
    println!(
        "  Acceptable tolerance: {:>10.3e}",
        options.acceptable_tolerance
    );
    println!("  Max iterations:       {:>10}", options.max_iterations);
    println!("  Max CPU time (s):     {:>10}", options.max_cpu_time);
    println!("  Use iLQR:             {:>10}", options.use_ilqr);
    println!("  Parallel:             {:>10}", options.enable_parallel);
    println!("  Threads:              {:>10}", options.num_threads);
    println!("  Warm start:           {:>10}", options.warm_start);
    println!("--- line search ---");
    println!(
        "  initial / min step:   {:>10.3e} / {:.3e}",
        options.line_search.initial_step_size, options.line_search.min_step_size
    );
    println!(
        "  reduction / max iter: {:>10.3e} / {}",
        options.line_search.step_reduction_factor, options.line_search.max_iterations
    );
    println!("--- regularization ---");
    println!(
        "  initial / factor:     {:>10.3e} / {:.3e}",
        options.regularization.initial_value, options.regularization.update_factor
    );
    println!(
        "  min / max:            {:>10.3e} / {:.3e}",
        options.regularization.min_value, options.regularization.max_value
    );
    println!("--- filter ---");
    println!(
        "  merit / violation:    {:>10.3e} / {:.3e}",
        options.filter.merit_acceptance_threshold, options.filter.violation_acceptance_threshold
    );
    println!(
        "  max viol / armijo:    {:>10.3e} / {:.3e}",
        options.filter.max_violation_threshold, options.filter.armijo_constant
    );
    println!("--- barrier ---");
    println!(
        "  strategy:             {:>10}",
        options.ipddp.barrier.strategy
    );
    println!(
        "  mu initial / min:     {:>10.3e} / {:.3e}",
        options.ipddp.barrier.mu_initial, options.ipddp.barrier.mu_min_value
    );
    println!(
        "  mu factor / power:    {:>10.3e} / {:.3e}",
        options.ipddp.barrier.mu_update_factor, options.ipddp.barrier.mu_update_power
    );
    println!(
        "  fraction to boundary: {:>10.3e}",
        options.ipddp.barrier.min_fraction_to_boundary
    );
    println!("--- ipddp ---");
    println!(
        "  dual / slack scale:   {:>10.3e} / {:.3e}",
        options.ipddp.dual_var_init_scale, options.ipddp.slack_var_init_scale
    );
    println!("========================================\n");
}

fn print_summary(
    _solution: &CddpSolution,
    status: &str,
    iterations: usize,
    solve_time_ms: f64,
    final_cost: f64,
    mu: f64,
) {
    println!("\n========================================");
    println!("           IPDDP solution");
    println!("========================================");
    println!("Status:     {status}");
    println!("Iterations: {iterations}");
    println!("Solve time: {solve_time_ms:.2} ms");
    println!("Final cost: {final_cost:.6}");
    println!("Final μ:    {mu:.2e}");
    println!("========================================\n");
}
