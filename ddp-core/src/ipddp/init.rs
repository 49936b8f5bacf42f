//! Solver initialization: cold starts, warm starts, and the seeding of
//! slack/dual trajectories.
//!
//! Cold starts interpolate a state trajectory (when none is provided),
//! seed slacks at `max(slack_scale, −g)` and duals at `μ/s` (clamped),
//! then re-roll the trajectory through the dynamics. Warm starts keep the
//! provided trajectories untouched and preserve any existing strictly
//! interior `(y, s)` pairs whose slack is not badly undersized for the
//! current constraint values.

use nalgebra::{DMatrix, DVector};

use crate::error::CddpError;
use crate::options::CddpOptions;
use crate::problem::Cddp;

use super::derivatives::{stacked_residual, ConstraintLayout};
use super::IpddpSolver;

impl IpddpSolver {
    /// Prepare solver state for a solve on `context`.
    pub(crate) fn initialize_solver(&mut self, context: &mut Cddp) -> Result<(), CddpError> {
        let options = context.options.clone();
        let horizon = context.horizon;
        let n = context.system.state_dim();
        let m = context.system.control_dim();

        self.layout = ConstraintLayout::from_constraint_set(&context.path_constraints);
        let dual_dim = self.layout.total_dim();
        self.cache.allocate(horizon, n, m, dual_dim);

        // The context and the objective must agree on where the cost is
        // centered; a silent disagreement would make the KKT residuals
        // meaningless.
        let objective_reference = context.objective.reference_state();
        if objective_reference.len() > 0 && context.reference_state.len() > 0 {
            if objective_reference.len() != context.reference_state.len() {
                return Err(CddpError::DimensionMismatch(format!(
                    "objective reference state has length {}, context has {}",
                    objective_reference.len(),
                    context.reference_state.len()
                )));
            }
            if (&context.reference_state - &objective_reference).norm() > 1e-6 {
                return Err(CddpError::DimensionMismatch(
                    "reference state mismatch between context and objective".into(),
                ));
            }
        }

        if options.warm_start {
            let gains_compatible = horizon > 0
                && self.k_u.len() == horizon
                && self.K_u.len() == horizon
                && self.k_u.iter().all(|k| k.len() == m)
                && self.K_u.iter().all(|k| k.shape() == (m, n));

            if gains_compatible {
                if options.verbose {
                    println!("IPDDP: warm start with existing control gains");
                }
                self.mu = options.ipddp.barrier.mu_initial * 0.1;
                context.step_norm = 0.0;
                self.evaluate_trajectory_warm(context);
                self.initialize_dual_slack_warm(context, &options);
                self.reset_filter(context);
                return Ok(());
            }

            // Warm start from a provided trajectory, without solver state.
            if options.verbose {
                println!("IPDDP: warm start with provided trajectory");
            }
            self.k_u = vec![DVector::zeros(m); horizon];
            self.K_u = vec![DMatrix::zeros(m, n); horizon];
            self.dv = [0.0, 0.0];
            self.allocate_constraint_storage(context);

            self.evaluate_trajectory_warm(context);
            if dual_dim == 0 {
                self.mu = 1e-8;
            } else {
                let max_violation = self.max_constraint_violation();
                self.mu = if max_violation <= options.tolerance {
                    // Already feasible: start nearly converged.
                    options.tolerance * 0.01
                } else if max_violation <= 0.1 {
                    options.tolerance
                } else {
                    options.ipddp.barrier.mu_initial * 0.1
                };
            }

            context.regularization = options.regularization.initial_value;
            context.step_norm = 0.0;
            self.initialize_dual_slack_warm(context, &options);
            self.reset_filter(context);
            return Ok(());
        }

        // Cold start. Interpolate a state trajectory if none of the right
        // shape was provided.
        let trajectory_provided = context.x_traj.len() == horizon + 1
            && context.u_traj.len() == horizon
            && context.x_traj[0].len() == n
            && (horizon == 0 || context.u_traj[0].len() == m);

        if !trajectory_provided {
            if context.reference_state.len() == n && horizon > 0 {
                context.x_traj = (0..=horizon)
                    .map(|t| {
                        &context.initial_state
                            + (t as f64 / horizon as f64)
                                * (&context.reference_state - &context.initial_state)
                    })
                    .collect();
            } else {
                context.x_traj = vec![DVector::zeros(n); horizon + 1];
                context.x_traj[0] = context.initial_state.clone();
            }
            context.u_traj = vec![DVector::zeros(m); horizon];
            if options.verbose {
                println!("IPDDP: using interpolated initial trajectory");
            }
        } else if options.verbose {
            println!("IPDDP: using provided initial trajectory");
        }

        self.k_u = vec![DVector::zeros(m); horizon];
        self.K_u = vec![DMatrix::zeros(m, n); horizon];
        self.dv = [0.0, 0.0];
        self.allocate_constraint_storage(context);

        self.mu = if dual_dim == 0 {
            1e-8
        } else {
            options.ipddp.barrier.mu_initial
        };

        self.initialize_dual_slack(context, &options);
        context.regularization = options.regularization.initial_value;
        context.step_norm = 0.0;
        self.evaluate_trajectory(context);
        self.reset_filter(context);
        Ok(())
    }

    /// Size the stacked constraint storage and zero all gains.
    fn allocate_constraint_storage(&mut self, context: &Cddp) {
        let horizon = context.horizon;
        let n = context.system.state_dim();
        let dual_dim = self.layout.total_dim();

        self.g_traj = vec![DVector::zeros(dual_dim); horizon];
        self.y_traj = vec![DVector::zeros(dual_dim); horizon];
        self.s_traj = vec![DVector::zeros(dual_dim); horizon];
        self.k_y = vec![DVector::zeros(dual_dim); horizon];
        self.K_y = vec![DMatrix::zeros(dual_dim, n); horizon];
        self.k_s = vec![DVector::zeros(dual_dim); horizon];
        self.K_s = vec![DMatrix::zeros(dual_dim, n); horizon];
    }

    /// Roll the controls through the dynamics, refreshing states,
    /// constraint residuals, and the cost.
    pub(crate) fn evaluate_trajectory(&mut self, context: &mut Cddp) {
        let horizon = context.horizon;
        let mut cost = 0.0;

        context.x_traj[0] = context.initial_state.clone();
        for t in 0..horizon {
            cost += context
                .objective
                .running_cost(&context.x_traj[t], &context.u_traj[t], t);
            stacked_residual(
                &context.path_constraints,
                &context.x_traj[t],
                &context.u_traj[t],
                &mut self.g_traj[t],
            );
            let next = context.system.discrete_dynamics(
                &context.x_traj[t],
                &context.u_traj[t],
                t as f64 * context.timestep,
            );
            context.x_traj[t + 1] = next;
        }
        cost += context.objective.terminal_cost(&context.x_traj[horizon]);
        context.cost = cost;
    }

    /// Evaluate cost and constraints on the provided trajectory without
    /// re-rolling the dynamics (warm starts keep the caller's states).
    pub(crate) fn evaluate_trajectory_warm(&mut self, context: &mut Cddp) {
        let horizon = context.horizon;
        let dual_dim = self.layout.total_dim();

        if self.g_traj.len() != horizon || self.g_traj.iter().any(|g| g.len() != dual_dim) {
            self.g_traj = vec![DVector::zeros(dual_dim); horizon];
        }

        let mut cost = 0.0;
        for t in 0..horizon {
            cost += context
                .objective
                .running_cost(&context.x_traj[t], &context.u_traj[t], t);
            stacked_residual(
                &context.path_constraints,
                &context.x_traj[t],
                &context.u_traj[t],
                &mut self.g_traj[t],
            );
        }
        cost += context.objective.terminal_cost(&context.x_traj[horizon]);
        context.cost = cost;
    }

    /// Cold-start seeding: `sᵢ = max(slack_scale, −gᵢ)`, `yᵢ = μ/sᵢ`
    /// clamped into `[0.01, 100]·dual_scale`.
    fn initialize_dual_slack(&mut self, context: &mut Cddp, options: &CddpOptions) {
        let horizon = context.horizon;
        let dual_dim = self.layout.total_dim();

        for t in 0..horizon {
            stacked_residual(
                &context.path_constraints,
                &context.x_traj[t],
                &context.u_traj[t],
                &mut self.g_traj[t],
            );
            for i in 0..dual_dim {
                let (s_init, y_init) = seed_pair(self.g_traj[t][i], self.mu, options);
                self.s_traj[t][i] = s_init;
                self.y_traj[t][i] = y_init;
            }
        }

        context.cost = context
            .objective
            .evaluate(&context.x_traj, &context.u_traj);
    }

    /// Warm-start seeding: keep an existing `(y, s)` block unless any of
    /// its components is no longer strictly interior or its slack has
    /// collapsed below a tenth of what the current residual requires.
    fn initialize_dual_slack_warm(&mut self, context: &mut Cddp, options: &CddpOptions) {
        let horizon = context.horizon;
        let n = context.system.state_dim();
        let dual_dim = self.layout.total_dim();

        let has_existing = self.y_traj.len() == horizon
            && self.s_traj.len() == horizon
            && self.y_traj.iter().all(|y| y.len() == dual_dim)
            && self.s_traj.iter().all(|s| s.len() == dual_dim);

        if !has_existing {
            self.y_traj = vec![DVector::zeros(dual_dim); horizon];
            self.s_traj = vec![DVector::zeros(dual_dim); horizon];
        }

        self.k_y = vec![DVector::zeros(dual_dim); horizon];
        self.K_y = vec![DMatrix::zeros(dual_dim, n); horizon];
        self.k_s = vec![DVector::zeros(dual_dim); horizon];
        self.K_s = vec![DMatrix::zeros(dual_dim, n); horizon];

        let mut preserved = has_existing;
        for t in 0..horizon {
            for entry in self.layout.entries() {
                let range = entry.offset..entry.offset + entry.dim;

                let mut need_reinit = !has_existing;
                if !need_reinit {
                    for i in range.clone() {
                        let y_current = self.y_traj[t][i];
                        let s_current = self.s_traj[t][i];
                        let required_slack =
                            options.ipddp.slack_var_init_scale.max(-self.g_traj[t][i]);
                        if y_current <= 1e-12
                            || s_current <= 1e-12
                            || s_current < 0.1 * required_slack
                        {
                            need_reinit = true;
                            break;
                        }
                    }
                }

                if need_reinit {
                    if options.debug && has_existing {
                        eprintln!(
                            "[warm start] re-seeding duals for '{}' at stage {t}",
                            entry.name
                        );
                    }
                    preserved = false;
                    for i in range {
                        let (s_init, y_init) = seed_pair(self.g_traj[t][i], self.mu, options);
                        self.s_traj[t][i] = s_init;
                        self.y_traj[t][i] = y_init;
                    }
                }
            }
        }

        if options.verbose {
            println!(
                "IPDDP: {} dual/slack variables, μ = {:.2e}, max violation = {:.2e}",
                if preserved { "preserved" } else { "initialized" },
                self.mu,
                self.max_constraint_violation()
            );
        }
    }

    /// Largest raw constraint residual over the stored trajectory.
    pub(crate) fn max_constraint_violation(&self) -> f64 {
        let mut max_violation = 0.0_f64;
        for g in &self.g_traj {
            for &v in g.iter() {
                max_violation = max_violation.max(v);
            }
        }
        max_violation
    }
}

/// Cold-start `(s, y)` pair for one constraint component.
fn seed_pair(g_value: f64, mu: f64, options: &CddpOptions) -> (f64, f64) {
    let s_init = options.ipddp.slack_var_init_scale.max(-g_value);
    let y_raw = if s_init < 1e-12 { mu / 1e-12 } else { mu / s_init };
    let y_init = y_raw.clamp(
        options.ipddp.dual_var_init_scale * 0.01,
        options.ipddp.dual_var_init_scale * 100.0,
    );
    (s_init, y_init)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_pair_stays_interior() {
        let options = CddpOptions::default();
        // Strictly satisfied constraint: slack floors at the init scale.
        let (s, y) = seed_pair(-1.0, 0.1, &options);
        assert!((s - 1.0).abs() < 1e-12);
        assert!(y > 0.0 && s > 0.0);

        // Violated constraint: slack floors at the init scale and the
        // violation stays in the primal residual.
        let (s, y) = seed_pair(0.5, 0.1, &options);
        assert!((s - options.ipddp.slack_var_init_scale).abs() < 1e-12);
        assert!(y > 0.0);
    }

    #[test]
    fn seed_dual_is_clamped() {
        let options = CddpOptions::default();
        // Tiny slack would give a huge dual; the clamp caps it.
        let (_, y) = seed_pair(-1e-13, 10.0, &options);
        assert!(y <= options.ipddp.dual_var_init_scale * 100.0);
        // Huge slack would give a vanishing dual; the clamp floors it.
        let (_, y) = seed_pair(-1e6, 1e-9, &options);
        assert!(y >= options.ipddp.dual_var_init_scale * 0.01);
    }
}
