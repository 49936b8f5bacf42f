//! Forward pass: nonlinear rollout and filter line search.
//!
//! Each trial rolls the nonlinear dynamics under the scaled feedforward
//! plus feedback control update. Constrained trials run in two phases:
//! slacks move with the state/control step and are rejected wholesale if
//! any component crosses the fraction-to-boundary floor, then a separate
//! ladder scan finds the largest dual step feasible at every stage.
//! Acceptance is decided by the filter on the `(merit, violation)` pair.
//!
//! In serial mode the ladder is scanned from the largest α and the first
//! accepted trial wins; in parallel mode all trials run and the accepted
//! one with the lowest merit is committed.

use nalgebra::DVector;

use crate::options::FilterOptions;
use crate::problem::Cddp;

use super::derivatives::stacked_residual;
use super::IpddpSolver;

/// Outcome of one trial rollout.
pub(crate) struct ForwardPassResult {
    pub success: bool,
    pub cost: f64,
    pub merit_function: f64,
    pub constraint_violation: f64,
    pub alpha_pr: f64,
    pub alpha_du: f64,
    pub state_trajectory: Vec<DVector<f64>>,
    pub control_trajectory: Vec<DVector<f64>>,
    pub dual_trajectory: Option<Vec<DVector<f64>>>,
    pub slack_trajectory: Option<Vec<DVector<f64>>>,
    pub constraint_trajectory: Option<Vec<DVector<f64>>>,
}

impl ForwardPassResult {
    fn rejected(alpha: f64) -> Self {
        Self {
            success: false,
            cost: f64::INFINITY,
            merit_function: f64::INFINITY,
            constraint_violation: 0.0,
            alpha_pr: alpha,
            alpha_du: 0.0,
            state_trajectory: Vec::new(),
            control_trajectory: Vec::new(),
            dual_trajectory: None,
            slack_trajectory: None,
            constraint_trajectory: None,
        }
    }
}

impl IpddpSolver {
    /// Scan the step-size ladder for an acceptable trial.
    pub(crate) fn perform_forward_pass(&self, context: &Cddp) -> ForwardPassResult {
        let mut best = ForwardPassResult::rejected(context.options.line_search.initial_step_size);

        if !context.options.enable_parallel {
            for &alpha in &context.alphas {
                let result = self.forward_pass(context, alpha);
                if result.success && result.merit_function < best.merit_function {
                    // Largest accepted step wins on the descending ladder.
                    best = result;
                    break;
                }
            }
        } else {
            let results: Vec<ForwardPassResult> = std::thread::scope(|scope| {
                let handles: Vec<_> = context
                    .alphas
                    .iter()
                    .map(|&alpha| scope.spawn(move || self.forward_pass(context, alpha)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().expect("forward-pass worker panicked"))
                    .collect()
            });
            for result in results {
                if result.success && result.merit_function < best.merit_function {
                    best = result;
                }
            }
        }

        best
    }

    /// One trial rollout at primal step size `alpha`.
    pub(crate) fn forward_pass(&self, context: &Cddp, alpha: f64) -> ForwardPassResult {
        let horizon = context.horizon;
        let dt = context.timestep;
        let dual_dim = self.layout.total_dim();
        let tau = context
            .options
            .ipddp
            .barrier
            .min_fraction_to_boundary
            .max(1.0 - self.mu);

        let mut result = ForwardPassResult::rejected(alpha);

        let mut xs = context.x_traj.clone();
        let mut us = context.u_traj.clone();
        xs[0] = context.initial_state.clone();

        if dual_dim == 0 {
            let mut cost_new = 0.0;
            for t in 0..horizon {
                let delta_x = &xs[t] - &context.x_traj[t];
                us[t] = &context.u_traj[t] + alpha * &self.k_u[t] + &self.K_u[t] * &delta_x;
                cost_new += context.objective.running_cost(&xs[t], &us[t], t);
                xs[t + 1] = context
                    .system
                    .discrete_dynamics(&xs[t], &us[t], t as f64 * dt);
            }
            cost_new += context.objective.terminal_cost(&xs[horizon]);

            let d_j = context.cost - cost_new;
            let expected = -alpha * (self.dv[0] + 0.5 * alpha * self.dv[1]);
            let reduction_ratio = if expected > 0.0 {
                d_j / expected
            } else {
                1.0_f64.copysign(d_j)
            };

            result.success = reduction_ratio > 1e-6;
            result.cost = cost_new;
            result.merit_function = cost_new;
            result.alpha_du = 1.0;
            result.state_trajectory = xs;
            result.control_trajectory = us;
            return result;
        }

        // Phase 1: slack and state/control step under fraction-to-boundary.
        let mut s_new = self.s_traj.clone();
        for t in 0..horizon {
            let delta_x = &xs[t] - &context.x_traj[t];
            let s_old = &self.s_traj[t];
            let s_trial = s_old + alpha * &self.k_s[t] + &self.K_s[t] * &delta_x;
            for i in 0..dual_dim {
                if s_trial[i] < (1.0 - tau) * s_old[i] {
                    return result;
                }
            }
            s_new[t] = s_trial;

            us[t] = &context.u_traj[t] + alpha * &self.k_u[t] + &self.K_u[t] * &delta_x;
            xs[t + 1] = context
                .system
                .discrete_dynamics(&xs[t], &us[t], t as f64 * dt);
        }

        // Phase 2: largest dual step feasible at every stage.
        let mut accepted_duals: Option<Vec<DVector<f64>>> = None;
        let mut alpha_du = 0.0;
        'ladder: for &alpha_y in &context.alphas {
            let mut y_trial = self.y_traj.clone();
            for t in 0..horizon {
                let delta_x = &xs[t] - &context.x_traj[t];
                let y_old = &self.y_traj[t];
                let y_step = y_old + alpha_y * &self.k_y[t] + &self.K_y[t] * &delta_x;
                for i in 0..dual_dim {
                    if y_step[i] < (1.0 - tau) * y_old[i] {
                        continue 'ladder;
                    }
                }
                y_trial[t] = y_step;
            }
            accepted_duals = Some(y_trial);
            alpha_du = alpha_y;
            break;
        }
        let Some(y_new) = accepted_duals else {
            return result;
        };

        // Evaluate the trial: cost, constraints, barrier merit, and the
        // ℓ₁-aggregated violation the filter works with.
        let mut cost_new = 0.0;
        let mut merit_new = 0.0;
        let mut violation_new = 0.0;
        let mut g_new = self.g_traj.clone();
        for t in 0..horizon {
            cost_new += context.objective.running_cost(&xs[t], &us[t], t);
            stacked_residual(&context.path_constraints, &xs[t], &us[t], &mut g_new[t]);

            let s_vec = &s_new[t];
            merit_new -= self.mu * s_vec.iter().map(|v| v.ln()).sum::<f64>();

            let primal_residual = &g_new[t] + s_vec;
            violation_new += primal_residual.iter().map(|v| v.abs()).sum::<f64>();
        }
        cost_new += context.objective.terminal_cost(&xs[horizon]);
        merit_new += cost_new;

        let expected_improvement = alpha * self.dv[0];
        let violation_old = self.filter.last().map(|p| p.violation).unwrap_or(0.0);
        let merit_old = context.merit_function;

        if filter_accepts(
            &context.options.filter,
            expected_improvement,
            merit_old,
            merit_new,
            violation_old,
            violation_new,
        ) {
            result.success = true;
            result.cost = cost_new;
            result.merit_function = merit_new;
            result.constraint_violation = violation_new;
            result.alpha_du = alpha_du;
            result.state_trajectory = xs;
            result.control_trajectory = us;
            result.dual_trajectory = Some(y_new);
            result.slack_trajectory = Some(s_new);
            result.constraint_trajectory = Some(g_new);
        }

        result
    }
}

/// Filter acceptance for a trial `(merit_new, violation_new)` against the
/// current `(merit_old, violation_old)` pair.
pub(crate) fn filter_accepts(
    filter: &FilterOptions,
    expected_improvement: f64,
    merit_old: f64,
    merit_new: f64,
    violation_old: f64,
    violation_new: f64,
) -> bool {
    if violation_new > filter.max_violation_threshold {
        // Far outside the acceptable region: only a strict violation
        // reduction counts.
        violation_new < (1.0 - filter.violation_acceptance_threshold) * violation_old
    } else if violation_new.max(violation_old) < filter.min_violation_for_armijo_check
        && expected_improvement < 0.0
    {
        // Nearly feasible with a descent direction: switched Armijo test
        // on the merit function.
        merit_new < merit_old + filter.armijo_constant * expected_improvement
    } else {
        merit_new < merit_old - filter.merit_acceptance_threshold * violation_new
            || violation_new < (1.0 - filter.violation_acceptance_threshold) * violation_old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> FilterOptions {
        FilterOptions::default()
    }

    #[test]
    fn rejects_violation_above_max_threshold_without_reduction() {
        let filter = FilterOptions {
            max_violation_threshold: 10.0,
            ..opts()
        };
        // Violation grew past the cap: reject.
        assert!(!filter_accepts(&filter, -1.0, 5.0, 0.0, 11.0, 12.0));
        // Shrinking violation is still acceptable out there.
        assert!(filter_accepts(&filter, -1.0, 5.0, 6.0, 20.0, 12.0));
    }

    #[test]
    fn armijo_branch_governs_nearly_feasible_steps() {
        let filter = FilterOptions {
            min_violation_for_armijo_check: 1e-3,
            armijo_constant: 1e-4,
            ..opts()
        };
        let expected = -1.0;
        // Sufficient merit decrease.
        assert!(filter_accepts(&filter, expected, 10.0, 9.0, 1e-5, 1e-5));
        // Merit barely moved: the Armijo margin rejects it.
        assert!(!filter_accepts(&filter, expected, 10.0, 10.0 - 1e-6, 1e-5, 1e-5));
    }

    #[test]
    fn merit_or_violation_reduction_accepts() {
        let filter = opts();
        // Merit decreases enough relative to the violation.
        assert!(filter_accepts(&filter, -1.0, 10.0, 9.0, 0.5, 0.5));
        // Merit worsens but violation shrinks substantially.
        assert!(filter_accepts(&filter, -1.0, 10.0, 10.5, 0.5, 0.1));
        // Neither improves: reject.
        assert!(!filter_accepts(&filter, -1.0, 10.0, 10.5, 0.5, 0.5001));
    }
}
