//! Barrier parameter scheduling and filter resets.
//!
//! After each iteration (constrained problems only) the barrier weight μ
//! is driven down according to the configured strategy, and every μ
//! change resets the filter to the single `(merit, violation)` pair of
//! the current iterate, re-evaluated under the new μ.

use crate::options::{BarrierStrategy, CddpOptions};
use crate::problem::Cddp;

use super::{FilterPoint, IpddpSolver};

impl IpddpSolver {
    /// Recompute the barrier merit and violation of the current iterate
    /// and reset the filter to that single entry.
    ///
    /// Also refreshes the primal and complementarity residual norms; the
    /// dual residual is owned by the backward pass and left untouched.
    pub(crate) fn reset_filter(&mut self, context: &mut Cddp) {
        let dual_dim = self.layout.total_dim();

        let mut merit = context.cost;
        let mut inf_pr = 0.0_f64;
        let mut inf_comp = 0.0_f64;
        let mut filter_violation = 0.0_f64;

        if dual_dim > 0 {
            for t in 0..context.horizon {
                let s = &self.s_traj[t];
                let g = &self.g_traj[t];
                let y = &self.y_traj[t];

                merit -= self.mu * s.iter().map(|v| v.ln()).sum::<f64>();

                let primal_residual = g + s;
                inf_pr = inf_pr.max(primal_residual.amax());
                filter_violation += primal_residual.iter().map(|v| v.abs()).sum::<f64>();

                for i in 0..dual_dim {
                    inf_comp = inf_comp.max((y[i] * s[i] - self.mu).abs());
                }
            }
        }

        context.merit_function = merit;
        context.inf_pr = inf_pr;
        context.inf_comp = inf_comp;

        self.filter.clear();
        self.filter.push(FilterPoint {
            merit,
            violation: filter_violation,
        });

        if context.options.debug {
            if let Some(point) = self.filter.last() {
                println!(
                    "[filter] reset: merit {:.6e}, violation {:.4e}",
                    point.merit, point.violation
                );
            }
        }
    }

    /// Apply the configured μ schedule; no-op for unconstrained problems.
    pub(crate) fn update_barrier_parameters(&mut self, context: &mut Cddp, options: &CddpOptions) {
        if self.layout.total_dim() == 0 {
            return;
        }

        let barrier = options.ipddp.barrier.clone();
        match barrier.strategy {
            BarrierStrategy::Monotonic => {
                self.mu = barrier.mu_min_value.max(barrier.mu_update_factor * self.mu);
                self.reset_filter(context);
            }

            BarrierStrategy::Ipopt => {
                let scaled_inf_du = self.scaled_dual_infeasibility(context, options);
                let error_k = scaled_inf_du.max(context.inf_pr).max(context.inf_comp);

                // Reduce only once the current barrier subproblem is
                // solved to within 10·μ.
                if error_k <= 10.0 * self.mu {
                    let linear = barrier.mu_update_factor * self.mu;
                    let superlinear = self.mu.powf(barrier.mu_update_power);
                    self.mu = (options.tolerance / 10.0).max(linear.min(superlinear));
                    self.reset_filter(context);
                }
            }

            BarrierStrategy::Adaptive => {
                let scaled_inf_du = self.scaled_dual_infeasibility(context, options);
                let error_k = scaled_inf_du.max(context.inf_pr).max(context.inf_comp);

                let update_threshold = (barrier.mu_update_factor * self.mu).max(2.0 * self.mu);
                if error_k <= update_threshold {
                    let factor =
                        adaptive_reduction_factor(self.mu, error_k, barrier.mu_update_factor);
                    let linear = factor * self.mu;
                    let superlinear = self.mu.powf(barrier.mu_update_power);
                    self.mu = (options.tolerance / 100.0).max(linear.min(superlinear));
                    self.reset_filter(context);
                }
            }
        }
    }
}

/// Tier the linear reduction factor on the KKT-progress ratio
/// `error_k / μ`: the closer the subproblem is to solved, the harder μ is
/// cut. Thresholds and multipliers are tuned constants.
fn adaptive_reduction_factor(mu: f64, error_k: f64, base_factor: f64) -> f64 {
    if mu <= 1e-12 {
        return base_factor;
    }
    let kkt_progress_ratio = error_k / mu;
    if kkt_progress_ratio < 0.01 {
        base_factor * 0.1
    } else if kkt_progress_ratio < 0.1 {
        base_factor * 0.3
    } else if kkt_progress_ratio < 0.5 {
        base_factor * 0.6
    } else {
        base_factor
    }
}
