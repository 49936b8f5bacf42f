//! Convergence decisions on scaled KKT residuals.
//!
//! The dual residual is scaled the way IPOPT scales its optimality error:
//! large multipliers relax the dual tolerance so badly scaled problems
//! can still terminate. The primal and complementarity residuals enter
//! unscaled.

use crate::options::CddpOptions;
use crate::problem::Cddp;

use super::IpddpSolver;

impl IpddpSolver {
    /// `inf_du / s_d` with
    /// `s_d = max(s_max, (‖y‖₁ + ‖s‖₁)/(m + n)) / s_max`,
    /// where `m` counts all stacked multipliers and `n` all controls.
    pub(crate) fn scaled_dual_infeasibility(&self, context: &Cddp, options: &CddpOptions) -> f64 {
        if self.layout.total_dim() == 0 {
            return context.inf_du;
        }

        let s_max = options.termination_scaling_max_factor;

        let mut y_norm_l1 = 0.0;
        let mut s_norm_l1 = 0.0;
        let mut multiplier_count = 0usize;
        for t in 0..context.horizon {
            y_norm_l1 += self.y_traj[t].iter().map(|v| v.abs()).sum::<f64>();
            s_norm_l1 += self.s_traj[t].iter().map(|v| v.abs()).sum::<f64>();
            multiplier_count += self.y_traj[t].len();
        }

        let control_count = context.system.control_dim() * context.horizon;
        let total = multiplier_count + control_count;
        let mean_multiplier = if total > 0 {
            (y_norm_l1 + s_norm_l1) / total as f64
        } else {
            0.0
        };

        let s_d = s_max.max(mean_multiplier) / s_max;
        context.inf_du / s_d
    }

    /// Check the termination criteria; returns the status message when
    /// the solve should stop.
    pub(crate) fn check_convergence(
        &self,
        context: &Cddp,
        options: &CddpOptions,
        d_j: f64,
        iter: usize,
    ) -> Option<&'static str> {
        let scaled_inf_du = self.scaled_dual_infeasibility(context, options);
        let termination_metric = scaled_inf_du.max(context.inf_pr).max(context.inf_comp);

        if termination_metric <= options.tolerance {
            if options.verbose {
                println!(
                    "IPDDP: converged, KKT metric {termination_metric:.2e} (scaled inf_du {scaled_inf_du:.2e})"
                );
            }
            return Some("OptimalSolutionFound");
        }

        // Stagnating cost with reasonable feasibility.
        if d_j.abs() < options.acceptable_tolerance && iter > 10 {
            let acceptable_infeasibility = context.inf_pr < options.acceptable_tolerance.sqrt()
                && context.inf_comp < options.acceptable_tolerance.sqrt();
            if acceptable_infeasibility {
                if options.verbose {
                    println!(
                        "IPDDP: converged, cost change {:.2e} with acceptable infeasibility",
                        d_j.abs()
                    );
                }
                return Some("AcceptableSolutionFound");
            }
        }

        // Vanishing step with a nearly feasible iterate.
        if iter >= 1 && context.step_norm < options.tolerance * 10.0 && context.inf_pr < 1e-4 {
            if options.verbose {
                println!("IPDDP: converged, step norm {:.2e}", context.step_norm);
            }
            return Some("AcceptableSolutionFound");
        }

        None
    }
}
