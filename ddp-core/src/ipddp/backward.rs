//! Backward pass: regularized value-function recursion.
//!
//! Sweeps stages from the horizon down to zero, building the quadratic
//! Q-expansion around the current trajectory and factoring the
//! (regularized) control block to obtain feedforward/feedback gains. For
//! constrained problems the expansion is augmented with the stacked
//! slack/dual variables and the gains for those are derived in closed
//! form from the control gains.
//!
//! Returns `false` — without touching the termination metrics — as soon
//! as any stage's `Q̃_uu` fails its Cholesky factorization; the solve
//! loop reacts by escalating regularization and retrying.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::problem::Cddp;

use super::IpddpSolver;

#[inline]
fn symmetrized(m: DMatrix<f64>) -> DMatrix<f64> {
    let mt = m.transpose();
    0.5 * (m + mt)
}

/// `diag(d) * m` without materializing the diagonal matrix.
#[inline]
fn row_scaled(m: &DMatrix<f64>, d: &DVector<f64>) -> DMatrix<f64> {
    let mut out = m.clone();
    for i in 0..out.nrows() {
        let mut row = out.row_mut(i);
        row *= d[i];
    }
    out
}

impl IpddpSolver {
    /// Run the backward recursion; `true` on success.
    #[allow(non_snake_case)] // K_* are the standard feedback-gain symbols
    pub(crate) fn backward_pass(&mut self, context: &mut Cddp) -> bool {
        let n = context.system.state_dim();
        let m = context.system.control_dim();
        let horizon = context.horizon;
        let dt = context.timestep;
        let use_ilqr = context.options.use_ilqr;
        let rho = context.regularization;
        let dual_dim = self.layout.total_dim();

        self.cache.compute(context);

        let x_final = &context.x_traj[horizon];
        let mut v_x = context.objective.terminal_cost_gradient(x_final);
        let mut v_xx = symmetrized(context.objective.terminal_cost_hessian(x_final));

        self.dv = [0.0, 0.0];
        let mut inf_du = 0.0_f64;
        let mut inf_pr = 0.0_f64;
        let mut inf_comp = 0.0_f64;
        let mut step_norm = 0.0_f64;

        for t in (0..horizon).rev() {
            let x = &context.x_traj[t];
            let u = &context.u_traj[t];
            let stage = &self.cache.stages[t];

            let a = DMatrix::identity(n, n) + dt * &stage.fx;
            let b = dt * &stage.fu;

            let (l_x, l_u) = context.objective.running_cost_gradients(x, u, t);
            let (l_xx, l_uu, l_ux) = context.objective.running_cost_hessians(x, u, t);

            let mut q_xx = l_xx + a.transpose() * &v_xx * &a;
            let mut q_ux = l_ux + b.transpose() * &v_xx * &a;
            let mut q_uu = l_uu + b.transpose() * &v_xx * &b;

            if !use_ilqr {
                for i in 0..n {
                    let w = dt * v_x[i];
                    q_xx += w * &stage.fxx[i];
                    q_ux += w * &stage.fux[i];
                    q_uu += w * &stage.fuu[i];
                }
            }

            if dual_dim == 0 {
                // Unconstrained recursion.
                let q_x = &l_x + a.transpose() * &v_x;
                let q_u = &l_u + b.transpose() * &v_x;

                let mut q_uu = symmetrized(q_uu);
                for i in 0..m {
                    q_uu[(i, i)] += rho;
                }

                let Some(ldlt) = Cholesky::new(q_uu.clone()) else {
                    if context.options.debug {
                        eprintln!("[backward] stage {t}: Q_uu not positive definite");
                    }
                    return false;
                };

                let k_u = -ldlt.solve(&q_u);
                let K_u = -ldlt.solve(&q_ux);

                v_x = &q_x
                    + K_u.transpose() * &q_u
                    + q_ux.transpose() * &k_u
                    + K_u.transpose() * &q_uu * &k_u;
                v_xx = symmetrized(
                    &q_xx
                        + K_u.transpose() * &q_ux
                        + q_ux.transpose() * &K_u
                        + K_u.transpose() * &q_uu * &K_u,
                );

                self.dv[0] += k_u.dot(&q_u);
                self.dv[1] += 0.5 * k_u.dot(&(&q_uu * &k_u));

                inf_du = inf_du.max(q_u.amax());
                step_norm = step_norm.max(k_u.amax());

                self.k_u[t] = k_u;
                self.K_u[t] = K_u;
            } else {
                // Constrained recursion over the stacked multipliers.
                let y = &self.y_traj[t];
                let s = &self.s_traj[t];
                let g = &self.g_traj[t];
                let q_yx = &stage.gx;
                let q_yu = &stage.gu;

                let mut q_x = &l_x + q_yx.transpose() * y + a.transpose() * &v_x;
                let mut q_u = &l_u + q_yu.transpose() * y + b.transpose() * &v_x;

                let ys_inv = y.component_div(s);
                let primal_residual = g + s;
                let complementary_residual =
                    y.component_mul(s) - DVector::from_element(dual_dim, self.mu);
                let rhat = y.component_mul(&primal_residual) - &complementary_residual;
                let s_inv_rhat = rhat.component_div(s);

                let ysinv_q_yx = row_scaled(q_yx, &ys_inv);
                let ysinv_q_yu = row_scaled(q_yu, &ys_inv);

                let mut q_uu_reg = symmetrized(q_uu.clone());
                q_uu_reg += q_yu.transpose() * &ysinv_q_yu;
                for i in 0..m {
                    q_uu_reg[(i, i)] += rho;
                }

                let Some(ldlt) = Cholesky::new(q_uu_reg) else {
                    if context.options.debug {
                        eprintln!("[backward] stage {t}: Q_uu not positive definite");
                    }
                    return false;
                };

                // One solve for both feedforward and feedback gains.
                let mut big_rhs = DMatrix::zeros(m, 1 + n);
                big_rhs
                    .column_mut(0)
                    .copy_from(&(&q_u + q_yu.transpose() * &s_inv_rhat));
                big_rhs
                    .columns_mut(1, n)
                    .copy_from(&(&q_ux + q_yu.transpose() * &ysinv_q_yx));
                let gains = -ldlt.solve(&big_rhs);

                let k_u: DVector<f64> = gains.column(0).into_owned();
                let K_u: DMatrix<f64> = gains.columns(1, n).into_owned();

                let q_yu_k = q_yu * &k_u;
                let k_y = (&rhat + y.component_mul(&q_yu_k)).component_div(s);
                let K_y = row_scaled(&(q_yx + q_yu * &K_u), &ys_inv);
                let k_s = -&primal_residual - &q_yu_k;
                let K_s = -q_yx - q_yu * &K_u;

                // Close the primal-dual terms back into the expansion.
                q_u += q_yu.transpose() * &s_inv_rhat;
                q_x += q_yx.transpose() * &s_inv_rhat;
                q_xx += q_yx.transpose() * &ysinv_q_yx;
                q_ux += q_yu.transpose() * &ysinv_q_yx;
                q_uu += q_yu.transpose() * &ysinv_q_yu;

                self.dv[0] += k_u.dot(&q_u);
                self.dv[1] += 0.5 * k_u.dot(&(&q_uu * &k_u));

                v_x = &q_x
                    + K_u.transpose() * &q_u
                    + q_ux.transpose() * &k_u
                    + K_u.transpose() * &q_uu * &k_u;
                v_xx = symmetrized(
                    &q_xx
                        + K_u.transpose() * &q_ux
                        + q_ux.transpose() * &K_u
                        + K_u.transpose() * &q_uu * &K_u,
                );

                inf_du = inf_du.max(q_u.amax());
                inf_pr = inf_pr.max(primal_residual.amax());
                inf_comp = inf_comp.max(complementary_residual.amax());
                step_norm = step_norm.max(k_u.amax());

                self.k_u[t] = k_u;
                self.K_u[t] = K_u;
                self.k_y[t] = k_y;
                self.K_y[t] = K_y;
                self.k_s[t] = k_s;
                self.K_s[t] = K_s;
            }
        }

        context.inf_du = inf_du;
        context.inf_pr = inf_pr;
        context.inf_comp = inf_comp;
        context.step_norm = step_norm;

        if context.options.debug {
            println!(
                "[backward] inf_du: {:.2e} inf_pr: {:.2e} inf_comp: {:.2e} ||d||: {:.2e} dV: [{:.3e}, {:.3e}]",
                inf_du, inf_pr, inf_comp, step_norm, self.dv[0], self.dv[1]
            );
        }

        true
    }
}
