//! Dynamical system contract.

use nalgebra::{DMatrix, DVector};

/// A discrete-time dynamical system with continuous-time derivatives.
///
/// The solver propagates trajectories through [`discrete_dynamics`] and
/// linearizes stages as `A = I + Δ·F_x`, `B = Δ·F_u` (explicit Euler
/// semantics), so [`jacobians`] and [`hessians`] report derivatives of the
/// *continuous* vector field; the solver absorbs the timestep.
///
/// Implementations are shared across worker threads during derivative
/// precomputation, hence the `Send + Sync` bound.
///
/// [`discrete_dynamics`]: DynamicalSystem::discrete_dynamics
/// [`jacobians`]: DynamicalSystem::jacobians
/// [`hessians`]: DynamicalSystem::hessians
pub trait DynamicalSystem: Send + Sync {
    /// State dimension `n`.
    fn state_dim(&self) -> usize;

    /// Control dimension `m`.
    fn control_dim(&self) -> usize;

    /// One-step propagation `x' = f(x, u, t)`.
    fn discrete_dynamics(&self, x: &DVector<f64>, u: &DVector<f64>, t: f64) -> DVector<f64>;

    /// Continuous-time Jacobians `(∂f/∂x, ∂f/∂u)` with shapes
    /// `n×n` and `n×m`.
    fn jacobians(&self, x: &DVector<f64>, u: &DVector<f64>, t: f64) -> (DMatrix<f64>, DMatrix<f64>);

    /// Continuous-time Hessians `(F_xx, F_uu, F_ux)`.
    ///
    /// Each entry is a length-`n` list of matrices, one per state
    /// component: `F_xx[i]` is `n×n`, `F_uu[i]` is `m×m`, `F_ux[i]` is
    /// `m×n`. Only consulted when the solver runs full DDP
    /// (`use_ilqr = false`); the default returns zero tensors, which
    /// makes a first-order system behave identically under either mode.
    fn hessians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        t: f64,
    ) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
        let _ = (x, u, t);
        let n = self.state_dim();
        let m = self.control_dim();
        (
            vec![DMatrix::zeros(n, n); n],
            vec![DMatrix::zeros(m, m); n],
            vec![DMatrix::zeros(m, n); n],
        )
    }
}
