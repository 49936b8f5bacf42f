//! Objective function contract and the quadratic tracking objective.

use nalgebra::{DMatrix, DVector};

/// Stage and terminal costs with their first and second derivatives.
///
/// Costs may depend on the stage index, e.g. to track a time-varying
/// reference. Derivative shapes follow the problem dimensions: gradients
/// are `n`- and `m`-vectors, `l_xx` is `n×n`, `l_uu` is `m×m`, and the
/// cross term `l_ux` is `m×n`.
pub trait Objective: Send + Sync {
    /// Running cost `l(x, u, t)`.
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, index: usize) -> f64;

    /// Terminal cost `φ(x_H)`.
    fn terminal_cost(&self, x: &DVector<f64>) -> f64;

    /// Running-cost gradients `(l_x, l_u)`.
    fn running_cost_gradients(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        index: usize,
    ) -> (DVector<f64>, DVector<f64>);

    /// Running-cost Hessians `(l_xx, l_uu, l_ux)`.
    fn running_cost_hessians(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        index: usize,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>);

    /// Terminal-cost gradient `∂φ/∂x`.
    fn terminal_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Terminal-cost Hessian `∂²φ/∂x²`.
    fn terminal_cost_hessian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    /// Total cost of a trajectory: Σ running + terminal.
    fn evaluate(&self, states: &[DVector<f64>], controls: &[DVector<f64>]) -> f64 {
        let running: f64 = controls
            .iter()
            .enumerate()
            .map(|(t, u)| self.running_cost(&states[t], u, t))
            .sum();
        running
            + states
                .last()
                .map(|x| self.terminal_cost(x))
                .unwrap_or(0.0)
    }

    /// Reference state the cost is centered on.
    fn reference_state(&self) -> DVector<f64>;

    /// Replace the reference state.
    fn set_reference_state(&mut self, reference_state: DVector<f64>);

    /// Replace the reference trajectory (one entry per stage).
    fn set_reference_states(&mut self, reference_states: Vec<DVector<f64>>);
}

/// Quadratic tracking objective
/// `l = (x − x_ref)ᵀ Q (x − x_ref) + uᵀ R u`,
/// `φ = (x_H − x_ref)ᵀ Qf (x_H − x_ref)`.
///
/// `Q` and `R` are scaled by the timestep at construction so the running
/// cost approximates an integral; `Qf` is applied as-is. When a reference
/// trajectory is set, stage `t` tracks its `t`-th entry and the terminal
/// cost tracks the scalar reference state.
#[derive(Debug, Clone)]
pub struct QuadraticObjective {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    qf: DMatrix<f64>,
    reference_state: DVector<f64>,
    reference_states: Vec<DVector<f64>>,
    timestep: f64,
}

impl QuadraticObjective {
    /// Create a quadratic objective with weights `Q`, `R`, `Qf` centered
    /// on `reference_state`.
    pub fn new(
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        qf: DMatrix<f64>,
        reference_state: DVector<f64>,
        timestep: f64,
    ) -> Self {
        Self {
            q: q * timestep,
            r: r * timestep,
            qf,
            reference_state,
            reference_states: Vec::new(),
            timestep,
        }
    }

    /// Timestep the running weights were scaled by.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    fn stage_reference(&self, index: usize) -> &DVector<f64> {
        self.reference_states
            .get(index)
            .unwrap_or(&self.reference_state)
    }
}

impl Objective for QuadraticObjective {
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>, index: usize) -> f64 {
        let dx = x - self.stage_reference(index);
        (dx.transpose() * &self.q * &dx)[(0, 0)] + (u.transpose() * &self.r * u)[(0, 0)]
    }

    fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
        let dx = x - &self.reference_state;
        (dx.transpose() * &self.qf * &dx)[(0, 0)]
    }

    fn running_cost_gradients(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        index: usize,
    ) -> (DVector<f64>, DVector<f64>) {
        let dx = x - self.stage_reference(index);
        (2.0 * &self.q * dx, 2.0 * &self.r * u)
    }

    fn running_cost_hessians(
        &self,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        _index: usize,
    ) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let l_ux = DMatrix::zeros(self.r.nrows(), self.q.nrows());
        (2.0 * self.q.clone(), 2.0 * self.r.clone(), l_ux)
    }

    fn terminal_cost_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
        2.0 * &self.qf * (x - &self.reference_state)
    }

    fn terminal_cost_hessian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        2.0 * self.qf.clone()
    }

    fn reference_state(&self) -> DVector<f64> {
        self.reference_state.clone()
    }

    fn set_reference_state(&mut self, reference_state: DVector<f64>) {
        self.reference_state = reference_state;
    }

    fn set_reference_states(&mut self, reference_states: Vec<DVector<f64>>) {
        self.reference_states = reference_states;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objective() -> QuadraticObjective {
        QuadraticObjective::new(
            DMatrix::identity(2, 2),
            DMatrix::identity(1, 1) * 0.5,
            DMatrix::identity(2, 2) * 10.0,
            DVector::zeros(2),
            0.1,
        )
    }

    #[test]
    fn running_cost_scales_with_timestep() {
        let obj = objective();
        let x = DVector::from_vec(vec![1.0, 2.0]);
        let u = DVector::from_vec(vec![3.0]);
        // (1 + 4)·0.1 + 0.5·9·0.1
        let expected = 0.5 + 0.45;
        assert!((obj.running_cost(&x, &u, 0) - expected).abs() < 1e-12);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let obj = objective();
        let x = DVector::from_vec(vec![0.7, -0.3]);
        let u = DVector::from_vec(vec![0.2]);
        let (l_x, l_u) = obj.running_cost_gradients(&x, &u, 0);

        let h = 1e-6;
        for i in 0..2 {
            let mut xp = x.clone();
            xp[i] += h;
            let fd = (obj.running_cost(&xp, &u, 0) - obj.running_cost(&x, &u, 0)) / h;
            assert!((l_x[i] - fd).abs() < 1e-5);
        }
        let mut up = u.clone();
        up[0] += h;
        let fd = (obj.running_cost(&x, &up, 0) - obj.running_cost(&x, &u, 0)) / h;
        assert!((l_u[0] - fd).abs() < 1e-5);
    }

    #[test]
    fn terminal_cost_ignores_reference_trajectory() {
        let mut obj = objective();
        obj.set_reference_states(vec![DVector::from_vec(vec![5.0, 5.0]); 4]);
        let x = DVector::from_vec(vec![1.0, 0.0]);
        assert!((obj.terminal_cost(&x) - 10.0).abs() < 1e-12);
        // Stage costs track the trajectory entry instead.
        let u = DVector::zeros(1);
        let on_ref = obj.running_cost(&DVector::from_vec(vec![5.0, 5.0]), &u, 2);
        assert!(on_ref.abs() < 1e-12);
    }
}
