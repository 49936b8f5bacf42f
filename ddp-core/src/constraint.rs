//! Inequality constraint contract and the symmetric control-bound
//! constraint.

use nalgebra::{DMatrix, DVector};

/// A stage-wise inequality constraint.
///
/// The solver works with the shifted residual
/// `g(x, u) = evaluate(x, u) − upper_bound() ≤ 0`; every component of the
/// evaluation gets one slack and one dual variable, so [`dual_dim`]
/// fixes the constraint's footprint in the stacked multiplier vector.
///
/// [`dual_dim`]: Constraint::dual_dim
pub trait Constraint: Send + Sync {
    /// Number of scalar constraint components.
    fn dual_dim(&self) -> usize;

    /// Raw constraint value, length [`dual_dim`](Constraint::dual_dim).
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// Upper bound per component.
    fn upper_bound(&self) -> DVector<f64>;

    /// Jacobian w.r.t. the state, `dual_dim × n`.
    fn state_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64>;

    /// Jacobian w.r.t. the control, `dual_dim × m`.
    fn control_jacobian(&self, x: &DVector<f64>, u: &DVector<f64>) -> DMatrix<f64>;
}

/// Symmetric control bounds `|uᵢ| ≤ boundᵢ`, encoded as the pair of
/// one-sided constraints `u ≤ bound` and `−u ≤ bound`.
#[derive(Debug, Clone)]
pub struct ControlConstraint {
    bound: DVector<f64>,
}

impl ControlConstraint {
    /// Bounds must be strictly positive for the interior to be nonempty.
    pub fn new(bound: DVector<f64>) -> Self {
        Self { bound }
    }

    /// The per-component bound vector.
    pub fn bound(&self) -> &DVector<f64> {
        &self.bound
    }
}

impl Constraint for ControlConstraint {
    fn dual_dim(&self) -> usize {
        2 * self.bound.len()
    }

    fn evaluate(&self, _x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        let m = self.bound.len();
        let mut g = DVector::zeros(2 * m);
        g.rows_mut(0, m).copy_from(u);
        g.rows_mut(m, m).copy_from(&(-u));
        g
    }

    fn upper_bound(&self) -> DVector<f64> {
        let m = self.bound.len();
        let mut ub = DVector::zeros(2 * m);
        ub.rows_mut(0, m).copy_from(&self.bound);
        ub.rows_mut(m, m).copy_from(&self.bound);
        ub
    }

    fn state_jacobian(&self, x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::zeros(2 * self.bound.len(), x.len())
    }

    fn control_jacobian(&self, _x: &DVector<f64>, _u: &DVector<f64>) -> DMatrix<f64> {
        let m = self.bound.len();
        let mut jac = DMatrix::zeros(2 * m, m);
        for i in 0..m {
            jac[(i, i)] = 1.0;
            jac[(m + i, i)] = -1.0;
        }
        jac
    }
}
