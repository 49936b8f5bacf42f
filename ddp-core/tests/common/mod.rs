//! Shared test fixtures.
#![allow(dead_code)] // not every test binary uses every fixture

use ddp_core::DynamicalSystem;
use nalgebra::{DMatrix, DVector};

/// Double integrator: position/velocity state, acceleration control.
///
/// Continuous dynamics `ẋ₁ = x₂`, `ẋ₂ = u`; the one-step map is explicit
/// Euler, so the discrete transition matches `A = [[1, Δ], [0, 1]]`,
/// `B = [[0], [Δ]]` exactly and the solver's linearization is exact.
pub struct DoubleIntegrator {
    pub timestep: f64,
}

impl DynamicalSystem for DoubleIntegrator {
    fn state_dim(&self) -> usize {
        2
    }

    fn control_dim(&self) -> usize {
        1
    }

    fn discrete_dynamics(&self, x: &DVector<f64>, u: &DVector<f64>, _t: f64) -> DVector<f64> {
        DVector::from_vec(vec![
            x[0] + self.timestep * x[1],
            x[1] + self.timestep * u[0],
        ])
    }

    fn jacobians(
        &self,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        _t: f64,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let fx = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let fu = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        (fx, fu)
    }
}

/// Discrete transition matrices of the double integrator.
pub fn double_integrator_ab(timestep: f64) -> (DMatrix<f64>, DMatrix<f64>) {
    let a = DMatrix::from_row_slice(2, 2, &[1.0, timestep, 0.0, 1.0]);
    let b = DMatrix::from_row_slice(2, 1, &[0.0, timestep]);
    (a, b)
}
