//! Solver result record.
//!
//! Solves return a map keyed by documented field names with
//! tagged-variant values, so heterogeneous outputs (scalars, trajectories,
//! gain sequences) travel in one record and clients read by known key.
//!
//! Always-present keys: `solver_name`, `status_message`,
//! `iterations_completed`, `solve_time_ms`, `final_objective`,
//! `final_step_length`, `time_points`, `state_trajectory`,
//! `control_trajectory`, `control_feedback_gains_K`,
//! `final_regularization`, `final_barrier_parameter_mu`,
//! `final_primal_infeasibility`, `final_dual_infeasibility`,
//! `final_complementary_infeasibility`.
//!
//! With `return_iteration_info` set, per-iteration histories are added
//! under `history_objective`, `history_merit_function`,
//! `history_step_length_primal`, `history_step_length_dual`,
//! `history_dual_infeasibility`, `history_primal_infeasibility`,
//! `history_complementary_infeasibility`, and `history_barrier_mu`.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

/// One value in the result record.
#[derive(Debug, Clone)]
pub enum SolutionValue {
    /// Scalar metric.
    Float(f64),

    /// Counter (iterations).
    Int(usize),

    /// Status or name string.
    Text(String),

    /// Scalar sequence (time points, iteration histories).
    FloatList(Vec<f64>),

    /// Vector sequence (state or control trajectory).
    VectorList(Vec<DVector<f64>>),

    /// Matrix sequence (feedback gains).
    MatrixList(Vec<DMatrix<f64>>),
}

/// Result record returned by `solve`.
pub type CddpSolution = BTreeMap<String, SolutionValue>;

/// Typed read access to a [`CddpSolution`].
///
/// Each accessor returns `None` when the key is absent or holds a
/// different variant.
pub trait SolutionAccess {
    fn float(&self, key: &str) -> Option<f64>;
    fn int(&self, key: &str) -> Option<usize>;
    fn text(&self, key: &str) -> Option<&str>;
    fn float_list(&self, key: &str) -> Option<&[f64]>;
    fn vector_list(&self, key: &str) -> Option<&[DVector<f64>]>;
    fn matrix_list(&self, key: &str) -> Option<&[DMatrix<f64>]>;
}

impl SolutionAccess for CddpSolution {
    fn float(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(SolutionValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    fn int(&self, key: &str) -> Option<usize> {
        match self.get(key) {
            Some(SolutionValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(SolutionValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    fn float_list(&self, key: &str) -> Option<&[f64]> {
        match self.get(key) {
            Some(SolutionValue::FloatList(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn vector_list(&self, key: &str) -> Option<&[DVector<f64>]> {
        match self.get(key) {
            Some(SolutionValue::VectorList(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn matrix_list(&self, key: &str) -> Option<&[DMatrix<f64>]> {
        match self.get(key) {
            Some(SolutionValue::MatrixList(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let mut solution = CddpSolution::new();
        solution.insert("final_objective".into(), SolutionValue::Float(1.5));
        solution.insert("iterations_completed".into(), SolutionValue::Int(7));
        solution.insert(
            "status_message".into(),
            SolutionValue::Text("OptimalSolutionFound".into()),
        );
        solution.insert(
            "time_points".into(),
            SolutionValue::FloatList(vec![0.0, 0.1]),
        );

        assert_eq!(solution.float("final_objective"), Some(1.5));
        assert_eq!(solution.int("iterations_completed"), Some(7));
        assert_eq!(solution.text("status_message"), Some("OptimalSolutionFound"));
        assert_eq!(solution.float_list("time_points"), Some(&[0.0, 0.1][..]));

        // Wrong variant or missing key reads as None.
        assert_eq!(solution.float("status_message"), None);
        assert_eq!(solution.int("missing"), None);
        assert!(solution.vector_list("state_trajectory").is_none());
    }
}
