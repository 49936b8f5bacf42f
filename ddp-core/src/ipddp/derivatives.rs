//! Per-stage derivative cache.
//!
//! Dynamics Jacobians/Hessians and stacked constraint Jacobians are
//! recomputed at the top of every backward pass. Storage is allocated
//! once at solver initialization and overwritten in place; with
//! `enable_parallel` and a horizon of at least
//! [`MIN_HORIZON_FOR_PARALLEL`] stages the fill is partitioned into
//! contiguous stage chunks across worker threads. Stage entries are
//! disjoint, so workers never alias; the scope join publishes the cache
//! to the backward pass.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};

use crate::constraint::Constraint;
use crate::problem::Cddp;

/// Horizons shorter than this are always filled sequentially.
pub(crate) const MIN_HORIZON_FOR_PARALLEL: usize = 50;

/// Offsets of each named constraint inside the stacked dual vector.
///
/// Constraints iterate in name order (the constraint set is an ordered
/// map), so offsets are reproducible across solves for the same set.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConstraintLayout {
    entries: Vec<LayoutEntry>,
    total: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct LayoutEntry {
    pub name: String,
    pub offset: usize,
    pub dim: usize,
}

impl ConstraintLayout {
    pub fn from_constraint_set(set: &BTreeMap<String, Box<dyn Constraint>>) -> Self {
        let mut entries = Vec::with_capacity(set.len());
        let mut offset = 0;
        for (name, constraint) in set {
            let dim = constraint.dual_dim();
            entries.push(LayoutEntry {
                name: name.clone(),
                offset,
                dim,
            });
            offset += dim;
        }
        Self {
            entries,
            total: offset,
        }
    }

    /// Combined dual dimension `D`.
    pub fn total_dim(&self) -> usize {
        self.total
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }
}

/// Evaluate all path constraints at `(x, u)` into a stacked residual
/// `g = evaluate − upper_bound`, following the layout's offsets.
pub(crate) fn stacked_residual(
    set: &BTreeMap<String, Box<dyn Constraint>>,
    x: &DVector<f64>,
    u: &DVector<f64>,
    out: &mut DVector<f64>,
) {
    let mut offset = 0;
    for constraint in set.values() {
        let dim = constraint.dual_dim();
        let g = constraint.evaluate(x, u) - constraint.upper_bound();
        out.rows_mut(offset, dim).copy_from(&g);
        offset += dim;
    }
}

/// Derivatives of one stage.
#[derive(Debug, Clone)]
pub(crate) struct StageDerivatives {
    /// Continuous-time dynamics Jacobians, `n×n` and `n×m`.
    pub fx: DMatrix<f64>,
    pub fu: DMatrix<f64>,

    /// Dynamics Hessian tensors, one `n×n` / `m×m` / `m×n` matrix per
    /// state component; empty under iLQR.
    pub fxx: Vec<DMatrix<f64>>,
    pub fuu: Vec<DMatrix<f64>>,
    pub fux: Vec<DMatrix<f64>>,

    /// Constraint Jacobians stacked over the ordered constraint set,
    /// `D×n` and `D×m`.
    pub gx: DMatrix<f64>,
    pub gu: DMatrix<f64>,
}

impl StageDerivatives {
    fn zeros(n: usize, m: usize, dual_dim: usize) -> Self {
        Self {
            fx: DMatrix::zeros(n, n),
            fu: DMatrix::zeros(n, m),
            fxx: Vec::new(),
            fuu: Vec::new(),
            fux: Vec::new(),
            gx: DMatrix::zeros(dual_dim, n),
            gu: DMatrix::zeros(dual_dim, m),
        }
    }
}

/// Stage-major derivative storage, refreshed once per backward pass.
#[derive(Debug, Default)]
pub(crate) struct DerivativeCache {
    pub stages: Vec<StageDerivatives>,
}

impl DerivativeCache {
    /// Size the cache for the given problem dimensions.
    pub fn allocate(&mut self, horizon: usize, n: usize, m: usize, dual_dim: usize) {
        self.stages.clear();
        self.stages
            .resize_with(horizon, || StageDerivatives::zeros(n, m, dual_dim));
    }

    /// Recompute every stage's derivatives from the current trajectory.
    pub fn compute(&mut self, context: &Cddp) {
        let horizon = context.horizon;
        let use_parallel =
            context.options.enable_parallel && horizon >= MIN_HORIZON_FOR_PARALLEL;

        if !use_parallel {
            for (t, stage) in self.stages.iter_mut().enumerate() {
                fill_stage(stage, context, t);
            }
            return;
        }

        let num_threads = context.options.num_threads.clamp(1, horizon);
        let chunk_size = horizon.div_ceil(num_threads);

        // Chunks are disjoint stage ranges; a panicking worker propagates
        // through the scope join and aborts the solve.
        std::thread::scope(|scope| {
            for (chunk_index, chunk) in self.stages.chunks_mut(chunk_size).enumerate() {
                let start = chunk_index * chunk_size;
                scope.spawn(move || {
                    for (offset, stage) in chunk.iter_mut().enumerate() {
                        fill_stage(stage, context, start + offset);
                    }
                });
            }
        });
    }
}

fn fill_stage(stage: &mut StageDerivatives, context: &Cddp, t: usize) {
    let x = &context.x_traj[t];
    let u = &context.u_traj[t];
    let time = t as f64 * context.timestep;

    let (fx, fu) = context.system.jacobians(x, u, time);
    stage.fx = fx;
    stage.fu = fu;

    if context.options.use_ilqr {
        stage.fxx.clear();
        stage.fuu.clear();
        stage.fux.clear();
    } else {
        let (fxx, fuu, fux) = context.system.hessians(x, u, time);
        stage.fxx = fxx;
        stage.fuu = fuu;
        stage.fux = fux;
    }

    let n = stage.gx.ncols();
    let m = stage.gu.ncols();
    let mut offset = 0;
    for constraint in context.path_constraints.values() {
        let dim = constraint.dual_dim();
        stage
            .gx
            .view_mut((offset, 0), (dim, n))
            .copy_from(&constraint.state_jacobian(x, u));
        stage
            .gu
            .view_mut((offset, 0), (dim, m))
            .copy_from(&constraint.control_jacobian(x, u));
        offset += dim;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ControlConstraint;

    #[test]
    fn layout_offsets_follow_name_order() {
        let mut set: BTreeMap<String, Box<dyn Constraint>> = BTreeMap::new();
        set.insert(
            "b_controls".into(),
            Box::new(ControlConstraint::new(DVector::from_vec(vec![1.0, 1.0]))),
        );
        set.insert(
            "a_controls".into(),
            Box::new(ControlConstraint::new(DVector::from_vec(vec![2.0]))),
        );

        let layout = ConstraintLayout::from_constraint_set(&set);
        assert_eq!(layout.total_dim(), 6);

        let entries = layout.entries();
        assert_eq!(entries[0].name, "a_controls");
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[0].dim, 2);
        assert_eq!(entries[1].name, "b_controls");
        assert_eq!(entries[1].offset, 2);
        assert_eq!(entries[1].dim, 4);
    }

    #[test]
    fn stacked_residual_matches_layout() {
        let mut set: BTreeMap<String, Box<dyn Constraint>> = BTreeMap::new();
        set.insert(
            "bounds".into(),
            Box::new(ControlConstraint::new(DVector::from_vec(vec![0.5]))),
        );

        let x = DVector::zeros(2);
        let u = DVector::from_vec(vec![0.2]);
        let mut g = DVector::zeros(2);
        stacked_residual(&set, &x, &u, &mut g);

        assert!((g[0] - (0.2 - 0.5)).abs() < 1e-12);
        assert!((g[1] - (-0.2 - 0.5)).abs() < 1e-12);
    }
}
