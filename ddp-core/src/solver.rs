//! Solver algorithm dispatch.
//!
//! The problem context selects an algorithm by name at `solve` time.
//! Built-in algorithms are matched first against the external registry,
//! so downstream crates can override or extend the set without touching
//! this crate.

use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex};

use crate::error::CddpError;
use crate::ipddp::IpddpSolver;
use crate::problem::Cddp;
use crate::solution::CddpSolution;

/// A solver strategy the problem context can dispatch to.
///
/// `initialize` is called once per solve with a fully sized context;
/// `solve` then iterates to termination. Splitting the two lets a caller
/// hold a solver value across solves to reuse its internal state
/// (warm starts).
pub trait SolverAlgorithm {
    /// Human-readable algorithm name, reported in the result record.
    fn solver_name(&self) -> &'static str;

    /// Prepare solver state for the given context.
    fn initialize(&mut self, context: &mut Cddp) -> Result<(), CddpError>;

    /// Run the algorithm to termination.
    fn solve(&mut self, context: &mut Cddp) -> Result<CddpSolution, CddpError>;
}

/// Well-known solver names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverType {
    Clddp,
    Asddp,
    LogDdp,
    Ipddp,
    Msipddp,
    Alddp,
}

impl SolverType {
    /// The name used for registry lookup and reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverType::Clddp => "CLDDP",
            SolverType::Asddp => "ASDDP",
            SolverType::LogDdp => "LogDDP",
            SolverType::Ipddp => "IPDDP",
            SolverType::Msipddp => "MSIPDDP",
            SolverType::Alddp => "ALDDP",
        }
    }
}

/// Factory for externally registered solver algorithms.
pub type SolverFactory = fn() -> Box<dyn SolverAlgorithm>;

static EXTERNAL_SOLVERS: LazyLock<Mutex<BTreeMap<String, SolverFactory>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// Register (or replace) an external solver under `name`.
pub fn register_solver(name: &str, factory: SolverFactory) {
    EXTERNAL_SOLVERS
        .lock()
        .unwrap()
        .insert(name.to_string(), factory);
}

/// Whether an external solver is registered under `name`.
pub fn is_solver_registered(name: &str) -> bool {
    EXTERNAL_SOLVERS.lock().unwrap().contains_key(name)
}

/// Names of all externally registered solvers.
pub fn registered_solvers() -> Vec<String> {
    EXTERNAL_SOLVERS.lock().unwrap().keys().cloned().collect()
}

/// Instantiate the solver for `name`, consulting the external registry
/// before the built-ins. Returns `None` for unknown names; the context
/// turns that into an `UnknownSolver` result record.
pub(crate) fn create_solver(name: &str) -> Option<Box<dyn SolverAlgorithm>> {
    if let Some(factory) = EXTERNAL_SOLVERS.lock().unwrap().get(name) {
        return Some(factory());
    }

    match name {
        "IPDDP" => Some(Box::new(IpddpSolver::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        assert!(create_solver("IPDDP").is_some());
        assert!(create_solver("NoSuchSolver").is_none());
        // Sibling algorithms are dispatch names only until registered.
        assert!(create_solver("CLDDP").is_none());
    }

    #[test]
    fn solver_type_names() {
        assert_eq!(SolverType::Ipddp.as_str(), "IPDDP");
        assert_eq!(SolverType::LogDdp.as_str(), "LogDDP");
    }
}
