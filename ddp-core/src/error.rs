//! Fatal solver errors.
//!
//! Only unrecoverable conditions surface as errors; numerical trouble
//! (indefinite `Q_uu`, failed line searches, iteration limits) is handled
//! inside the solve loop and reported through the result record's
//! `status_message` instead.

use thiserror::Error;

/// Errors returned by problem configuration and `solve`.
#[derive(Debug, Error)]
pub enum CddpError {
    /// The problem is not set up in a solvable way (e.g. a constraint
    /// with zero dual dimension).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Supplied data disagrees with the problem dimensions in a way the
    /// solver cannot repair (e.g. the context and objective disagree on
    /// the reference state).
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}
