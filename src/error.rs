use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Errors surfaced by the dispatch engine.
///
/// Nothing is recovered locally; construction-time problems (`Config`,
/// `Input`) are fatal for the run, solver outcomes carry the offending
/// window, and `Invariant` indicates a bug rather than a data problem.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid input series: {0}")]
    Input(String),

    #[error("window starting {start} ({steps} steps) is infeasible: {reason}")]
    Infeasible {
        start: DateTime<FixedOffset>,
        steps: usize,
        reason: String,
    },

    #[error("solver failure in window starting {start} ({steps} steps): {detail}")]
    Solver {
        start: DateTime<FixedOffset>,
        steps: usize,
        detail: String,
    },

    #[error("invariant violation: {0}")]
    Invariant(String),
}
