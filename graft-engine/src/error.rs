//! Fatal engine errors. Per-draft failures are not errors; they are
//! recorded in the run report.

use graft_client::ClientError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a run before any draft is dispatched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Initial token acquisition failed. Nothing was mutated.
    #[error("authentication failed: {0}")]
    Auth(#[source] ClientError),

    /// The baseline bulk fetch failed; the engine cannot classify
    /// drafts without it. Nothing was mutated.
    #[error("baseline fetch failed: {0}")]
    Baseline(#[source] ClientError),
}
