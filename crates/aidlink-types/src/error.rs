use thiserror::Error;

/// Error taxonomy of the help-interaction core.
///
/// Validation and authorization failures are returned synchronously and
/// never retried. `Conflict` is resolved internally by idempotent
/// fallbacks and does not normally reach a caller. `TransientStorage` is
/// the recoverable class the participant counter retries on.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("authentication required")]
    AuthenticationRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("validation failed: {0}")]
    Validation(&'static str),

    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl CoreError {
    /// Whether a retry with the same inputs can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}
