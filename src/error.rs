//! Error types for target registration, dispatch and result tracking

use thiserror::Error;

/// Errors surfaced by the registry, the dispatch path and the result tracker.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("duplicate target: {0}")]
    DuplicateTarget(String),

    #[error("duplicate sub-target {sub_target_id} in target {target_id}")]
    DuplicateSubTarget {
        target_id: String,
        sub_target_id: String,
    },

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error("sub-target {sub_target_id} not found in target {target_id}")]
    SubTargetNotFound {
        target_id: String,
        sub_target_id: String,
    },

    #[error("attack is not allowed on {0}")]
    AttackNotAllowed(String),

    #[error("no handler bound to {0}")]
    MissingHandler(String),

    #[error("another attack is already running: {0}")]
    AttackRunning(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),

    #[error("duplicate result name: {0}")]
    DuplicateResultName(String),

    #[error("result not found: {0}")]
    ResultNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors caused by the registering caller rather than the runtime.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvironment(_)
                | Self::InvalidTarget(_)
                | Self::DuplicateTarget(_)
                | Self::DuplicateSubTarget { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
