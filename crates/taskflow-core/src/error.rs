use thiserror::Error;

use crate::task::TaskId;

/// Errors surfaced by store operations.
///
/// Everything except [`StoreError::PersistenceFailure`] goes straight back
/// to the caller; persistence failures raised while saving are logged by the
/// store and never undo the in-memory mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidFormat(_) => "invalid_format",
            Self::PersistenceFailure(_) => "persistence_failure",
        }
    }

    pub(crate) fn persistence(err: anyhow::Error) -> Self {
        Self::PersistenceFailure(format!("{err:#}"))
    }
}
