//! Workflow and store errors

use crate::change_request::ChangeRequestStatus;
use rollgate_core::{SyntaxError, ValidationError};
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a [`crate::FlagStore`] or
/// [`crate::ChangeRequestStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    /// A guarded write found the request in a status it did not allow.
    #[error("change request is {actual}")]
    StatusMismatch { actual: ChangeRequestStatus },

    /// A flag moved past the revision a write expected.
    #[error("flag revision is {actual}, expected {expected}")]
    RevisionMismatch { expected: u64, actual: u64 },

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("change request {0} not found")]
    NotFound(Uuid),

    #[error("{reason}")]
    InvalidState {
        status: ChangeRequestStatus,
        reason: String,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("invalid query: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl WorkflowError {
    pub(crate) fn invalid_state(status: ChangeRequestStatus, reason: impl Into<String>) -> Self {
        WorkflowError::InvalidState {
            status,
            reason: reason.into(),
        }
    }

    pub(crate) fn store(context: impl Into<String>, source: StoreError) -> Self {
        WorkflowError::Store {
            context: context.into(),
            source,
        }
    }

    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::InvalidState { .. } => "invalid_state",
            WorkflowError::InvalidConfig(_) => "invalid_config",
            WorkflowError::Syntax(_) => "syntax_error",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::InvalidRequest(_) => "invalid_request",
            WorkflowError::Store { .. } => "store_error",
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
