//! HTTP error mapping
use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rollgate_core::{SyntaxError, ValidationError};
use rollgate_workflow::{RefreshError, WorkflowError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Workflow(WorkflowError::InvalidConfig(err))
    }
}

impl From<SyntaxError> for ApiError {
    fn from(err: SyntaxError) -> Self {
        ApiError::Workflow(WorkflowError::Syntax(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Workflow(err) => match err {
                WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::InvalidState { .. } | WorkflowError::Conflict(_) => StatusCode::CONFLICT,
                WorkflowError::InvalidConfig(_) | WorkflowError::Syntax(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                WorkflowError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                WorkflowError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Workflow(err) => err.code(),
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = json!({ "error": self.to_string(), "code": self.code() });
        match &self {
            ApiError::Workflow(WorkflowError::InvalidConfig(e)) => {
                body["field"] = json!(e.field);
            }
            ApiError::Workflow(WorkflowError::Syntax(e)) => {
                body["line"] = json!(e.line);
                body["column"] = json!(e.column);
            }
            ApiError::Workflow(WorkflowError::InvalidState { status, .. }) => {
                body["status"] = json!(status);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

/// Startup failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("relay client: {0}")]
    Relay(#[from] RefreshError),

    #[error("server io: {0}")]
    Io(#[from] std::io::Error),
}
