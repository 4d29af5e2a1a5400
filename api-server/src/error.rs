//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use flowguard_core::{ErrorKind, PipelineError, WaitError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Request errors
    BadRequest(String),
    NotFound(String),

    // Job errors
    Pipeline { kind: ErrorKind, message: String },
    Timeout(String),
    Unavailable(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Pipeline { kind, message } => {
                tracing::error!("Pipeline error [{}]: {}", kind, message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": message, "kind": kind }),
                )
            }
            AppError::Timeout(msg) => {
                tracing::warn!("Upload wait timed out: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, json!({ "error": msg }))
            }
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };

        let mut body = body;
        body["status"] = json!(status.as_u16());
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err.kind() {
            ErrorKind::Cancelled => AppError::Unavailable(err.to_string()),
            kind => AppError::Pipeline {
                kind,
                message: err.to_string(),
            },
        }
    }
}

impl From<WaitError> for AppError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Failed(e) => AppError::Pipeline { kind: e.kind, message: e.message },
            WaitError::Timeout => AppError::Timeout("job still running, poll /jobs for its status".to_string()),
            WaitError::UnknownJob => AppError::NotFound("Job not found".to_string()),
            WaitError::Cancelled => AppError::Unavailable("job was cancelled by server shutdown".to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}
