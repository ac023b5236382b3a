use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use service::StorageError;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::error;

use crate::codec;
use crate::observability;

/// Per-request failures; always turned into an envelope, never fatal.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request is missing path parameters")]
    Validation,
    #[error("unknown route")]
    UnknownRoute,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error(transparent)]
    Engine(#[from] StorageError),
    #[error("storage task failed: {0}")]
    Blocking(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation => codec::envelope(codec::BAD_REQUEST, codec::MISSING_PARAMS),
            ApiError::UnknownRoute => codec::envelope(StatusCode::NOT_FOUND, "unknown route"),
            ApiError::MethodNotAllowed => {
                codec::envelope(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
            }
            ApiError::Engine(e) => {
                error!(error = %e, "storage operation failed");
                observability::STORAGE_ERRORS_TOTAL.inc();
                codec::envelope(codec::INTERNAL_SERVER, codec::SERVER_ERROR)
            }
            ApiError::Blocking(e) => {
                error!(error = %e, "storage task did not complete");
                codec::envelope(codec::INTERNAL_SERVER, codec::SERVER_ERROR)
            }
        }
    }
}

/// Failures that abort `start()`; the service stays stopped.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unable to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("listener not accepting connections: {0}")]
    NotAccepting(String),
}

/// Failures observed while stopping; the service is stopped regardless.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("serve loop failed: {0}")]
    Serve(#[from] std::io::Error),
    #[error("serve task did not finish cleanly: {0}")]
    Task(String),
    #[error("closing storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("storage still held by {refs} other references after drain")]
    StorageBusy { refs: usize },
}
