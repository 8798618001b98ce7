use crate::lifecycle::PayloadError;
use crate::store::StoreError;
use axum::http::StatusCode;
use thiserror::Error;
use tracing::{error, warn};

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("No free code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convert AppError to HTTP status codes for web responses
impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::CodeSpaceExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Clients only ever see the status; the cause stays in the server log.
impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        status.into_response()
    }
}
