use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("already signed: {0}")]
    AlreadySigned(String),

    #[error("already rated: {0}")]
    AlreadyRated(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code, also used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::Expired(_) => "expired",
            EngineError::AlreadySigned(_) => "already_signed",
            EngineError::AlreadyRated(_) => "already_rated",
            EngineError::Conflict(_) => "conflict",
            EngineError::Precondition(_) => "precondition",
            EngineError::Timeout(_) => "timeout",
            EngineError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::InvalidTransition(_)
            | EngineError::AlreadySigned(_)
            | EngineError::AlreadyRated(_)
            | EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Expired(_) => StatusCode::GONE,
            EngineError::Precondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the person who triggered the request.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::NotFound(msg) => format!("We could not find that record ({msg})."),
            EngineError::Forbidden(msg) => {
                format!("You are not the party allowed to do this ({msg}).")
            }
            EngineError::InvalidTransition(msg) => {
                format!("This action is not available in the current state ({msg}).")
            }
            EngineError::Expired(_) => {
                "This offer expired before your response arrived. Ask the other fleet to send a new one."
                    .to_string()
            }
            EngineError::AlreadySigned(_) => {
                "This agreement has already been signed for your side.".to_string()
            }
            EngineError::AlreadyRated(_) => "You have already rated this trip.".to_string(),
            EngineError::Conflict(_) => {
                "Someone else changed this record at the same time. Reload it and try again."
                    .to_string()
            }
            EngineError::Precondition(msg) => format!("This cannot be done yet: {msg}."),
            EngineError::Timeout(_) => {
                "The request took too long. Check the record before retrying.".to_string()
            }
            EngineError::Internal(_) => "Something went wrong on our side.".to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => EngineError::NotFound(err.to_string()),
            StoreError::RevisionConflict { .. } | StoreError::AlreadyExists { .. } => {
                EngineError::Conflict(err.to_string())
            }
            StoreError::Backend(msg) => EngineError::Internal(msg),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = Json(json!({
            "error": self.code(),
            "message": self.user_message(),
            "detail": self.to_string(),
        }));

        (status, body).into_response()
    }
}
