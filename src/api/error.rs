use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::error::SourceError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    /// The source exists but nothing could turn it into a playable URL.
    Unresolvable(String),

    ValidationError(String),

    InternalError(String),

    Unauthorized(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::Unresolvable(msg) => write!(f, "Unresolvable: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            Self::Unresolvable(msg) => {
                tracing::warn!("Source unresolvable: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "Cannot obtain the URL for this source".to_string(),
                )
            }
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(crate::error::ScrapeError::NotFound(what)) =
            err.downcast_ref::<crate::error::ScrapeError>()
        {
            return Self::NotFound(what.clone());
        }
        Self::InternalError(format!("{err:#}"))
    }
}

impl From<SourceError> for ApiError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => Self::NotFound(format!("Source {id} not found")),
            SourceError::HardResolutionFailure(msg) => Self::Unresolvable(msg),
            SourceError::Database(msg) => Self::DatabaseError(msg),
            SourceError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_map_to_status() {
        let status = |e: SourceError| ApiError::from(e).into_response().status();
        assert_eq!(status(SourceError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(SourceError::HardResolutionFailure("dead".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(SourceError::Database("locked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
