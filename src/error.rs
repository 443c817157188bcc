use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Failures the scrape pipeline distinguishes between.
///
/// Loops inside the processor branch on these: `NotFound` and
/// `UpstreamLogicMismatch` are skipped, `ConstraintRace` is treated as
/// success, everything else is logged and the loop moves on.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream request failed for {service}: {message}")]
    UpstreamTransient { service: String, message: String },

    #[error("Upstream data rejected: {0}")]
    UpstreamLogicMismatch(String),

    #[error("Row already created by a concurrent writer")]
    ConstraintRace,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DbErr> for ScrapeError {
    fn from(err: DbErr) -> Self {
        if is_unique_violation(&err) {
            Self::ConstraintRace
        } else {
            Self::Database(err.to_string())
        }
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        Self::UpstreamTransient {
            service,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Cannot obtain the URL for this source: {0}")]
    HardResolutionFailure(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbErr> for SourceError {
    fn from(err: DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for SourceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Walks an `anyhow` chain looking for a unique-constraint violation.
#[must_use]
pub fn is_constraint_race(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<DbErr>().is_some_and(is_unique_violation)
            || matches!(
                cause.downcast_ref::<ScrapeError>(),
                Some(ScrapeError::ConstraintRace)
            )
    })
}
