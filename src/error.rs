use thiserror::Error;

use crate::fetch::FetchError;

/// Errors surfaced by the query operations.
///
/// The HTTP layer maps each variant onto a status code; the CLI just prints
/// the message.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("{message}")]
    NotFound {
        message: String,
        /// Extra context echoed back to the caller, e.g. near-miss names.
        debug: Option<serde_json::Value>,
    },

    #[error("{0}")]
    Validation(String),
}

impl ArchiveError {
    pub fn validation(message: impl Into<String>) -> Self {
        ArchiveError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
