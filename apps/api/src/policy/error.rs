use thiserror::Error;

use crate::policy::cursor::PageCursor;
use crate::store::StoreError;

/// Errors raised by the policy query, pagination and write paths.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("malformed policy record {id}: bad field(s) {}", .fields.join(", "))]
    MalformedRecord { id: String, fields: Vec<String> },

    /// `next_cursor` resumes after the unreadable page when more exist.
    #[error("every record in the page was malformed ({skipped} skipped)")]
    PageUnreadable {
        skipped: usize,
        next_cursor: Option<PageCursor>,
    },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("policy {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PolicyError {
    pub fn validation(message: impl Into<String>) -> Self {
        PolicyError::Validation(vec![message.into()])
    }
}
