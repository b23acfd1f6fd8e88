//! Protocol-level error type.

use thiserror::Error;

/// Errors raised while encoding or decoding protocol documents.
#[derive(Debug, Error)]
pub enum DirectError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("descriptor variable `{0}` not found")]
    MissingDescriptor(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}
