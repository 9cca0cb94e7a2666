//! Error types for Loopline

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Link group inconsistency: {0}")]
    LinkGroupInconsistency(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
