//! State-layer errors

use ll_core::CoreError;
use thiserror::Error;

/// Errors surfaced by the action engine and model mutations
#[derive(Error, Debug)]
pub enum StateError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Action failed: {0}")]
    ActionFailed(String),
}

/// Result type alias
pub type StateResult<T> = Result<T, StateError>;
