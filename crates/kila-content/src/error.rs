//! Editor error types.
//!
//! Mirrors how failures surface to the person editing:
//!
//! - [`EditorError::LoadFailed`] is persistent and blocks edit actions until
//!   a reload succeeds
//! - [`EditorError::Mutation`] is transient; in-memory state is left as it
//!   was before the failed call
//! - History write failures never reach this type (they are logged and
//!   dropped)

use thiserror::Error;

use kila_types::BlockKey;

use crate::store::StoreError;

/// Editor error type.
#[derive(Debug, Error)]
pub enum EditorError {
    /// Listing blocks, sections, or history failed.
    #[error("load failed: {0}")]
    LoadFailed(#[source] StoreError),

    /// A create/update/delete/upload call failed.
    #[error("mutation failed: {0}")]
    Mutation(#[source] StoreError),

    /// Another commit is still running.
    #[error("a commit is already in flight")]
    CommitInFlight,

    /// The operation needs edit mode.
    #[error("not in edit mode")]
    NotEditing,

    /// The editor holds a load error; reload first.
    #[error("content failed to load; reload before editing")]
    Unloaded,

    /// No block with this key in the current list.
    #[error("block not found: {0}")]
    BlockNotFound(BlockKey),

    /// The block exists but has the wrong type for the operation.
    #[error("block {key} is a {actual}, expected {expected}")]
    WrongBlockType {
        key: BlockKey,
        actual: kila_types::BlockType,
        expected: &'static str,
    },

    /// The signed-in user may not do this.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Section titles must not be blank.
    #[error("section title must not be empty")]
    EmptyTitle,

    /// Index outside the block list.
    #[error("index {index} out of range for {len} blocks")]
    IndexOutOfRange { index: usize, len: usize },

    /// Snapshot serialization failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl EditorError {
    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Whether the error should stay visible until a reload succeeds.
    pub fn is_persistent(&self) -> bool {
        matches!(self, EditorError::LoadFailed(_) | EditorError::Unloaded)
    }
}

/// Editor result type.
pub type EditorResult<T> = Result<T, EditorError>;
