//! Remote store abstraction.
//!
//! The editor never talks to a database directly. It consumes four narrow
//! async traits that mirror the remote object store the site runs against:
//!
//! - [`BlockStore`] - CRUD + ordered listing of content blocks
//! - [`BlobStore`] - upload/delete of image and file blobs
//! - [`SectionStore`] - sections and their append-only history
//! - [`MessageStore`] - inbox messages
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`] - in-process, records every call (for tests and demos)
//! - [`SqliteStore`] - `rusqlite`-backed, used by the `kila` CLI
//!
//! ## Design Decisions
//!
//! - **Each call fails as a unit**: a backend either applies a call fully or
//!   returns an error. Multi-call sequences (like a commit) are not atomic.
//! - **Blob URLs are public URLs**: the object path is recovered from the
//!   URL marker, and URLs the store did not issue are ignored on delete.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use kila_types::{
    BlockId, BlockPatch, ContentBlock, ContentSection, Message, NewBlock, NewHistoryEntry,
    NewSection, OutgoingMessage, SectionHistoryEntry, SectionId, SectionPatch, UserId,
};

pub use memory::{MemoryStore, StoreCall};
pub use sqlite::SqliteStore;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend rejected or failed the call.
    #[error("backend error: {0}")]
    Backend(String),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored data could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;

/// An uploaded file as handed over by the picker (or the image cropper).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    /// Original file name, used only for its extension.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// File extension, or `fallback` when the name has none.
    pub fn extension<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext,
            _ => fallback,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Content block table.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// All blocks of a section, ordered by `order_index` ascending.
    async fn list_blocks(&self, section_id: SectionId) -> StoreResult<Vec<ContentBlock>>;

    /// Create a block and return it with its store-assigned ID.
    async fn create_block(&self, block: NewBlock) -> StoreResult<ContentBlock>;

    /// Apply a partial update and return the updated row.
    async fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<ContentBlock>;

    /// Remove a block row.
    async fn delete_block(&self, id: BlockId) -> StoreResult<()>;
}

/// Blob storage for uploaded images and files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store an image and return its public URL.
    async fn upload_image(&self, section_id: SectionId, upload: &Upload) -> StoreResult<String>;

    /// Store a file attachment and return its public URL.
    async fn upload_file(&self, section_id: SectionId, upload: &Upload) -> StoreResult<String>;

    /// Delete a blob by public URL. Foreign URLs are a silent no-op.
    async fn delete_blob(&self, url: &str) -> StoreResult<()>;
}

/// Sections and their history.
#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Sections of a page region, oldest first.
    async fn list_sections(&self, page_section_id: &str) -> StoreResult<Vec<ContentSection>>;

    async fn get_section(&self, id: SectionId) -> StoreResult<ContentSection>;

    async fn create_section(&self, section: NewSection) -> StoreResult<ContentSection>;

    async fn update_section(&self, id: SectionId, patch: SectionPatch)
    -> StoreResult<ContentSection>;

    /// Delete a section row; its block rows go with it.
    async fn delete_section(&self, id: SectionId) -> StoreResult<()>;

    /// History of one section, newest first.
    async fn list_history(&self, section_id: SectionId) -> StoreResult<Vec<SectionHistoryEntry>>;

    /// History written by one editor across all sections, newest first.
    async fn list_user_history(&self, editor_id: UserId) -> StoreResult<Vec<SectionHistoryEntry>>;

    /// Append a history entry.
    async fn create_history(&self, entry: NewHistoryEntry) -> StoreResult<SectionHistoryEntry>;
}

/// Inbox messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages sent to or by a user, newest first.
    async fn list_messages_for_user(&self, user_id: UserId) -> StoreResult<Vec<Message>>;

    /// Timestamp of the newest message addressed to a user.
    async fn latest_inbox_timestamp(&self, user_id: UserId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Deliver one message body to every recipient.
    async fn send_message(&self, message: OutgoingMessage) -> StoreResult<()>;
}

/// What a block editor needs: block rows plus the blobs they own.
pub trait ContentStore: BlockStore + BlobStore {}

impl<T: BlockStore + BlobStore + ?Sized> ContentStore for T {}

// ============================================================================
// Blob paths
// ============================================================================

/// Marker between the public base URL and the object path.
pub const PUBLIC_OBJECT_MARKER: &str = "/storage/v1/object/public/content/";

/// What kind of blob is being stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobKind {
    Image,
    File,
}

impl BlobKind {
    fn default_extension(&self) -> &'static str {
        match self {
            BlobKind::Image => "png",
            BlobKind::File => "zip",
        }
    }
}

/// Object path for a new upload: `{section}/{millis}-{rand}.{ext}`, with
/// files under `{section}/files/`.
pub fn object_path(section_id: SectionId, upload: &Upload, kind: BlobKind) -> String {
    let millis = Utc::now().timestamp_millis();
    let nonce = uuid::Uuid::new_v4().as_simple().to_string();
    let ext = upload.extension(kind.default_extension());
    match kind {
        BlobKind::Image => format!("{section_id}/{millis}-{}.{ext}", &nonce[..12]),
        BlobKind::File => format!("{section_id}/files/{millis}-{}.{ext}", &nonce[..12]),
    }
}

/// Public URL for an object path.
pub fn public_url(base_url: &str, path: &str) -> String {
    format!("{}{PUBLIC_OBJECT_MARKER}{path}", base_url.trim_end_matches('/'))
}

/// Recover the object path from a public URL; `None` for foreign URLs.
pub fn object_path_from_url(url: &str) -> Option<&str> {
    let start = url.find(PUBLIC_OBJECT_MARKER)? + PUBLIC_OBJECT_MARKER.len();
    let path = url[start..].split('?').next().unwrap_or("");
    if path.is_empty() { None } else { Some(path) }
}
