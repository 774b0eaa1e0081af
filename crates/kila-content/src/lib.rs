//! # kila-content
//!
//! Content block editor engine for the kila camp website.
//!
//! A section's blocks are edited through a [`BlockEditor`]:
//! - In view mode every change goes straight to the store
//! - In edit mode changes collect in a draft and are persisted together by
//!   one commit that creates, updates, and deletes exactly what differs
//! - Blocks are packed into 12-column rows ([`layout`]) and can be resized
//!   ([`resize`]) or dragged into a new position ([`reorder`])
//! - Every persisted change can leave a before/after snapshot that is shown
//!   as a line diff ([`history`], [`diff`])
//!
//! [`SectionPanel`] wraps an editor with the section's title, metadata,
//! permissions, and deletion.

pub mod config;
pub mod diff;
pub mod editor;
pub mod error;
pub mod history;
pub mod inbox;
pub mod layout;
pub mod panel;
pub mod reorder;
pub mod resize;
pub mod store;

pub use config::{ConfigError, EditorConfig, KilaConfig};
pub use diff::{DiffLine, LineKind, diff_lines};
pub use editor::{BlockEditor, CommitPlan, CommitReport, Draft, Mode, SignalOutcome};
pub use error::{EditorError, EditorResult};
pub use history::{HistorySink, HistoryView, SectionHistoryRecorder, section_history, user_history};
pub use inbox::{InboxSeen, InboxSignals, InboxSubscription, has_unread, open_inbox};
pub use layout::{InsertPolicy, InsertSlot, Layout, Row, pack_rows};
pub use panel::{CommitEditReport, SectionDraft, SectionPanel, SiteStore, create_section, list_sections};
pub use reorder::DragTracker;
pub use resize::ResizeTracker;
pub use store::{
    BlobStore, BlockStore, ContentStore, MemoryStore, MessageStore, SectionStore, SqliteStore,
    StoreError, StoreResult, Upload,
};
