//! Shared identity and content types for the kila camp website.
//!
//! This crate is the relational foundation: typed IDs, content blocks,
//! sections, history entries, and inbox messages. It has **no internal kila
//! dependencies**: a pure leaf crate that the editor engine builds on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Page region (page_section_id, e.g. "camp")
//!     └── ContentSection (SectionId) ← owned by a Principal (UserId)
//!             └── editor_ids: extra Principals with edit rights
//!             └── ContentBlock (BlockKey) × N, dense order_index 1..N
//!             └── SectionHistoryEntry (HistoryId) × N, append-only
//!
//! Principal (UserId)
//!     └── receives Message (MessageId)
//! ```
//!
//! # Key Types
//!
//! |--------------------------|----------------------------------------------|
//! | Type                     | Purpose                                      |
//! |--------------------------|----------------------------------------------|
//! | [`ContentBlock`]         | One typed visual unit in a 12-column grid    |
//! | [`BlockKey`]             | Persisted ID or draft-only key               |
//! | [`ContentSection`]       | Named, ownable group of blocks               |
//! | [`SectionHistoryEntry`]  | Before/after snapshot of one committed edit  |
//! | [`Principal`]            | Signed-in user + role                        |
//! | [`Message`]              | Inbox message                                |
//! |--------------------------|----------------------------------------------|

pub mod block;
pub mod history;
pub mod ids;
pub mod message;
pub mod section;

// Re-export primary types at crate root for convenience.
pub use block::{
    BlockPatch, BlockType, ContentBlock, GRID_COLUMNS, MAX_WIDTH, MIN_WIDTH, NewBlock,
    clamp_width, is_densely_ordered, parse_gallery, renumber, serialize_gallery,
};
pub use history::{NewHistoryEntry, SectionHistoryEntry, section_snapshot};
pub use ids::{
    BlockId, BlockKey, DraftId, HistoryId, MessageId, PrefixError, SectionId, UserId,
    resolve_section_prefix,
};
pub use message::{Message, OutgoingMessage, latest_received};
pub use section::{
    ContentSection, NewSection, Principal, SectionMeta, SectionPatch, UserRole,
    parse_publish_date,
};
