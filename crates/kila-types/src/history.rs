//! Section history: append-only before/after snapshots of committed edits.
//!
//! A snapshot is the pretty-printed JSON of `{ title, blocks }` with each
//! block reduced to `{ type, content, imageUrl, width, orderIndex }`. The
//! two-space indentation is load-bearing: history diffs operate on literal
//! lines, so the formatting decides diff granularity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::{BlockType, ContentBlock};
use crate::ids::{HistoryId, SectionId, UserId};

/// One immutable audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHistoryEntry {
    pub id: HistoryId,
    pub section_id: SectionId,
    pub editor_id: UserId,
    pub editor_name: String,
    pub created_at: DateTime<Utc>,
    pub before_snapshot: String,
    pub after_snapshot: String,
}

/// Input for appending a history entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub section_id: SectionId,
    pub editor_id: UserId,
    pub editor_name: String,
    pub before_snapshot: String,
    pub after_snapshot: String,
}

/// Block fields that participate in a snapshot, in serialization order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotBlock<'a> {
    #[serde(rename = "type")]
    block_type: BlockType,
    content: Option<&'a str>,
    image_url: Option<&'a str>,
    width: u8,
    order_index: u32,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    title: &'a str,
    blocks: Vec<SnapshotBlock<'a>>,
}

/// Render the canonical snapshot text for a section state.
pub fn section_snapshot(title: &str, blocks: &[ContentBlock]) -> serde_json::Result<String> {
    let snapshot = Snapshot {
        title,
        blocks: blocks
            .iter()
            .map(|block| SnapshotBlock {
                block_type: block.block_type,
                content: block.content.as_deref(),
                image_url: block.image_url.as_deref(),
                width: block.width,
                order_index: block.order_index,
            })
            .collect(),
    };
    serde_json::to_string_pretty(&snapshot)
}

// ============================================================================
// Tests
// ============================================================================
