//! Row packing for the 12-column block grid.
//!
//! Blocks are placed greedily left to right; a new row starts whenever the
//! next block would push the running width past [`GRID_COLUMNS`]. At the end
//! of each row with at least [`MIN_WIDTH`] columns left, an inline insert slot
//! is offered while editing.
//!
//! All of this is recomputed from the block list on every render; nothing
//! here is persisted.

use kila_types::{BlockType, ContentBlock, GRID_COLUMNS, MIN_WIDTH};

/// One visual row of blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    /// Index of the first block in the row.
    pub start: usize,
    /// One past the index of the last block in the row.
    pub end: usize,
    /// Sum of block widths in the row.
    pub width: u8,
    /// Whether the row holds an image or gallery block.
    pub has_media: bool,
}

impl Row {
    /// Columns left free at the end of the row.
    pub fn remaining(&self) -> u8 {
        remaining_width(self.width)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Columns left in a row of the given width.
pub fn remaining_width(row_width: u8) -> u8 {
    GRID_COLUMNS.saturating_sub(row_width)
}

fn pack(items: impl IntoIterator<Item = (u8, bool)>) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();
    for (index, (width, media)) in items.into_iter().enumerate() {
        match rows.last_mut() {
            Some(row) if row.width + width <= GRID_COLUMNS => {
                row.end = index + 1;
                row.width += width;
                row.has_media |= media;
            }
            _ => rows.push(Row {
                start: index,
                end: index + 1,
                width,
                has_media: media,
            }),
        }
    }
    rows
}

/// Pack blocks into rows.
pub fn pack_rows(blocks: &[ContentBlock]) -> Vec<Row> {
    pack(blocks.iter().map(|b| (b.width, b.block_type.is_media())))
}

/// Pack bare widths into rows (no media).
pub fn pack_widths(widths: &[u8]) -> Vec<Row> {
    pack(widths.iter().map(|&w| (w, false)))
}

/// Which block types may be inserted, and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertPolicy {
    /// Types the type picker offers at all.
    pub allowed: Vec<BlockType>,
    /// Restrict inline slots next to media to textual types.
    pub restrict_beside_media: bool,
}

impl Default for InsertPolicy {
    fn default() -> Self {
        Self {
            allowed: vec![BlockType::Heading, BlockType::Text, BlockType::Image],
            restrict_beside_media: true,
        }
    }
}

impl InsertPolicy {
    pub fn new(allowed: Vec<BlockType>) -> Self {
        Self {
            allowed,
            ..Self::default()
        }
    }

    /// Types offered by an inline slot at the end of `row`.
    pub fn allowed_for_row(&self, row: &Row) -> Vec<BlockType> {
        self.allowed
            .iter()
            .copied()
            .filter(|t| !(self.restrict_beside_media && row.has_media) || t.is_textual())
            .collect()
    }
}

/// An inline "insert block here" affordance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertSlot {
    /// Insert position in the block list.
    pub index: usize,
    /// Pre-sized width of the new block.
    pub width: u8,
    /// Types the slot's picker is scoped to.
    pub allowed: Vec<BlockType>,
}

/// Rows plus the inline insert slots to render between them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Layout {
    pub rows: Vec<Row>,
    pub slots: Vec<InsertSlot>,
}

impl Layout {
    /// Slot rendered after the block at `index`, if any.
    pub fn slot_after(&self, index: usize) -> Option<&InsertSlot> {
        self.slots.iter().find(|s| s.index == index + 1)
    }
}

/// Compute rows and (while editing) inline insert slots.
pub fn plan(blocks: &[ContentBlock], editing: bool, policy: &InsertPolicy) -> Layout {
    let rows = pack_rows(blocks);
    let slots = if editing {
        rows.iter()
            .filter_map(|row| {
                let width = row.remaining();
                if width < MIN_WIDTH {
                    return None;
                }
                let allowed = policy.allowed_for_row(row);
                (!allowed.is_empty()).then_some(InsertSlot {
                    index: row.end,
                    width,
                    allowed,
                })
            })
            .collect()
    } else {
        Vec::new()
    };
    Layout { rows, slots }
}
