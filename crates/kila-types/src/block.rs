//! Content blocks: the typed visual units a section is built from.
//!
//! A block occupies `width` columns of a 12-column grid and sits at a 1-based
//! `order_index` inside its section. What `content` and `image_url` mean
//! depends on the block type:
//!
//! | Type      | `content`                        | `image_url`          |
//! |-----------|----------------------------------|----------------------|
//! | heading   | plain text                       | unused               |
//! | text      | HTML (rich text)                 | unused               |
//! | image     | unused                           | image URL            |
//! | link      | label                            | target URL           |
//! | file      | label                            | uploaded file URL    |
//! | gallery   | JSON array of image URLs         | unused               |

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{BlockKey, SectionId};

/// Number of columns in the layout grid.
pub const GRID_COLUMNS: u8 = 12;

/// Narrowest allowed block width.
pub const MIN_WIDTH: u8 = 3;

/// Widest allowed block width (a full row).
pub const MAX_WIDTH: u8 = GRID_COLUMNS;

/// Default width of a freshly inserted single-image block.
pub const DEFAULT_IMAGE_WIDTH: u8 = 6;

/// Clamp any requested width into `[MIN_WIDTH, MAX_WIDTH]`.
pub fn clamp_width(value: i64) -> u8 {
    value.clamp(MIN_WIDTH as i64, MAX_WIDTH as i64) as u8
}

/// What a block *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BlockType {
    /// Single-line heading.
    Heading,
    /// Rich text paragraph(s).
    #[default]
    Text,
    /// A single uploaded image.
    Image,
    /// External link with a label.
    Link,
    /// Uploaded file attachment with a label.
    File,
    /// Several uploaded images shown as a gallery.
    Gallery,
}

impl BlockType {
    /// All block types, in type-picker order.
    pub const ALL: [BlockType; 6] = [
        BlockType::Heading,
        BlockType::Text,
        BlockType::Image,
        BlockType::Link,
        BlockType::File,
        BlockType::Gallery,
    ];

    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Heading => "heading",
            BlockType::Text => "text",
            BlockType::Image => "image",
            BlockType::Link => "link",
            BlockType::File => "file",
            BlockType::Gallery => "gallery",
        }
    }

    /// Image-like blocks that restrict what may be inserted next to them.
    pub fn is_media(&self) -> bool {
        matches!(self, BlockType::Image | BlockType::Gallery)
    }

    /// Blocks whose primary payload is text.
    pub fn is_textual(&self) -> bool {
        matches!(self, BlockType::Heading | BlockType::Text)
    }

    /// Width a new block of this type gets when the caller has no preference.
    pub fn default_width(&self) -> u8 {
        match self {
            BlockType::Image => DEFAULT_IMAGE_WIDTH,
            _ => MAX_WIDTH,
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Gallery payloads ────────────────────────────────────────────────────────

/// Decode a gallery block's `content` into its image URLs.
///
/// Malformed or missing payloads decode to an empty list; non-string and
/// blank entries are skipped.
pub fn parse_gallery(content: Option<&str>) -> Vec<String> {
    let Some(raw) = content.filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(url) if !url.trim().is_empty() => Some(url),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Encode gallery image URLs as a block `content` payload.
pub fn serialize_gallery(images: &[String]) -> String {
    serde_json::to_string(images).unwrap_or_else(|_| "[]".to_string())
}

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Strip markup and `&nbsp;` from rich text, leaving visible characters.
pub fn visible_text(content: &str) -> String {
    MARKUP
        .replace_all(content, "")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

// ── Blocks ──────────────────────────────────────────────────────────────────

/// One typed content unit inside a section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    /// Persisted ID or draft-local key.
    pub key: BlockKey,
    /// Owning section.
    pub section_id: SectionId,
    /// What the block is.
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Text payload (see module docs for per-type meaning).
    pub content: Option<String>,
    /// URL payload (see module docs for per-type meaning).
    pub image_url: Option<String>,
    /// Column span, always within `[MIN_WIDTH, MAX_WIDTH]`.
    pub width: u8,
    /// 1-based position within the section.
    pub order_index: u32,
}

impl ContentBlock {
    /// Build a new draft-only block shaped for `block_type`.
    ///
    /// Image blocks carry `image_url`; galleries start with an empty JSON
    /// array; everything else starts with empty text.
    pub fn draft(
        section_id: SectionId,
        block_type: BlockType,
        index: usize,
        image_url: Option<String>,
        width: Option<u8>,
    ) -> Self {
        let (content, image_url) = match block_type {
            BlockType::Image => (None, image_url),
            BlockType::Gallery => (Some(serialize_gallery(&[])), None),
            _ => (Some(String::new()), None),
        };
        let width = clamp_width(width.unwrap_or_else(|| block_type.default_width()) as i64);
        Self {
            key: BlockKey::draft(),
            section_id,
            block_type,
            content,
            image_url,
            width,
            order_index: index as u32 + 1,
        }
    }

    /// Decoded gallery images (empty for non-gallery blocks).
    pub fn gallery_images(&self) -> Vec<String> {
        match self.block_type {
            BlockType::Gallery => parse_gallery(self.content.as_deref()),
            _ => Vec::new(),
        }
    }

    /// Check if the block has nothing worth persisting.
    pub fn is_blank(&self) -> bool {
        match self.block_type {
            BlockType::Image => self.image_url.as_deref().is_none_or(str::is_empty),
            BlockType::Gallery => self.gallery_images().is_empty(),
            BlockType::Link | BlockType::File => {
                let label = self.content.as_deref().unwrap_or("").trim();
                let url = self.image_url.as_deref().unwrap_or("").trim();
                label.is_empty() && url.is_empty()
            }
            BlockType::Heading | BlockType::Text => {
                visible_text(self.content.as_deref().unwrap_or("")).is_empty()
            }
        }
    }

    /// Every URL this block references that may point at an owned blob.
    ///
    /// Foreign URLs (e.g. link targets) are harmless here: the blob store
    /// ignores URLs it did not issue.
    pub fn referenced_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.image_url.iter().cloned().collect();
        urls.extend(self.gallery_images());
        urls
    }

    /// Creation payload for this block at its current position.
    pub fn to_new_block(&self) -> NewBlock {
        NewBlock {
            section_id: self.section_id,
            block_type: self.block_type,
            content: self.content.clone(),
            image_url: self.image_url.clone(),
            width: self.width,
            order_index: self.order_index,
        }
    }
}

/// Rewrite `order_index` to match array position (1..N).
pub fn renumber(blocks: &mut [ContentBlock]) {
    for (index, block) in blocks.iter_mut().enumerate() {
        block.order_index = index as u32 + 1;
    }
}

/// Check the dense ordering invariant: indices are exactly 1..N.
pub fn is_densely_ordered(blocks: &[ContentBlock]) -> bool {
    blocks
        .iter()
        .enumerate()
        .all(|(index, block)| block.order_index == index as u32 + 1)
}

/// Input for creating a block in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBlock {
    pub section_id: SectionId,
    pub block_type: BlockType,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub width: u8,
    pub order_index: u32,
}

/// Partial update for a persisted block. `None` means "leave unchanged".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPatch {
    pub content: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub width: Option<u8>,
    pub order_index: Option<u32>,
}

impl BlockPatch {
    /// Only a new order index.
    pub fn order(order_index: u32) -> Self {
        Self {
            order_index: Some(order_index),
            ..Self::default()
        }
    }

    /// Only a new width.
    pub fn width(width: u8) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    /// Only a new text payload.
    pub fn content(content: Option<String>) -> Self {
        Self {
            content: Some(content),
            ..Self::default()
        }
    }

    /// Only a new URL payload.
    pub fn image_url(image_url: Option<String>) -> Self {
        Self {
            image_url: Some(image_url),
            ..Self::default()
        }
    }

    /// Field-by-field difference from `original` to `next`.
    ///
    /// Absent and empty text compare equal, so a block whose content went
    /// from `None` to `""` produces no change.
    pub fn between(original: &ContentBlock, next: &ContentBlock) -> Self {
        let mut patch = Self::default();
        if original.content.as_deref().unwrap_or("") != next.content.as_deref().unwrap_or("") {
            patch.content = Some(next.content.clone());
        }
        if original.image_url.as_deref().unwrap_or("") != next.image_url.as_deref().unwrap_or("") {
            patch.image_url = Some(next.image_url.clone());
        }
        if original.width != next.width {
            patch.width = Some(next.width);
        }
        if original.order_index != next.order_index {
            patch.order_index = Some(next.order_index);
        }
        patch
    }

    /// Check if the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.image_url.is_none()
            && self.width.is_none()
            && self.order_index.is_none()
    }

    /// Apply this patch to a block in place.
    pub fn apply_to(&self, block: &mut ContentBlock) {
        if let Some(content) = &self.content {
            block.content = content.clone();
        }
        if let Some(image_url) = &self.image_url {
            block.image_url = image_url.clone();
        }
        if let Some(width) = self.width {
            block.width = width;
        }
        if let Some(order_index) = self.order_index {
            block.order_index = order_index;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
