//! Typed identifiers for users, sections, blocks, history rows, and messages.
//!
//! Every ID type wraps a UUIDv7 (time-ordered, globally unique) and displays
//! as standard UUID text. The `short()` form (first 8 hex chars) is for
//! human-facing output only, never for lookup.
//!
//! Blocks get one extra wrinkle: an unsaved block lives only in an editor's
//! draft and has no store-assigned ID yet. [`BlockKey`] makes that explicit
//! so the commit step can branch on "needs create" vs "needs update" with a
//! match instead of a string check.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

/// A content section identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(uuid::Uuid);

/// A persisted content block identifier (UUIDv7, assigned by the store).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(uuid::Uuid);

/// A draft-local block identifier (UUIDv7, never seen by the store).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(uuid::Uuid);

/// A section history entry identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryId(uuid::Uuid);

/// An inbox message identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for human display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// Check if a query string matches this ID by hex prefix.
            pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
                self.to_hex().starts_with(prefix)
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl std::str::FromStr for $T {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(UserId, "UserId");
impl_typed_id!(SectionId, "SectionId");
impl_typed_id!(BlockId, "BlockId");
impl_typed_id!(DraftId, "DraftId");
impl_typed_id!(HistoryId, "HistoryId");
impl_typed_id!(MessageId, "MessageId");

// ── Block keys ──────────────────────────────────────────────────────────────

/// Address of a block inside an editor: persisted or draft-only.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "lowercase")]
pub enum BlockKey {
    /// The block exists in the store.
    Persisted(BlockId),
    /// The block exists only in a draft and must be created on commit.
    Draft(DraftId),
}

impl BlockKey {
    /// Mint a fresh draft-only key.
    pub fn draft() -> Self {
        BlockKey::Draft(DraftId::new())
    }

    /// The store ID, if this block has been persisted.
    pub fn persisted(&self) -> Option<BlockId> {
        match self {
            BlockKey::Persisted(id) => Some(*id),
            BlockKey::Draft(_) => None,
        }
    }

    /// Check if this block exists only in a draft.
    pub fn is_draft(&self) -> bool {
        matches!(self, BlockKey::Draft(_))
    }
}

impl From<BlockId> for BlockKey {
    fn from(id: BlockId) -> Self {
        BlockKey::Persisted(id)
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKey::Persisted(id) => write!(f, "{id}"),
            BlockKey::Draft(id) => write!(f, "draft:{}", id.short()),
        }
    }
}

// ── Prefix resolution ───────────────────────────────────────────────────────

/// Error from ambiguous prefix resolution.
#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    #[error("no match for prefix '{0}'")]
    NoMatch(String),
    #[error("ambiguous prefix '{prefix}': matches {candidates:?}")]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
}

/// Resolve a query string against section IDs and their titles.
///
/// Resolution order:
/// 1. Exact title match
/// 2. Unique title prefix match
/// 3. Unique hex prefix match
/// 4. Error (no match or ambiguous)
pub fn resolve_section_prefix<'a>(
    sections: impl Iterator<Item = (SectionId, &'a str)>,
    query: &str,
) -> Result<SectionId, PrefixError> {
    let entries: Vec<(SectionId, &str)> = sections.collect();

    if let Some(&(id, _)) = entries.iter().find(|(_, title)| *title == query) {
        return Ok(id);
    }

    let title_matches: Vec<(SectionId, &str)> = entries
        .iter()
        .filter(|(_, title)| title.starts_with(query))
        .copied()
        .collect();

    if title_matches.len() == 1 {
        return Ok(title_matches[0].0);
    }
    if title_matches.len() > 1 {
        return Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: title_matches.iter().map(|(_, t)| t.to_string()).collect(),
        });
    }

    let hex_matches: Vec<SectionId> = entries
        .iter()
        .filter(|(id, _)| id.matches_hex_prefix(query))
        .map(|(id, _)| *id)
        .collect();

    match hex_matches.len() {
        0 => Err(PrefixError::NoMatch(query.to_string())),
        1 => Ok(hex_matches[0]),
        _ => Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: hex_matches.iter().map(|id| id.short()).collect(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
