//! SQLite store backend.
//!
//! Keeps sections, blocks, history, blobs, and messages in one database file.
//! Blob bytes live in `content_blobs`, keyed by object path, so public URLs
//! round-trip through [`object_path_from_url`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use kila_types::{
    BlockId, BlockKey, BlockPatch, BlockType, ContentBlock, ContentSection, HistoryId, Message,
    MessageId, NewBlock, NewHistoryEntry, NewSection, OutgoingMessage, SectionHistoryEntry,
    SectionId, SectionPatch, UserId,
};

use super::{
    BlobKind, BlobStore, BlockStore, MessageStore, SectionStore, StoreError, StoreResult, Upload,
    object_path, object_path_from_url, public_url,
};

const SCHEMA: &str = r#"
-- Sections (one row per named group of blocks)
CREATE TABLE IF NOT EXISTS content_sections (
    id TEXT PRIMARY KEY,
    page_section_id TEXT NOT NULL,
    title TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    owner_name TEXT NOT NULL,
    editor_ids TEXT NOT NULL DEFAULT '[]',
    show_author INTEGER NOT NULL DEFAULT 0,
    show_publish_date INTEGER NOT NULL DEFAULT 0,
    publish_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sections_page ON content_sections(page_section_id, created_at);

-- Blocks (dense 1-based order within a section)
CREATE TABLE IF NOT EXISTS content_blocks (
    id TEXT PRIMARY KEY,
    section_id TEXT NOT NULL,
    type TEXT NOT NULL,
    content TEXT,
    image_url TEXT,
    width INTEGER NOT NULL,
    order_index INTEGER NOT NULL,
    FOREIGN KEY (section_id) REFERENCES content_sections(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_blocks_order ON content_blocks(section_id, order_index);

-- History (append-only; survives section deletion)
CREATE TABLE IF NOT EXISTS content_section_history (
    id TEXT PRIMARY KEY,
    section_id TEXT NOT NULL,
    editor_id TEXT NOT NULL,
    editor_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    before_snapshot TEXT NOT NULL,
    after_snapshot TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_section ON content_section_history(section_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_history_editor ON content_section_history(editor_id, created_at DESC);

-- Uploaded blobs, keyed by object path
CREATE TABLE IF NOT EXISTS content_blobs (
    path TEXT PRIMARY KEY,
    section_id TEXT NOT NULL,
    bytes BLOB NOT NULL,
    created_at TEXT NOT NULL
);

-- Inbox (broadcasts stored once per recipient)
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    sender_avatar_url TEXT,
    body TEXT NOT NULL,
    is_broadcast INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_recipient ON messages(recipient_id, created_at DESC);
"#;

// =============================================================================
// Row mapping
// =============================================================================

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let raw: String = row.get(idx)?;
    uuid::Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

const BLOCK_COLUMNS: &str = "id, section_id, type, content, image_url, width, order_index";

fn row_to_block(row: &Row<'_>) -> rusqlite::Result<ContentBlock> {
    let block_type: String = row.get(2)?;
    let width: i64 = row.get(5)?;
    let order_index: i64 = row.get(6)?;
    Ok(ContentBlock {
        key: BlockKey::Persisted(BlockId::from(uuid_at(row, 0)?)),
        section_id: SectionId::from(uuid_at(row, 1)?),
        block_type: BlockType::from_str(&block_type).unwrap_or_default(),
        content: row.get(3)?,
        image_url: row.get(4)?,
        width: kila_types::clamp_width(width),
        order_index: order_index.max(0) as u32,
    })
}

const SECTION_COLUMNS: &str = "id, page_section_id, title, owner_id, owner_name, editor_ids, \
     show_author, show_publish_date, publish_date, created_at, updated_at";

fn row_to_section(row: &Row<'_>) -> rusqlite::Result<ContentSection> {
    let editor_ids: String = row.get(5)?;
    let editor_ids: Vec<UserId> =
        serde_json::from_str(&editor_ids).map_err(|e| conversion_error(5, e))?;
    Ok(ContentSection {
        id: SectionId::from(uuid_at(row, 0)?),
        page_section_id: row.get(1)?,
        title: row.get(2)?,
        owner_id: UserId::from(uuid_at(row, 3)?),
        owner_name: row.get(4)?,
        editor_ids,
        show_author: row.get(6)?,
        show_publish_date: row.get(7)?,
        publish_date: row.get::<_, Option<NaiveDate>>(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const HISTORY_COLUMNS: &str =
    "id, section_id, editor_id, editor_name, created_at, before_snapshot, after_snapshot";

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<SectionHistoryEntry> {
    Ok(SectionHistoryEntry {
        id: HistoryId::from(uuid_at(row, 0)?),
        section_id: SectionId::from(uuid_at(row, 1)?),
        editor_id: UserId::from(uuid_at(row, 2)?),
        editor_name: row.get(3)?,
        created_at: row.get(4)?,
        before_snapshot: row.get(5)?,
        after_snapshot: row.get(6)?,
    })
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, sender_name, sender_avatar_url, body, is_broadcast, created_at";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId::from(uuid_at(row, 0)?),
        sender_id: UserId::from(uuid_at(row, 1)?),
        recipient_id: UserId::from(uuid_at(row, 2)?),
        sender_name: row.get(3)?,
        sender_avatar_url: row.get(4)?,
        body: row.get(5)?,
        is_broadcast: row.get(6)?,
        created_at: row.get(7)?,
    })
}

// =============================================================================
// Store
// =============================================================================

/// SQLite-backed store.
///
/// The connection sits behind a mutex; every trait call runs its statements
/// synchronously under the lock and releases it before returning.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    public_base_url: String,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P, public_base_url: impl Into<String>) -> StoreResult<Self> {
        Self::init(Connection::open(path)?, public_base_url.into())
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory(public_base_url: impl Into<String>) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, public_base_url.into())
    }

    fn init(conn: Connection, public_base_url: String) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            public_base_url,
        })
    }

    /// Distinct page regions that have at least one section.
    pub fn list_page_regions(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT page_section_id FROM content_sections ORDER BY page_section_id",
        )?;
        let regions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(regions)
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM content_blobs", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_block(conn: &Connection, id: BlockId) -> StoreResult<ContentBlock> {
        conn.query_row(
            &format!("SELECT {BLOCK_COLUMNS} FROM content_blocks WHERE id = ?1"),
            params![id.to_string()],
            row_to_block,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("block {id}")))
    }

    fn get_section_row(conn: &Connection, id: SectionId) -> StoreResult<ContentSection> {
        conn.query_row(
            &format!("SELECT {SECTION_COLUMNS} FROM content_sections WHERE id = ?1"),
            params![id.to_string()],
            row_to_section,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("section {id}")))
    }

    fn store_blob(
        &self,
        section_id: SectionId,
        upload: &Upload,
        kind: BlobKind,
    ) -> StoreResult<String> {
        let path = object_path(section_id, upload, kind);
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO content_blobs (path, section_id, bytes, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![path, section_id.to_string(), upload.bytes, Utc::now()],
        )?;
        Ok(public_url(&self.public_base_url, &path))
    }
}

#[async_trait]
impl BlockStore for SqliteStore {
    async fn list_blocks(&self, section_id: SectionId) -> StoreResult<Vec<ContentBlock>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM content_blocks WHERE section_id = ?1 ORDER BY order_index"
        ))?;
        let blocks = stmt
            .query_map(params![section_id.to_string()], row_to_block)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(blocks)
    }

    async fn create_block(&self, block: NewBlock) -> StoreResult<ContentBlock> {
        let id = BlockId::new();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO content_blocks (id, section_id, type, content, image_url, width, order_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                block.section_id.to_string(),
                block.block_type.as_str(),
                block.content,
                block.image_url,
                block.width as i64,
                block.order_index as i64,
            ],
        )?;
        Self::get_block(&conn, id)
    }

    async fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<ContentBlock> {
        let conn = self.conn.lock();
        let mut block = Self::get_block(&conn, id)?;
        patch.apply_to(&mut block);
        conn.execute(
            "UPDATE content_blocks SET content = ?2, image_url = ?3, width = ?4, order_index = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                block.content,
                block.image_url,
                block.width as i64,
                block.order_index as i64,
            ],
        )?;
        Ok(block)
    }

    async fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM content_blocks WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn upload_image(&self, section_id: SectionId, upload: &Upload) -> StoreResult<String> {
        self.store_blob(section_id, upload, BlobKind::Image)
    }

    async fn upload_file(&self, section_id: SectionId, upload: &Upload) -> StoreResult<String> {
        self.store_blob(section_id, upload, BlobKind::File)
    }

    async fn delete_blob(&self, url: &str) -> StoreResult<()> {
        let Some(path) = object_path_from_url(url) else {
            return Ok(());
        };
        let conn = self.conn.lock();
        conn.execute("DELETE FROM content_blobs WHERE path = ?1", params![path])?;
        Ok(())
    }
}

#[async_trait]
impl SectionStore for SqliteStore {
    async fn list_sections(&self, page_section_id: &str) -> StoreResult<Vec<ContentSection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SECTION_COLUMNS} FROM content_sections
             WHERE page_section_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let sections = stmt
            .query_map(params![page_section_id], row_to_section)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sections)
    }

    async fn get_section(&self, id: SectionId) -> StoreResult<ContentSection> {
        let conn = self.conn.lock();
        Self::get_section_row(&conn, id)
    }

    async fn create_section(&self, section: NewSection) -> StoreResult<ContentSection> {
        let id = SectionId::new();
        let now = Utc::now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO content_sections (id, page_section_id, title, owner_id, owner_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id.to_string(),
                section.page_section_id,
                section.title,
                section.owner_id.to_string(),
                section.owner_name,
                now,
            ],
        )?;
        Self::get_section_row(&conn, id)
    }

    async fn update_section(
        &self,
        id: SectionId,
        patch: SectionPatch,
    ) -> StoreResult<ContentSection> {
        let conn = self.conn.lock();
        let mut section = Self::get_section_row(&conn, id)?;
        patch.apply_to(&mut section);
        section.updated_at = Utc::now();
        conn.execute(
            "UPDATE content_sections SET title = ?2, editor_ids = ?3, show_author = ?4,
                 show_publish_date = ?5, publish_date = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id.to_string(),
                section.title,
                serde_json::to_string(&section.editor_ids)?,
                section.show_author,
                section.show_publish_date,
                section.publish_date,
                section.updated_at,
            ],
        )?;
        Ok(section)
    }

    async fn delete_section(&self, id: SectionId) -> StoreResult<()> {
        let conn = self.conn.lock();
        // Blocks go with the section via ON DELETE CASCADE.
        conn.execute(
            "DELETE FROM content_sections WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    async fn list_history(&self, section_id: SectionId) -> StoreResult<Vec<SectionHistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM content_section_history
             WHERE section_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let entries = stmt
            .query_map(params![section_id.to_string()], row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    async fn list_user_history(&self, editor_id: UserId) -> StoreResult<Vec<SectionHistoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM content_section_history
             WHERE editor_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let entries = stmt
            .query_map(params![editor_id.to_string()], row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    async fn create_history(&self, entry: NewHistoryEntry) -> StoreResult<SectionHistoryEntry> {
        let created = SectionHistoryEntry {
            id: HistoryId::new(),
            section_id: entry.section_id,
            editor_id: entry.editor_id,
            editor_name: entry.editor_name,
            created_at: Utc::now(),
            before_snapshot: entry.before_snapshot,
            after_snapshot: entry.after_snapshot,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO content_section_history
                 (id, section_id, editor_id, editor_name, created_at, before_snapshot, after_snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                created.id.to_string(),
                created.section_id.to_string(),
                created.editor_id.to_string(),
                created.editor_name,
                created.created_at,
                created.before_snapshot,
                created.after_snapshot,
            ],
        )?;
        Ok(created)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn list_messages_for_user(&self, user_id: UserId) -> StoreResult<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE recipient_id = ?1 OR sender_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let messages = stmt
            .query_map(params![user_id.to_string()], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    async fn latest_inbox_timestamp(&self, user_id: UserId) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();
        let latest = conn
            .query_row(
                "SELECT created_at FROM messages WHERE recipient_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
                params![user_id.to_string()],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()?;
        Ok(latest)
    }

    async fn send_message(&self, message: OutgoingMessage) -> StoreResult<()> {
        let now = Utc::now();
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        for recipient_id in &message.recipient_ids {
            tx.execute(
                &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    MessageId::new().to_string(),
                    message.sender_id.to_string(),
                    recipient_id.to_string(),
                    message.sender_name,
                    message.sender_avatar_url,
                    message.body,
                    message.is_broadcast,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
