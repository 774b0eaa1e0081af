//! In-memory store backend.
//!
//! Used for tests and demos. All data is ephemeral. Every call is appended to
//! a call log so tests can assert exactly which mutations an operation
//! issued, and failures can be injected per call.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use kila_types::{
    BlockId, BlockKey, BlockPatch, ContentBlock, ContentSection, HistoryId, Message, MessageId,
    NewBlock, NewHistoryEntry, NewSection, OutgoingMessage, SectionHistoryEntry, SectionId,
    SectionPatch, UserId,
};

use super::{
    BlobKind, BlobStore, BlockStore, MessageStore, SectionStore, StoreError, StoreResult, Upload,
    object_path, object_path_from_url, public_url,
};

/// Base URL the memory store issues blob URLs under.
pub const MEMORY_BASE_URL: &str = "memory://kila";

/// One recorded store call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    ListBlocks(SectionId),
    CreateBlock(NewBlock),
    UpdateBlock(BlockId, BlockPatch),
    DeleteBlock(BlockId),
    UploadImage(SectionId),
    UploadFile(SectionId),
    DeleteBlob(String),
    ListSections(String),
    GetSection(SectionId),
    CreateSection(NewSection),
    UpdateSection(SectionId, SectionPatch),
    DeleteSection(SectionId),
    ListHistory(SectionId),
    ListUserHistory(UserId),
    CreateHistory(NewHistoryEntry),
    ListMessages(UserId),
    LatestInbox(UserId),
    SendMessage(OutgoingMessage),
}

impl StoreCall {
    /// Check if this call mutates blocks or blobs.
    pub fn is_content_mutation(&self) -> bool {
        matches!(
            self,
            StoreCall::CreateBlock(_)
                | StoreCall::UpdateBlock(..)
                | StoreCall::DeleteBlock(_)
                | StoreCall::DeleteBlob(_)
        )
    }
}

type FailRule = Box<dyn Fn(&StoreCall) -> bool + Send + Sync>;

#[derive(Default)]
struct Tables {
    sections: Vec<ContentSection>,
    blocks: HashMap<BlockId, ContentBlock>,
    blobs: HashMap<String, Vec<u8>>,
    history: Vec<SectionHistoryEntry>,
    messages: Vec<Message>,
}

/// In-memory store backend.
///
/// Thread-safe via internal locks; no lock is held across an await.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    calls: Mutex<Vec<StoreCall>>,
    fail_rule: Mutex<Option<FailRule>>,
    yielding: Mutex<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            calls: Mutex::new(Vec::new()),
            fail_rule: Mutex::new(None),
            yielding: Mutex::new(false),
        }
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Forget the call log (e.g. after seeding).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Calls matching a predicate.
    pub fn calls_matching(&self, pred: impl Fn(&StoreCall) -> bool) -> Vec<StoreCall> {
        self.calls.lock().iter().filter(|c| pred(c)).cloned().collect()
    }

    /// Fail every call the rule matches with a backend error.
    pub fn fail_when(&self, rule: impl Fn(&StoreCall) -> bool + Send + Sync + 'static) {
        *self.fail_rule.lock() = Some(Box::new(rule));
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        *self.fail_rule.lock() = None;
    }

    /// Yield to the scheduler inside every call, so concurrently polled
    /// operations interleave the way real network calls do.
    pub fn set_yielding(&self, yielding: bool) {
        *self.yielding.lock() = yielding;
    }

    /// Check whether a blob URL is currently stored.
    pub fn has_blob(&self, url: &str) -> bool {
        object_path_from_url(url).is_some_and(|path| self.tables.read().blobs.contains_key(path))
    }

    pub fn blob_count(&self) -> usize {
        self.tables.read().blobs.len()
    }

    async fn record(&self, call: StoreCall) -> StoreResult<()> {
        let yielding = *self.yielding.lock();
        if yielding {
            tokio::task::yield_now().await;
        }
        let failed = self
            .fail_rule
            .lock()
            .as_ref()
            .is_some_and(|rule| rule(&call));
        let description = format!("{call:?}");
        self.calls.lock().push(call);
        if failed {
            return Err(StoreError::backend(format!("injected failure: {description}")));
        }
        Ok(())
    }

    fn store_blob(&self, section_id: SectionId, upload: &Upload, kind: BlobKind) -> String {
        let path = object_path(section_id, upload, kind);
        let url = public_url(MEMORY_BASE_URL, &path);
        self.tables.write().blobs.insert(path, upload.bytes.clone());
        url
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn list_blocks(&self, section_id: SectionId) -> StoreResult<Vec<ContentBlock>> {
        self.record(StoreCall::ListBlocks(section_id)).await?;
        let tables = self.tables.read();
        let mut blocks: Vec<ContentBlock> = tables
            .blocks
            .values()
            .filter(|b| b.section_id == section_id)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| b.order_index);
        Ok(blocks)
    }

    async fn create_block(&self, block: NewBlock) -> StoreResult<ContentBlock> {
        self.record(StoreCall::CreateBlock(block.clone())).await?;
        let id = BlockId::new();
        let created = ContentBlock {
            key: BlockKey::Persisted(id),
            section_id: block.section_id,
            block_type: block.block_type,
            content: block.content,
            image_url: block.image_url,
            width: block.width,
            order_index: block.order_index,
        };
        self.tables.write().blocks.insert(id, created.clone());
        Ok(created)
    }

    async fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<ContentBlock> {
        self.record(StoreCall::UpdateBlock(id, patch.clone())).await?;
        let mut tables = self.tables.write();
        let block = tables
            .blocks
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("block {id}")))?;
        patch.apply_to(block);
        Ok(block.clone())
    }

    async fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        self.record(StoreCall::DeleteBlock(id)).await?;
        self.tables.write().blocks.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn upload_image(&self, section_id: SectionId, upload: &Upload) -> StoreResult<String> {
        self.record(StoreCall::UploadImage(section_id)).await?;
        Ok(self.store_blob(section_id, upload, BlobKind::Image))
    }

    async fn upload_file(&self, section_id: SectionId, upload: &Upload) -> StoreResult<String> {
        self.record(StoreCall::UploadFile(section_id)).await?;
        Ok(self.store_blob(section_id, upload, BlobKind::File))
    }

    async fn delete_blob(&self, url: &str) -> StoreResult<()> {
        self.record(StoreCall::DeleteBlob(url.to_string())).await?;
        if let Some(path) = object_path_from_url(url) {
            self.tables.write().blobs.remove(path);
        }
        Ok(())
    }
}

#[async_trait]
impl SectionStore for MemoryStore {
    async fn list_sections(&self, page_section_id: &str) -> StoreResult<Vec<ContentSection>> {
        self.record(StoreCall::ListSections(page_section_id.to_string())).await?;
        Ok(self
            .tables
            .read()
            .sections
            .iter()
            .filter(|s| s.page_section_id == page_section_id)
            .cloned()
            .collect())
    }

    async fn get_section(&self, id: SectionId) -> StoreResult<ContentSection> {
        self.record(StoreCall::GetSection(id)).await?;
        self.tables
            .read()
            .sections
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("section {id}")))
    }

    async fn create_section(&self, section: NewSection) -> StoreResult<ContentSection> {
        self.record(StoreCall::CreateSection(section.clone())).await?;
        let now = Utc::now();
        let created = ContentSection {
            id: SectionId::new(),
            page_section_id: section.page_section_id,
            title: section.title,
            owner_id: section.owner_id,
            owner_name: section.owner_name,
            editor_ids: Vec::new(),
            show_author: false,
            show_publish_date: false,
            publish_date: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().sections.push(created.clone());
        Ok(created)
    }

    async fn update_section(
        &self,
        id: SectionId,
        patch: SectionPatch,
    ) -> StoreResult<ContentSection> {
        self.record(StoreCall::UpdateSection(id, patch.clone())).await?;
        let mut tables = self.tables.write();
        let section = tables
            .sections
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::not_found(format!("section {id}")))?;
        patch.apply_to(section);
        section.updated_at = Utc::now();
        Ok(section.clone())
    }

    async fn delete_section(&self, id: SectionId) -> StoreResult<()> {
        self.record(StoreCall::DeleteSection(id)).await?;
        let mut tables = self.tables.write();
        tables.sections.retain(|s| s.id != id);
        tables.blocks.retain(|_, b| b.section_id != id);
        Ok(())
    }

    async fn list_history(&self, section_id: SectionId) -> StoreResult<Vec<SectionHistoryEntry>> {
        self.record(StoreCall::ListHistory(section_id)).await?;
        Ok(self
            .tables
            .read()
            .history
            .iter()
            .rev()
            .filter(|h| h.section_id == section_id)
            .cloned()
            .collect())
    }

    async fn list_user_history(&self, editor_id: UserId) -> StoreResult<Vec<SectionHistoryEntry>> {
        self.record(StoreCall::ListUserHistory(editor_id)).await?;
        Ok(self
            .tables
            .read()
            .history
            .iter()
            .rev()
            .filter(|h| h.editor_id == editor_id)
            .cloned()
            .collect())
    }

    async fn create_history(&self, entry: NewHistoryEntry) -> StoreResult<SectionHistoryEntry> {
        self.record(StoreCall::CreateHistory(entry.clone())).await?;
        let created = SectionHistoryEntry {
            id: HistoryId::new(),
            section_id: entry.section_id,
            editor_id: entry.editor_id,
            editor_name: entry.editor_name,
            created_at: Utc::now(),
            before_snapshot: entry.before_snapshot,
            after_snapshot: entry.after_snapshot,
        };
        self.tables.write().history.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn list_messages_for_user(&self, user_id: UserId) -> StoreResult<Vec<Message>> {
        self.record(StoreCall::ListMessages(user_id)).await?;
        Ok(self
            .tables
            .read()
            .messages
            .iter()
            .rev()
            .filter(|m| m.recipient_id == user_id || m.sender_id == user_id)
            .cloned()
            .collect())
    }

    async fn latest_inbox_timestamp(&self, user_id: UserId) -> StoreResult<Option<DateTime<Utc>>> {
        self.record(StoreCall::LatestInbox(user_id)).await?;
        Ok(self
            .tables
            .read()
            .messages
            .iter()
            .filter(|m| m.recipient_id == user_id)
            .map(|m| m.created_at)
            .max())
    }

    async fn send_message(&self, message: OutgoingMessage) -> StoreResult<()> {
        self.record(StoreCall::SendMessage(message.clone())).await?;
        let now = Utc::now();
        let mut tables = self.tables.write();
        for recipient_id in &message.recipient_ids {
            tables.messages.push(Message {
                id: MessageId::new(),
                sender_id: message.sender_id,
                recipient_id: *recipient_id,
                sender_name: message.sender_name.clone(),
                sender_avatar_url: message.sender_avatar_url.clone(),
                body: message.body.clone(),
                is_broadcast: message.is_broadcast,
                created_at: now,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kila_types::BlockType;

    fn new_block(section_id: SectionId, order_index: u32) -> NewBlock {
        NewBlock {
            section_id,
            block_type: BlockType::Text,
            content: Some(format!("block {order_index}")),
            image_url: None,
            width: 12,
            order_index,
        }
    }

    #[tokio::test]
    async fn test_list_blocks_sorted_by_order() {
        let store = MemoryStore::new();
        let section = SectionId::new();
        store.create_block(new_block(section, 2)).await.unwrap();
        store.create_block(new_block(section, 1)).await.unwrap();
        store.create_block(new_block(SectionId::new(), 1)).await.unwrap();

        let blocks = store.list_blocks(section).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].order_index, 1);
        assert_eq!(blocks[1].order_index, 2);
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let store = MemoryStore::new();
        let created = store.create_block(new_block(SectionId::new(), 1)).await.unwrap();
        let id = created.key.persisted().unwrap();
        let updated = store.update_block(id, BlockPatch::width(4)).await.unwrap();
        assert_eq!(updated.width, 4);
        assert_eq!(updated.content, created.content);
    }

    #[tokio::test]
    async fn test_update_missing_block() {
        let store = MemoryStore::new();
        let err = store.update_block(BlockId::new(), BlockPatch::width(4)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blob_lifecycle() {
        let store = MemoryStore::new();
        let url = store
            .upload_image(SectionId::new(), &Upload::new("a.png", b"png".to_vec()))
            .await
            .unwrap();
        assert!(store.has_blob(&url));
        store.delete_blob(&url).await.unwrap();
        assert!(!store.has_blob(&url));
        // Foreign URLs are ignored.
        store.delete_blob("https://example.org/x.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let store = MemoryStore::new();
        store.fail_when(|call| matches!(call, StoreCall::DeleteBlock(_)));
        let err = store.delete_block(BlockId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.calls().len(), 1);
        store.heal();
        store.delete_block(BlockId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_section_cascades_blocks() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let section = store
            .create_section(NewSection {
                page_section_id: "camp".into(),
                title: "Camp".into(),
                owner_id: owner,
                owner_name: "Mia".into(),
            })
            .await
            .unwrap();
        store.create_block(new_block(section.id, 1)).await.unwrap();
        store.delete_section(section.id).await.unwrap();
        assert!(store.list_blocks(section.id).await.unwrap().is_empty());
        assert!(store.list_sections("camp").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = MemoryStore::new();
        let section = SectionId::new();
        let editor = UserId::new();
        for n in 0..3 {
            store
                .create_history(NewHistoryEntry {
                    section_id: section,
                    editor_id: editor,
                    editor_name: "Mia".into(),
                    before_snapshot: format!("{n}"),
                    after_snapshot: format!("{}", n + 1),
                })
                .await
                .unwrap();
        }
        let history = store.list_history(section).await.unwrap();
        assert_eq!(history[0].before_snapshot, "2");
        assert_eq!(history[2].before_snapshot, "0");
        assert_eq!(store.list_user_history(editor).await.unwrap().len(), 3);
    }
}
