//! Pointer-driven interactions: column resize and drag-reorder.
//!
//! Each interaction owns one session on the editor (not one per block). The
//! session ends on pointer release whether or not the following persist
//! call succeeds.

use kila_types::BlockKey;

use super::{BlockEditor, Mode};
use crate::error::EditorResult;

impl BlockEditor {
    // ── Resize ──────────────────────────────────────────────────────────────

    /// Press on a block's resize handle.
    pub fn resize_start(&self, key: BlockKey, start_x: f64) -> EditorResult<()> {
        let mut state = self.state.lock();
        state.ensure_loaded()?;
        let at = state.position(key)?;
        let width = state.current()[at].width;
        state.resize.begin(key, start_x, width);
        Ok(())
    }

    /// Pointer move during a resize. Returns the new live width when it
    /// changed; a container without width is ignored.
    ///
    /// While editing, the live width goes straight into the draft.
    pub fn resize_move(&self, container_width: f64, current_x: f64) -> Option<u8> {
        let mut state = self.state.lock();
        let (key, width) = state.resize.update(container_width, current_x)?;
        if let Mode::Edit(draft) = &mut state.mode
            && let Some(block) = draft.blocks.iter_mut().find(|b| b.key == key)
        {
            block.width = width;
            draft.dirty = true;
        }
        Some(width)
    }

    /// Pointer release. In view mode a changed width is persisted with one
    /// update; on failure the block keeps its old width.
    pub async fn resize_end(&self) -> EditorResult<Option<u8>> {
        let (release, editing) = {
            let mut state = self.state.lock();
            let Some(release) = state.resize.release() else {
                return Ok(None);
            };
            (release, matches!(state.mode, Mode::Edit(_)))
        };
        if editing || !release.changed() {
            return Ok(Some(release.width));
        }
        self.update_width(release.key, release.width as i64).await?;
        Ok(Some(release.width))
    }

    pub fn is_resizing(&self) -> bool {
        self.state.lock().resize.is_active()
    }

    // ── Drag-reorder ────────────────────────────────────────────────────────

    pub fn drag_start(&self, key: BlockKey) -> EditorResult<()> {
        let mut state = self.state.lock();
        state.ensure_loaded()?;
        state.position(key)?;
        state.drag.start(key);
        Ok(())
    }

    /// Drag over a drop zone at insertion index `index`.
    pub fn drag_over(&self, index: usize) {
        self.state.lock().drag.hover(index);
    }

    /// Insertion point to highlight, if a drag is hovering one.
    pub fn drop_hint(&self) -> Option<usize> {
        self.state.lock().drag.drop_hint()
    }

    /// Drag cancelled or ended outside any zone.
    pub fn drag_end(&self) {
        self.state.lock().drag.finish();
    }

    /// Drop the dragged block at insertion index `index`. Returns whether
    /// anything moved.
    pub async fn drop_at(&self, index: usize) -> EditorResult<bool> {
        let key = self.state.lock().drag.finish();
        match key {
            Some(key) => self.reorder(key, index).await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{BlockStore, MemoryStore, StoreCall};
    use kila_types::{BlockType, NewBlock, SectionId};

    async fn editor_with_text() -> (Arc<MemoryStore>, BlockEditor, BlockKey) {
        let store = Arc::new(MemoryStore::new());
        let section = SectionId::new();
        let block = store
            .create_block(NewBlock {
                section_id: section,
                block_type: BlockType::Text,
                content: Some("<p>Hallo</p>".into()),
                image_url: None,
                width: 6,
                order_index: 1,
            })
            .await
            .unwrap();
        store.clear_calls();
        let editor = BlockEditor::new(section, store.clone());
        editor.load().await.unwrap();
        (store, editor, block.key)
    }

    #[tokio::test]
    async fn test_view_resize_persists_once_on_release() {
        let (store, editor, key) = editor_with_text().await;
        editor.resize_start(key, 0.0).unwrap();
        assert_eq!(editor.resize_move(1200.0, 100.0), Some(7));
        assert_eq!(editor.resize_move(1200.0, 240.0), Some(8));
        // Live width is visible but not persisted yet.
        assert_eq!(editor.blocks()[0].width, 8);
        assert_eq!(editor.persisted()[0].width, 6);
        assert!(store.calls().is_empty());

        assert_eq!(editor.resize_end().await.unwrap(), Some(8));
        assert_eq!(store.calls().len(), 1);
        assert_eq!(editor.persisted()[0].width, 8);
        assert!(!editor.is_resizing());
    }

    #[tokio::test]
    async fn test_failed_resize_persist_still_ends_session() {
        let (store, editor, key) = editor_with_text().await;
        store.fail_when(|c| matches!(c, StoreCall::UpdateBlock(..)));
        editor.resize_start(key, 0.0).unwrap();
        editor.resize_move(1200.0, -1_000.0);
        assert!(editor.resize_end().await.is_err());
        assert!(!editor.is_resizing());
        assert_eq!(editor.blocks()[0].width, 6);
    }

    #[tokio::test]
    async fn test_edit_resize_goes_into_draft() {
        let (store, editor, key) = editor_with_text().await;
        editor.start_edit().unwrap();
        editor.resize_start(key, 0.0).unwrap();
        editor.resize_move(1200.0, 10_000.0);
        assert_eq!(editor.resize_end().await.unwrap(), Some(12));
        assert!(editor.is_dirty());
        assert_eq!(editor.blocks()[0].width, 12);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_drag_and_drop() {
        let (_store, editor, first) = editor_with_text().await;
        editor.start_edit().unwrap();
        let second = editor.insert(BlockType::Heading, 1, None, None).await.unwrap();

        editor.drag_start(second).unwrap();
        editor.drag_over(2);
        editor.drag_over(0);
        assert_eq!(editor.drop_hint(), Some(0));
        assert!(editor.drop_at(0).await.unwrap());
        assert_eq!(editor.drop_hint(), None);

        let order: Vec<_> = editor.blocks().iter().map(|b| b.key).collect();
        assert_eq!(order, vec![second, first]);

        editor.drag_start(first).unwrap();
        editor.drag_end();
        assert!(!editor.drop_at(0).await.unwrap());
    }
}
