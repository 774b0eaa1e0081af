//! Draft editing engine for one section's blocks.
//!
//! The editor is a two-mode state machine:
//!
//! - **View**: every mutation goes straight to the store and the in-memory
//!   mirror is replaced with the store's response.
//! - **Edit**: mutations touch only a local draft; nothing is persisted until
//!   [`BlockEditor::commit`] diffs the draft against the persisted baseline.
//!
//! [`BlockEditor::blocks`] is the single accessor for "what is on screen",
//! resolving to the draft or the persisted list depending on mode.
//!
//! All methods take `&self`. State sits behind a mutex that is never held
//! across an await; a commit guard rejects re-entrant commits.

mod commit;
mod media;
mod pointer;

pub use commit::{CommitPlan, CommitReport, SignalOutcome, normalize_draft};

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

use kila_types::{
    BlockKey, BlockPatch, BlockType, ContentBlock, SectionId, clamp_width, renumber,
};

use crate::error::{EditorError, EditorResult};
use crate::history::HistorySink;
use crate::reorder::{DragTracker, apply_move, plan_move};
use crate::resize::ResizeTracker;
use crate::store::{ContentStore, StoreError};

/// Working copy of a section's blocks during an edit session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    pub blocks: Vec<ContentBlock>,
    /// Set by every draft mutation; cleared by a successful commit.
    pub dirty: bool,
}

/// Editor mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    View,
    Edit(Draft),
}

struct EditorState {
    persisted: Vec<ContentBlock>,
    /// `persisted` missed a refresh after store calls went through; the next
    /// commit re-lists before planning.
    stale: bool,
    /// Baseline from before the first failed commit attempt, so the commit
    /// that finally succeeds records the whole change.
    pending_base: Option<Vec<ContentBlock>>,
    mode: Mode,
    load_error: Option<String>,
    /// Highest commit signal already processed.
    last_signal: u64,
    resize: ResizeTracker,
    drag: DragTracker,
}

impl EditorState {
    fn current(&self) -> &[ContentBlock] {
        match &self.mode {
            Mode::View => &self.persisted,
            Mode::Edit(draft) => &draft.blocks,
        }
    }

    fn ensure_loaded(&self) -> EditorResult<()> {
        match self.load_error {
            Some(_) => Err(EditorError::Unloaded),
            None => Ok(()),
        }
    }

    fn position(&self, key: BlockKey) -> EditorResult<usize> {
        self.current()
            .iter()
            .position(|b| b.key == key)
            .ok_or(EditorError::BlockNotFound(key))
    }
}

/// Editor for the blocks of one section.
pub struct BlockEditor {
    section_id: SectionId,
    store: Arc<dyn ContentStore>,
    history: Option<Arc<dyn HistorySink>>,
    state: Mutex<EditorState>,
    commit_in_flight: AtomicBool,
}

impl BlockEditor {
    /// Create an editor with an empty, not yet loaded block list.
    pub fn new(section_id: SectionId, store: Arc<dyn ContentStore>) -> Self {
        Self {
            section_id,
            store,
            history: None,
            state: Mutex::new(EditorState {
                persisted: Vec::new(),
                stale: false,
                pending_base: None,
                mode: Mode::View,
                load_error: None,
                last_signal: 0,
                resize: ResizeTracker::new(),
                drag: DragTracker::new(),
            }),
            commit_in_flight: AtomicBool::new(false),
        }
    }

    /// Send before/after block lists of every persisted change to `sink`.
    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn section_id(&self) -> SectionId {
        self.section_id
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Load (or reload) the persisted blocks.
    ///
    /// A failure is remembered and blocks every mutation until a later load
    /// succeeds. An active draft is left alone.
    pub async fn load(&self) -> EditorResult<()> {
        match self.store.list_blocks(self.section_id).await {
            Ok(blocks) => {
                let mut state = self.state.lock();
                state.persisted = blocks;
                state.stale = false;
                state.load_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(section_id = %self.section_id, error = %e, "failed to load blocks");
                self.state.lock().load_error = Some(e.to_string());
                Err(EditorError::LoadFailed(e))
            }
        }
    }

    /// Message of the last failed load, if it has not been cleared.
    pub fn load_error(&self) -> Option<String> {
        self.state.lock().load_error.clone()
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Blocks as currently shown: the draft while editing, otherwise the
    /// persisted list with any live resize applied.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        let state = self.state.lock();
        let mut blocks = state.current().to_vec();
        if state.mode == Mode::View
            && let Some(session) = state.resize.active()
            && let Some(block) = blocks.iter_mut().find(|b| b.key == session.key)
        {
            block.width = session.live_width;
        }
        blocks
    }

    /// Last known persisted blocks.
    pub fn persisted(&self) -> Vec<ContentBlock> {
        self.state.lock().persisted.clone()
    }

    pub fn block(&self, key: BlockKey) -> Option<ContentBlock> {
        let state = self.state.lock();
        state.current().iter().find(|b| b.key == key).cloned()
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().mode.clone()
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state.lock().mode, Mode::Edit(_))
    }

    pub fn is_dirty(&self) -> bool {
        matches!(&self.state.lock().mode, Mode::Edit(draft) if draft.dirty)
    }

    // ── Mode transitions ────────────────────────────────────────────────────

    /// Enter edit mode with a clean copy of the persisted blocks.
    ///
    /// Calling this while already editing keeps the existing draft.
    pub fn start_edit(&self) -> EditorResult<()> {
        let mut state = self.state.lock();
        state.ensure_loaded()?;
        if let Mode::View = state.mode {
            state.mode = Mode::Edit(Draft {
                blocks: state.persisted.clone(),
                dirty: false,
            });
            debug!(section_id = %self.section_id, "edit started");
        }
        Ok(())
    }

    /// Leave edit mode, dropping the draft. Returns whether it had unsaved
    /// changes. The store is never touched.
    pub fn exit_edit(&self) -> bool {
        let mut state = self.state.lock();
        state.pending_base = None;
        match std::mem::replace(&mut state.mode, Mode::View) {
            Mode::Edit(draft) => draft.dirty,
            Mode::View => false,
        }
    }

    // ── Block operations ────────────────────────────────────────────────────

    /// Insert a new block of `block_type` at `index`.
    ///
    /// Image blocks carry `image_url`; the width defaults per type and is
    /// clamped into range.
    pub async fn insert(
        &self,
        block_type: BlockType,
        index: usize,
        image_url: Option<String>,
        width: Option<u8>,
    ) -> EditorResult<BlockKey> {
        let block = ContentBlock::draft(self.section_id, block_type, index, image_url, width);
        self.insert_block(block, index).await
    }

    pub(crate) async fn insert_block(
        &self,
        mut block: ContentBlock,
        index: usize,
    ) -> EditorResult<BlockKey> {
        let before = {
            let mut state = self.state.lock();
            state.ensure_loaded()?;
            if let Mode::Edit(draft) = &mut state.mode {
                let key = block.key;
                let at = index.min(draft.blocks.len());
                draft.blocks.insert(at, block);
                renumber(&mut draft.blocks);
                draft.dirty = true;
                return Ok(key);
            }
            state.persisted.clone()
        };

        let at = index.min(before.len());
        block.order_index = at as u32 + 1;
        debug!(section_id = %self.section_id, block_type = %block.block_type, at, "creating block");
        let created = self
            .store
            .create_block(block.to_new_block())
            .await
            .map_err(EditorError::Mutation)?;
        let key = created.key;

        let mut after = before.clone();
        after.insert(at, created);
        renumber(&mut after);
        self.persist_view_change(before, after).await?;
        Ok(key)
    }

    /// Replace a block's text payload.
    pub async fn update_content(&self, key: BlockKey, content: impl Into<String>) -> EditorResult<()> {
        let content = content.into();
        self.mutate_block(key, move |block| block.content = Some(content))
            .await
    }

    /// Set a block's width, clamped into `[MIN_WIDTH, MAX_WIDTH]`.
    pub async fn update_width(&self, key: BlockKey, width: i64) -> EditorResult<()> {
        let width = clamp_width(width);
        self.mutate_block(key, move |block| block.width = width).await
    }

    /// Point an image block at a new URL. The old blob is cleaned up (now in
    /// view mode, at commit in edit mode).
    pub async fn replace_image(&self, key: BlockKey, url: impl Into<String>) -> EditorResult<()> {
        let url = url.into();
        self.mutate_block(key, move |block| block.image_url = Some(url))
            .await
    }

    /// Set the label and target URL of a link or file block.
    pub async fn update_link(
        &self,
        key: BlockKey,
        label: impl Into<String>,
        url: impl Into<String>,
    ) -> EditorResult<()> {
        let (label, url) = (label.into(), url.into());
        self.mutate_block(key, move |block| {
            block.content = Some(label);
            block.image_url = Some(url);
        })
        .await
    }

    /// Remove a block. In view mode its blobs are deleted after the row.
    pub async fn delete(&self, key: BlockKey) -> EditorResult<()> {
        let (before, removed) = {
            let mut state = self.state.lock();
            state.ensure_loaded()?;
            let at = state.position(key)?;
            if let Mode::Edit(draft) = &mut state.mode {
                draft.blocks.remove(at);
                renumber(&mut draft.blocks);
                draft.dirty = true;
                return Ok(());
            }
            (state.persisted.clone(), state.persisted[at].clone())
        };

        let id = removed.key.persisted().ok_or(EditorError::BlockNotFound(key))?;
        debug!(section_id = %self.section_id, block_id = %id, "deleting block");
        self.store
            .delete_block(id)
            .await
            .map_err(EditorError::Mutation)?;

        let mut after: Vec<ContentBlock> =
            before.iter().filter(|b| b.key != key).cloned().collect();
        renumber(&mut after);
        let orphaned = unreferenced(removed.referenced_urls(), &after);
        let result = self.persist_view_change(before, after).await;
        self.delete_blobs_best_effort(&orphaned).await;
        result
    }

    /// Move a block so it lands before the block currently at `to_index`
    /// (`len` means the end). Returns `false` for drops that move nothing.
    pub async fn reorder(&self, key: BlockKey, to_index: usize) -> EditorResult<bool> {
        let (before, from) = {
            let mut state = self.state.lock();
            state.ensure_loaded()?;
            let from = state.position(key)?;
            if plan_move(state.current().len(), from, to_index).is_none() {
                return Ok(false);
            }
            if let Mode::Edit(draft) = &mut state.mode {
                apply_move(&mut draft.blocks, from, to_index);
                renumber(&mut draft.blocks);
                draft.dirty = true;
                return Ok(true);
            }
            (state.persisted.clone(), from)
        };

        let mut after = before.clone();
        apply_move(&mut after, from, to_index);
        renumber(&mut after);
        self.persist_view_change(before, after).await?;
        Ok(true)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    /// Apply `f` to one block: to the draft while editing, otherwise as a
    /// minimal store update followed by cleanup of blobs the block stopped
    /// referencing.
    pub(crate) async fn mutate_block<F>(&self, key: BlockKey, f: F) -> EditorResult<()>
    where
        F: FnOnce(&mut ContentBlock) + Send,
    {
        let (before, original) = {
            let mut state = self.state.lock();
            state.ensure_loaded()?;
            let at = state.position(key)?;
            if let Mode::Edit(draft) = &mut state.mode {
                f(&mut draft.blocks[at]);
                draft.dirty = true;
                return Ok(());
            }
            (state.persisted.clone(), state.persisted[at].clone())
        };

        let mut next = original.clone();
        f(&mut next);
        let patch = BlockPatch::between(&original, &next);
        if patch.is_empty() {
            return Ok(());
        }
        let id = original.key.persisted().ok_or(EditorError::BlockNotFound(key))?;
        debug!(section_id = %self.section_id, block_id = %id, ?patch, "updating block");
        let updated = self
            .store
            .update_block(id, patch)
            .await
            .map_err(EditorError::Mutation)?;

        let after: Vec<ContentBlock> = before
            .iter()
            .map(|b| if b.key == key { updated.clone() } else { b.clone() })
            .collect();
        let orphaned = unreferenced(original.referenced_urls(), &after);
        self.state.lock().persisted = after.clone();
        self.delete_blobs_best_effort(&orphaned).await;
        self.record_history(&before, &after).await;
        Ok(())
    }

    /// Persist the order changes between two view-mode lists, adopt `after`
    /// as the persisted list, and record history.
    async fn persist_view_change(
        &self,
        before: Vec<ContentBlock>,
        mut after: Vec<ContentBlock>,
    ) -> EditorResult<()> {
        if let Err(e) = self.persist_order(&before, &mut after).await {
            self.resync().await;
            return Err(EditorError::Mutation(e));
        }
        self.state.lock().persisted = after.clone();
        self.record_history(&before, &after).await;
        Ok(())
    }

    /// Send order updates only for blocks whose index actually changed.
    async fn persist_order(
        &self,
        before: &[ContentBlock],
        after: &mut [ContentBlock],
    ) -> Result<usize, StoreError> {
        let mut updated = 0;
        for block in after.iter_mut() {
            let Some(id) = block.key.persisted() else {
                continue;
            };
            let moved = before
                .iter()
                .find(|b| b.key == block.key)
                .is_some_and(|b| b.order_index != block.order_index);
            if !moved {
                continue;
            }
            debug!(block_id = %id, order_index = block.order_index, "persisting order");
            *block = self
                .store
                .update_block(id, BlockPatch::order(block.order_index))
                .await?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Replace the persisted list with the store's. On failure the list is
    /// marked stale.
    async fn refresh_persisted(&self) -> Result<Vec<ContentBlock>, StoreError> {
        match self.store.list_blocks(self.section_id).await {
            Ok(blocks) => {
                let mut state = self.state.lock();
                state.persisted = blocks.clone();
                state.stale = false;
                Ok(blocks)
            }
            Err(e) => {
                self.state.lock().stale = true;
                Err(e)
            }
        }
    }

    /// Re-read the persisted list after a partial failure.
    async fn resync(&self) {
        if let Err(e) = self.refresh_persisted().await {
            warn!(section_id = %self.section_id, error = %e, "resync after failure failed");
        }
    }

    /// Delete blobs concurrently; waits for all, then reports the first error.
    async fn delete_blobs(&self, urls: &[String]) -> Result<usize, StoreError> {
        let results = join_all(urls.iter().map(|url| self.store.delete_blob(url))).await;
        let mut deleted = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    async fn delete_blobs_best_effort(&self, urls: &[String]) {
        if urls.is_empty() {
            return;
        }
        if let Err(e) = self.delete_blobs(urls).await {
            warn!(section_id = %self.section_id, error = %e, "blob cleanup failed");
        }
    }

    async fn record_history(&self, before: &[ContentBlock], after: &[ContentBlock]) -> bool {
        match &self.history {
            Some(sink) => {
                sink.record(before, after).await;
                true
            }
            None => false,
        }
    }
}

/// The subset of `urls` that no block in `remaining` references.
pub(crate) fn unreferenced(urls: Vec<String>, remaining: &[ContentBlock]) -> Vec<String> {
    let in_use: HashSet<String> = remaining.iter().flat_map(|b| b.referenced_urls()).collect();
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| !in_use.contains(url) && seen.insert(url.clone()))
        .collect()
}
