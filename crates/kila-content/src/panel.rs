//! Section panel: one section's editing surface.
//!
//! Ties a [`ContentSection`] to its [`BlockEditor`] and history recorder and
//! adds the section-level pieces: title and metadata drafts, permissions,
//! editor assignment, and cascading delete.
//!
//! Committing an edit updates the section row first (only changed fields),
//! then fires the block editor's commit signal, then leaves edit mode.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use kila_types::{
    ContentSection, NewSection, Principal, SectionMeta, SectionPatch, UserId,
};

use crate::editor::{BlockEditor, CommitReport, SignalOutcome};
use crate::error::{EditorError, EditorResult};
use crate::history::{HistoryView, SectionHistoryRecorder, section_history};
use crate::layout::{InsertPolicy, Layout, plan};
use crate::store::{ContentStore, SectionStore};

/// A store that serves both blocks and sections.
pub trait SiteStore: ContentStore + SectionStore {}

impl<T: ContentStore + SectionStore + ?Sized> SiteStore for T {}

/// Title and metadata being edited alongside the blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionDraft {
    pub title: String,
    pub meta: SectionMeta,
    /// Title when the edit started. History pairs it with the committed
    /// title, even if an earlier attempt already saved the new one.
    pub base_title: String,
}

/// What committing an edit did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitEditReport {
    /// The section row received a partial update.
    pub section_updated: bool,
    /// Block commit outcome; `None` when the signal was not acted on.
    pub blocks: Option<CommitReport>,
}

/// Editing surface for one section.
pub struct SectionPanel {
    sections: Arc<dyn SectionStore>,
    content: Arc<dyn ContentStore>,
    principal: Principal,
    section: Mutex<ContentSection>,
    draft: Mutex<Option<SectionDraft>>,
    editor: BlockEditor,
    recorder: Arc<SectionHistoryRecorder>,
    commit_signal: AtomicU64,
    policy: InsertPolicy,
}

impl SectionPanel {
    /// Open a panel and load the section's blocks.
    ///
    /// A load failure does not prevent opening; it stays visible through
    /// [`SectionPanel::load_error`] until [`SectionPanel::reload`] succeeds.
    pub async fn open<S>(store: Arc<S>, principal: Principal, section: ContentSection) -> Self
    where
        S: SiteStore + 'static,
    {
        let sections: Arc<dyn SectionStore> = store.clone();
        let content: Arc<dyn ContentStore> = store;
        let recorder = Arc::new(SectionHistoryRecorder::new(
            sections.clone(),
            section.id,
            &principal,
            section.title.clone(),
        ));
        let editor = BlockEditor::new(section.id, content.clone()).with_history(recorder.clone());
        // The error is kept on the editor.
        let _ = editor.load().await;
        Self {
            sections,
            content,
            principal,
            section: Mutex::new(section),
            draft: Mutex::new(None),
            editor,
            recorder,
            commit_signal: AtomicU64::new(0),
            policy: InsertPolicy::default(),
        }
    }

    /// Use a different insert policy for inline slots.
    pub fn with_policy(mut self, policy: InsertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn section(&self) -> ContentSection {
        self.section.lock().clone()
    }

    pub fn editor(&self) -> &BlockEditor {
        &self.editor
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn load_error(&self) -> Option<String> {
        self.editor.load_error()
    }

    pub async fn reload(&self) -> EditorResult<()> {
        self.editor.load().await
    }

    pub fn can_edit(&self) -> bool {
        self.principal.can_edit(&self.section.lock())
    }

    pub fn can_delete(&self) -> bool {
        self.principal.can_delete(&self.section.lock())
    }

    pub fn is_editing(&self) -> bool {
        self.draft.lock().is_some()
    }

    /// Title/metadata draft, while editing.
    pub fn draft(&self) -> Option<SectionDraft> {
        self.draft.lock().clone()
    }

    /// Rows and inline insert slots for the blocks currently shown.
    pub fn layout(&self) -> Layout {
        plan(&self.editor.blocks(), self.is_editing(), &self.policy)
    }

    // ── Edit session ────────────────────────────────────────────────────────

    pub fn start_edit(&self) -> EditorResult<()> {
        if !self.can_edit() {
            return Err(EditorError::permission_denied(format!(
                "{} may not edit this section",
                self.principal.name
            )));
        }
        self.editor.start_edit()?;
        let section = self.section.lock();
        self.draft.lock().get_or_insert_with(|| SectionDraft {
            title: section.title.clone(),
            meta: section.meta(),
            base_title: section.title.clone(),
        });
        Ok(())
    }

    pub fn set_title(&self, title: impl Into<String>) -> EditorResult<()> {
        let mut draft = self.draft.lock();
        let draft = draft.as_mut().ok_or(EditorError::NotEditing)?;
        draft.title = title.into();
        Ok(())
    }

    pub fn set_meta(&self, meta: SectionMeta) -> EditorResult<()> {
        let mut draft = self.draft.lock();
        let draft = draft.as_mut().ok_or(EditorError::NotEditing)?;
        draft.meta = meta;
        Ok(())
    }

    /// Commit title, metadata, and blocks together, then leave edit mode.
    ///
    /// A blank title is rejected before anything is sent. On a block commit
    /// failure edit mode stays engaged for a retry.
    pub async fn commit_edit(&self) -> EditorResult<CommitEditReport> {
        let draft = self.draft().ok_or(EditorError::NotEditing)?;
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(EditorError::EmptyTitle);
        }

        let original = self.section();
        let patch = SectionPatch::between(&original, &title, &draft.meta);
        let section_updated = !patch.is_empty();
        if section_updated {
            let updated = self
                .sections
                .update_section(original.id, patch)
                .await
                .map_err(EditorError::Mutation)?;
            *self.section.lock() = updated;
        }

        self.recorder.set_titles(draft.base_title.clone(), title.clone());
        let signal = self.commit_signal.fetch_add(1, Ordering::AcqRel) + 1;
        let outcome = self.editor.commit_signal(signal).await;
        // Later block changes pair with the new title on both sides.
        self.recorder.settle_title(title.clone());

        let blocks = match outcome? {
            SignalOutcome::Committed(report) => Some(report),
            SignalOutcome::Idle | SignalOutcome::Ignored => None,
        };

        // The block commit only reports history when blocks were dirty; a
        // title change on its own still deserves an entry.
        let recorded = blocks.as_ref().is_some_and(|r| r.history_recorded);
        if !recorded && draft.base_title != title {
            let persisted = self.editor.persisted();
            self.recorder
                .record_states(&draft.base_title, &persisted, &title, &persisted)
                .await;
        }

        self.editor.exit_edit();
        *self.draft.lock() = None;
        info!(section_id = %original.id, section_updated, "section edit committed");
        Ok(CommitEditReport {
            section_updated,
            blocks,
        })
    }

    /// Drop the drafts without touching the store.
    pub fn cancel_edit(&self) -> bool {
        *self.draft.lock() = None;
        self.editor.exit_edit()
    }

    // ── Administration ──────────────────────────────────────────────────────

    /// Replace the set of extra editors. Admin only; the owner is never
    /// stored as an extra editor.
    pub async fn assign_editors(&self, editor_ids: Vec<UserId>) -> EditorResult<ContentSection> {
        if !self.principal.can_assign_editors() {
            return Err(EditorError::permission_denied("only admins may assign editors"));
        }
        let section = self.section();
        let mut ids: Vec<UserId> = Vec::with_capacity(editor_ids.len());
        for id in editor_ids {
            if id != section.owner_id && !ids.contains(&id) {
                ids.push(id);
            }
        }
        let patch = SectionPatch {
            editor_ids: Some(ids),
            ..SectionPatch::default()
        };
        let updated = self
            .sections
            .update_section(section.id, patch)
            .await
            .map_err(EditorError::Mutation)?;
        *self.section.lock() = updated.clone();
        Ok(updated)
    }

    /// Candidates an admin may pick as extra editors (everyone but the owner).
    pub fn assignable<'a>(&self, candidates: &'a [Principal]) -> Vec<&'a Principal> {
        let owner = self.section.lock().owner_id;
        candidates.iter().filter(|p| p.id != owner).collect()
    }

    /// Delete the section: block rows first, then the section row, then every
    /// blob the blocks referenced.
    pub async fn delete(&self) -> EditorResult<()> {
        if !self.can_delete() {
            return Err(EditorError::permission_denied(format!(
                "{} may not delete this section",
                self.principal.name
            )));
        }
        let section_id = self.section.lock().id;
        let blocks = self
            .content
            .list_blocks(section_id)
            .await
            .map_err(EditorError::LoadFailed)?;

        for block in &blocks {
            if let Some(id) = block.key.persisted() {
                self.content
                    .delete_block(id)
                    .await
                    .map_err(EditorError::Mutation)?;
            }
        }
        self.sections
            .delete_section(section_id)
            .await
            .map_err(EditorError::Mutation)?;

        let urls: Vec<String> = blocks.iter().flat_map(|b| b.referenced_urls()).collect();
        let results =
            futures::future::join_all(urls.iter().map(|url| self.content.delete_blob(url))).await;
        for (url, result) in urls.iter().zip(results) {
            if let Err(e) = result {
                warn!(%section_id, url, error = %e, "blob cleanup after section delete failed");
            }
        }
        self.editor.exit_edit();
        *self.draft.lock() = None;
        info!(%section_id, blocks = blocks.len(), "section deleted");
        Ok(())
    }

    /// This section's history, newest first.
    pub async fn history(&self) -> EditorResult<Vec<HistoryView>> {
        section_history(self.sections.as_ref(), self.section.lock().id).await
    }
}

// ── Page-level operations ──────────────────────────────────────────────────

/// Sections of a page region, oldest first.
pub async fn list_sections(
    store: &dyn SectionStore,
    page_section_id: &str,
) -> EditorResult<Vec<ContentSection>> {
    store
        .list_sections(page_section_id)
        .await
        .map_err(EditorError::LoadFailed)
}

/// Create a section owned by `principal`. Staff only.
pub async fn create_section(
    store: &dyn SectionStore,
    principal: &Principal,
    page_section_id: &str,
    title: &str,
) -> EditorResult<ContentSection> {
    if !principal.can_create_sections() {
        return Err(EditorError::permission_denied(format!(
            "{} may not create sections",
            principal.name
        )));
    }
    let title = title.trim();
    if title.is_empty() {
        return Err(EditorError::EmptyTitle);
    }
    store
        .create_section(NewSection {
            page_section_id: page_section_id.to_string(),
            title: title.to_string(),
            owner_id: principal.id,
            owner_name: principal.name.clone(),
        })
        .await
        .map_err(EditorError::Mutation)
}
