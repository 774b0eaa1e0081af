//! Revision history: recording snapshots and rendering them as diffs.
//!
//! The editor hands before/after block lists to a [`HistorySink`]. The
//! section-level [`SectionHistoryRecorder`] pairs them with the section title,
//! renders canonical snapshots, and appends an entry only when the two
//! snapshots differ. Write failures are logged and dropped: history never
//! blocks or rolls back the change it describes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use kila_types::{
    ContentBlock, NewHistoryEntry, Principal, SectionHistoryEntry, SectionId, UserId,
    section_snapshot,
};

use crate::diff::{DiffLine, LineKind, diff_lines, render};
use crate::error::{EditorError, EditorResult};
use crate::store::SectionStore;

/// Receives the persisted state around every persisted change.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, before: &[ContentBlock], after: &[ContentBlock]);
}

/// Writes section history entries for one editor in one section.
pub struct SectionHistoryRecorder {
    store: Arc<dyn SectionStore>,
    section_id: SectionId,
    editor_id: UserId,
    editor_name: String,
    /// Title before and after the change being recorded.
    titles: Mutex<(String, String)>,
}

impl SectionHistoryRecorder {
    pub fn new(
        store: Arc<dyn SectionStore>,
        section_id: SectionId,
        editor: &Principal,
        title: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            store,
            section_id,
            editor_id: editor.id,
            editor_name: editor.name.clone(),
            titles: Mutex::new((title.clone(), title)),
        }
    }

    /// Titles to pair with the next recorded block change.
    pub fn set_titles(&self, before: impl Into<String>, after: impl Into<String>) {
        *self.titles.lock() = (before.into(), after.into());
    }

    /// Settle on one title once a title change has been recorded.
    pub fn settle_title(&self, title: impl Into<String>) {
        let title = title.into();
        *self.titles.lock() = (title.clone(), title);
    }

    /// Append an entry if the two states serialize differently.
    ///
    /// Returns the stored entry, or `None` when nothing changed or the write
    /// failed.
    pub async fn record_states(
        &self,
        before_title: &str,
        before: &[ContentBlock],
        after_title: &str,
        after: &[ContentBlock],
    ) -> Option<SectionHistoryEntry> {
        let snapshots = section_snapshot(before_title, before)
            .and_then(|b| section_snapshot(after_title, after).map(|a| (b, a)));
        let (before_snapshot, after_snapshot) = match snapshots {
            Ok(pair) => pair,
            Err(e) => {
                warn!(section_id = %self.section_id, error = %e, "snapshot failed, history skipped");
                return None;
            }
        };
        if before_snapshot == after_snapshot {
            debug!(section_id = %self.section_id, "no observable change, history skipped");
            return None;
        }

        let entry = NewHistoryEntry {
            section_id: self.section_id,
            editor_id: self.editor_id,
            editor_name: self.editor_name.clone(),
            before_snapshot,
            after_snapshot,
        };
        match self.store.create_history(entry).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(section_id = %self.section_id, error = %e, "history write failed");
                None
            }
        }
    }
}

#[async_trait]
impl HistorySink for SectionHistoryRecorder {
    async fn record(&self, before: &[ContentBlock], after: &[ContentBlock]) {
        let (before_title, after_title) = self.titles.lock().clone();
        self.record_states(&before_title, before, &after_title, after)
            .await;
    }
}

// ============================================================================
// Views
// ============================================================================

/// One history entry with its line diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryView {
    pub entry: SectionHistoryEntry,
    pub lines: Vec<DiffLine>,
}

impl HistoryView {
    pub fn new(entry: SectionHistoryEntry) -> Self {
        let lines = diff_lines(&entry.before_snapshot, &entry.after_snapshot);
        Self { entry, lines }
    }

    pub fn added(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == LineKind::Add).count()
    }

    pub fn removed(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == LineKind::Remove).count()
    }

    /// Diff rendered with `+`/`-`/` ` prefixes.
    pub fn render(&self) -> String {
        render(&self.lines)
    }

    /// Only the changed lines, for compact listings.
    pub fn changes(&self) -> impl Iterator<Item = &DiffLine> {
        self.lines.iter().filter(|l| l.kind != LineKind::Same)
    }
}

/// History of one section, newest first.
pub async fn section_history(
    store: &dyn SectionStore,
    section_id: SectionId,
) -> EditorResult<Vec<HistoryView>> {
    let entries = store
        .list_history(section_id)
        .await
        .map_err(EditorError::LoadFailed)?;
    Ok(entries.into_iter().map(HistoryView::new).collect())
}

/// Everything one user changed, across sections, newest first.
pub async fn user_history(store: &dyn SectionStore, editor_id: UserId) -> EditorResult<Vec<HistoryView>> {
    let entries = store
        .list_user_history(editor_id)
        .await
        .map_err(EditorError::LoadFailed)?;
    Ok(entries.into_iter().map(HistoryView::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreCall};
    use kila_types::{BlockType, UserRole};

    fn recorder(store: Arc<MemoryStore>) -> SectionHistoryRecorder {
        let editor = Principal::new("Mia", UserRole::Leitung);
        SectionHistoryRecorder::new(store, SectionId::new(), &editor, "A")
    }

    fn text(content: &str) -> ContentBlock {
        let mut block = ContentBlock::draft(SectionId::new(), BlockType::Text, 0, None, None);
        block.content = Some(content.into());
        block
    }

    #[tokio::test]
    async fn test_identical_states_write_nothing() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(store.clone());
        let blocks = vec![text("x")];
        recorder.record(&blocks, &blocks).await;
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_title_change_alone_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(store.clone());
        recorder.set_titles("A", "B");
        recorder.record(&[], &[]).await;

        let written = store.calls_matching(|c| matches!(c, StoreCall::CreateHistory(_)));
        assert_eq!(written.len(), 1);
        let StoreCall::CreateHistory(entry) = &written[0] else { unreachable!() };
        assert!(entry.before_snapshot.contains("\"title\": \"A\""));
        assert!(entry.after_snapshot.contains("\"title\": \"B\""));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_when(|c| matches!(c, StoreCall::CreateHistory(_)));
        let recorder = recorder(store.clone());
        let stored = recorder
            .record_states("A", &[], "A", &[text("neu")])
            .await;
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_views_render_diff() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(store.clone());
        let stored = recorder
            .record_states("A", &[text("alt")], "A", &[text("neu")])
            .await
            .unwrap();

        let views = section_history(store.as_ref(), stored.section_id).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].added(), 1);
        assert_eq!(views[0].removed(), 1);
        let rendered = views[0].render();
        assert!(rendered.contains("-       \"content\": \"alt\","));
        assert!(rendered.contains("+       \"content\": \"neu\","));

        let mine = user_history(store.as_ref(), stored.editor_id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].changes().count(), 2);
    }
}
