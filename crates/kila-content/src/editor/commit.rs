//! Commit: converge the store on the draft with the fewest calls.
//!
//! Order of store calls within one commit:
//!
//! 1. creates, in draft order
//! 2. field updates (only blocks with at least one changed field)
//! 3. row deletes
//! 4. blob deletes (concurrent, awaited together)
//!
//! Rows go before blobs so a failed blob delete never leaves a row pointing
//! at a missing file. The sequence is not atomic: on failure the error is
//! returned, edit mode stays engaged, and a retry re-diffs against whatever
//! the store then reports. Created rows are adopted into the draft as they
//! land, and a baseline that could not be refreshed is re-listed before the
//! retry is planned, so no row is created twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use kila_types::{BlockId, BlockKey, BlockPatch, BlockType, ContentBlock, NewBlock, renumber};

use super::{BlockEditor, Draft, Mode, unreferenced};
use crate::error::{EditorError, EditorResult};
use crate::store::StoreError;

/// Drop blank blocks and renumber the rest 1..N.
pub fn normalize_draft(draft: &[ContentBlock]) -> Vec<ContentBlock> {
    let mut blocks: Vec<ContentBlock> = draft.iter().filter(|b| !b.is_blank()).cloned().collect();
    renumber(&mut blocks);
    blocks
}

/// Store calls needed to turn the persisted list into a normalized draft.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitPlan {
    /// New rows, keyed by the draft entry they came from.
    pub creates: Vec<(BlockKey, NewBlock)>,
    pub updates: Vec<(BlockId, BlockPatch)>,
    pub deletes: Vec<BlockId>,
    /// Blob URLs no longer referenced by any block.
    pub orphaned_blobs: Vec<String>,
}

impl CommitPlan {
    /// Diff a normalized draft against the persisted baseline.
    pub fn between(persisted: &[ContentBlock], draft: &[ContentBlock]) -> Self {
        let mut plan = Self::default();
        let kept: HashSet<BlockId> = draft.iter().filter_map(|b| b.key.persisted()).collect();
        let mut orphaned: Vec<String> = Vec::new();

        for block in persisted {
            if let Some(id) = block.key.persisted()
                && !kept.contains(&id)
            {
                plan.deletes.push(id);
                orphaned.extend(block.referenced_urls());
            }
        }

        for block in draft {
            let original = match block.key {
                BlockKey::Draft(_) => None,
                BlockKey::Persisted(_) => persisted.iter().find(|b| b.key == block.key),
            };
            // Draft keys, and persisted keys the baseline no longer has
            // (deleted elsewhere), are created fresh.
            let (Some(original), Some(id)) = (original, block.key.persisted()) else {
                plan.creates.push((block.key, block.to_new_block()));
                continue;
            };

            let patch = BlockPatch::between(original, block);
            if patch.is_empty() {
                continue;
            }
            if patch.content.is_some() && block.block_type == BlockType::Gallery {
                let next = block.gallery_images();
                orphaned.extend(
                    original
                        .gallery_images()
                        .into_iter()
                        .filter(|url| !next.contains(url)),
                );
            }
            if patch.image_url.is_some()
                && let Some(old) = original.image_url.as_deref().filter(|u| !u.is_empty())
            {
                orphaned.push(old.to_string());
            }
            plan.updates.push((id, patch));
        }

        // A URL moved to another block is still in use.
        plan.orphaned_blobs = unreferenced(orphaned, draft);
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.orphaned_blobs.is_empty()
    }
}

/// What a commit did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub blobs_deleted: usize,
    /// Persisted blocks before the commit.
    pub before: Vec<ContentBlock>,
    /// Persisted blocks after the commit.
    pub after: Vec<ContentBlock>,
    /// Whether the history sink saw this commit.
    pub history_recorded: bool,
}

impl CommitReport {
    /// Check if the commit issued no store mutations.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && self.blobs_deleted == 0
    }
}

/// Result of delivering a commit signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The signal value was already processed.
    Ignored,
    /// Not editing; nothing to commit, reported as success.
    Idle,
    Committed(CommitReport),
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BlockEditor {
    /// Persist the draft.
    ///
    /// A draft that was never modified persists nothing, but its normalized
    /// form still becomes the working copy. After a successful commit the
    /// editor stays in edit mode with a clean draft equal to the refreshed
    /// persisted list.
    pub async fn commit(&self) -> EditorResult<CommitReport> {
        let _guard = InFlight::acquire(&self.commit_in_flight).ok_or(EditorError::CommitInFlight)?;

        let stale = self.state.lock().stale;
        if stale {
            self.refresh_persisted().await.map_err(EditorError::Mutation)?;
        }

        let (persisted, draft, dirty) = {
            let state = self.state.lock();
            state.ensure_loaded()?;
            let Mode::Edit(draft) = &state.mode else {
                return Err(EditorError::NotEditing);
            };
            (state.persisted.clone(), draft.blocks.clone(), draft.dirty)
        };

        let normalized = normalize_draft(&draft);
        if !dirty {
            self.replace_draft(normalized, false);
            debug!(section_id = %self.section_id, "commit skipped, draft unchanged");
            return Ok(CommitReport {
                after: persisted.clone(),
                before: persisted,
                ..CommitReport::default()
            });
        }

        let plan = CommitPlan::between(&persisted, &normalized);
        self.replace_draft(normalized, true);

        let mut report = match self.execute(&plan).await {
            Ok(report) => report,
            Err(e) => {
                warn!(section_id = %self.section_id, error = %e, "commit failed partway");
                self.keep_base(&persisted);
                self.resync().await;
                return Err(EditorError::Mutation(e));
            }
        };

        let after = match self.refresh_persisted().await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(section_id = %self.section_id, error = %e, "re-list after commit failed");
                self.keep_base(&persisted);
                return Err(EditorError::Mutation(e));
            }
        };
        let base = {
            let mut state = self.state.lock();
            if let Mode::Edit(draft) = &mut state.mode {
                draft.blocks = after.clone();
                draft.dirty = false;
            }
            state.pending_base.take().unwrap_or(persisted)
        };

        info!(
            section_id = %self.section_id,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            blobs_deleted = report.blobs_deleted,
            "committed draft"
        );
        report.history_recorded = self.record_history(&base, &after).await;
        report.before = base;
        report.after = after;
        Ok(report)
    }

    /// Commit in response to a monotonically increasing signal.
    ///
    /// A value at or below the last one seen is ignored, so duplicate
    /// deliveries never commit twice.
    pub async fn commit_signal(&self, signal: u64) -> EditorResult<SignalOutcome> {
        let editing = {
            let mut state = self.state.lock();
            if signal <= state.last_signal {
                return Ok(SignalOutcome::Ignored);
            }
            state.last_signal = signal;
            matches!(state.mode, Mode::Edit(_))
        };
        if !editing {
            return Ok(SignalOutcome::Idle);
        }
        self.commit().await.map(SignalOutcome::Committed)
    }

    async fn execute(&self, plan: &CommitPlan) -> Result<CommitReport, StoreError> {
        let mut report = CommitReport::default();

        for (key, block) in &plan.creates {
            debug!(section_id = %self.section_id, %key, order_index = block.order_index, "create");
            let created = self.store.create_block(block.clone()).await?;
            self.adopt_key(*key, created.key);
            report.created += 1;
        }
        for (id, patch) in &plan.updates {
            debug!(section_id = %self.section_id, block_id = %id, ?patch, "update");
            self.store.update_block(*id, patch.clone()).await?;
            report.updated += 1;
        }
        for id in &plan.deletes {
            debug!(section_id = %self.section_id, block_id = %id, "delete");
            self.store.delete_block(*id).await?;
            report.deleted += 1;
        }
        report.blobs_deleted = self.delete_blobs(&plan.orphaned_blobs).await?;
        Ok(report)
    }

    /// Point a draft entry at its freshly created row, so a retry after a
    /// later failure updates instead of creating again.
    fn adopt_key(&self, from: BlockKey, to: BlockKey) {
        let mut state = self.state.lock();
        if let Mode::Edit(draft) = &mut state.mode
            && let Some(block) = draft.blocks.iter_mut().find(|b| b.key == from)
        {
            block.key = to;
        }
    }

    /// Remember the baseline of the first failed attempt.
    fn keep_base(&self, persisted: &[ContentBlock]) {
        self.state
            .lock()
            .pending_base
            .get_or_insert_with(|| persisted.to_vec());
    }

    fn replace_draft(&self, blocks: Vec<ContentBlock>, dirty: bool) {
        let mut state = self.state.lock();
        if let Mode::Edit(_) = state.mode {
            state.mode = Mode::Edit(Draft { blocks, dirty });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kila_types::{SectionId, serialize_gallery};

    fn persisted(section: SectionId, block_type: BlockType, order: u32) -> ContentBlock {
        let mut block = ContentBlock::draft(section, block_type, order as usize - 1, None, None);
        block.key = BlockKey::Persisted(BlockId::new());
        block.content = Some(format!("block {order}"));
        block
    }

    #[test]
    fn test_normalize_drops_blank_and_renumbers() {
        let section = SectionId::new();
        let mut heading = ContentBlock::draft(section, BlockType::Heading, 0, None, None);
        heading.content = Some("   ".into());
        let image = ContentBlock::draft(section, BlockType::Image, 1, None, None);
        let mut text = ContentBlock::draft(section, BlockType::Text, 2, None, None);
        text.content = Some("<p>Hallo</p>".into());

        let normalized = normalize_draft(&[heading, image, text.clone()]);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].key, text.key);
        assert_eq!(normalized[0].order_index, 1);
    }

    #[test]
    fn test_identical_draft_plans_nothing() {
        let section = SectionId::new();
        let blocks = vec![persisted(section, BlockType::Text, 1), persisted(section, BlockType::Heading, 2)];
        assert!(CommitPlan::between(&blocks, &blocks).is_empty());
    }

    #[test]
    fn test_plan_creates_updates_deletes() {
        let section = SectionId::new();
        let a = persisted(section, BlockType::Text, 1);
        let mut b = persisted(section, BlockType::Image, 2);
        b.image_url = Some("img-b".into());
        let c = persisted(section, BlockType::Text, 3);

        let mut fresh = ContentBlock::draft(section, BlockType::Heading, 0, None, None);
        fresh.content = Some("Neu".into());
        let mut c2 = c.clone();
        c2.width = 6;
        let mut draft = vec![fresh.clone(), a.clone(), c2];
        renumber(&mut draft);

        let plan = CommitPlan::between(&[a.clone(), b.clone(), c.clone()], &draft);
        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].0, fresh.key);
        assert_eq!(plan.creates[0].1.order_index, 1);
        assert_eq!(plan.deletes, vec![b.key.persisted().unwrap()]);
        assert_eq!(plan.orphaned_blobs, vec!["img-b".to_string()]);

        // a moved 1 -> 2; c moved 3 -> 3 but changed width.
        let a_patch = plan.updates.iter().find(|(id, _)| Some(*id) == a.key.persisted()).unwrap();
        assert_eq!(a_patch.1, BlockPatch::order(2));
        let c_patch = plan.updates.iter().find(|(id, _)| Some(*id) == c.key.persisted()).unwrap();
        assert_eq!(c_patch.1, BlockPatch::width(6));
    }

    #[test]
    fn test_gallery_shrink_orphans_removed_images() {
        let section = SectionId::new();
        let mut gallery = persisted(section, BlockType::Gallery, 1);
        gallery.content = Some(serialize_gallery(&["a".into(), "b".into(), "c".into()]));
        let mut next = gallery.clone();
        next.content = Some(serialize_gallery(&["a".into(), "c".into()]));

        let plan = CommitPlan::between(&[gallery], &[next]);
        assert_eq!(plan.updates.len(), 1);
        assert!(plan.updates[0].1.content.is_some());
        assert_eq!(plan.orphaned_blobs, vec!["b".to_string()]);
    }

    #[test]
    fn test_replaced_image_orphans_old_url_once() {
        let section = SectionId::new();
        let mut image = persisted(section, BlockType::Image, 1);
        image.image_url = Some("old".into());
        let mut next = image.clone();
        next.image_url = Some("new".into());

        let plan = CommitPlan::between(&[image], &[next]);
        assert_eq!(plan.orphaned_blobs, vec!["old".to_string()]);
    }

    #[test]
    fn test_url_still_referenced_is_kept() {
        let section = SectionId::new();
        let mut image = persisted(section, BlockType::Image, 1);
        image.image_url = Some("shared".into());
        let mut gallery = ContentBlock::draft(section, BlockType::Gallery, 0, None, None);
        gallery.content = Some(serialize_gallery(&["shared".into()]));

        let plan = CommitPlan::between(&[image], &[gallery]);
        assert_eq!(plan.deletes.len(), 1);
        assert!(plan.orphaned_blobs.is_empty());
    }

    #[test]
    fn test_in_flight_guard() {
        let flag = AtomicBool::new(false);
        let guard = InFlight::acquire(&flag).unwrap();
        assert!(InFlight::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlight::acquire(&flag).is_some());
    }
}
