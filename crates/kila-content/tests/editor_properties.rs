//! Behavioral properties of the block editor, driven through the public API
//! against the in-memory store.
//!
//! # Coverage
//!
//! - Order and width invariants under arbitrary operation sequences
//! - Row packing of the reference widths
//! - Diff idempotence and reconstruction over random line sets
//! - Commit: empty-block pruning, no-op commits, gallery garbage collection,
//!   duplicate signals, re-entrant commits, retry after partial failure
//! - Insert/reorder scenario and history suppression on an unchanged title

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kila_content::diff::{self, LineKind};
use kila_content::editor::{BlockEditor, SignalOutcome};
use kila_content::layout::pack_widths;
use kila_content::store::{BlockStore, MemoryStore, StoreCall, Upload};
use kila_content::{EditorError, SectionPanel, create_section};
use kila_types::{
    BlockKey, BlockType, ContentBlock, MAX_WIDTH, MIN_WIDTH, NewBlock, Principal, SectionId,
    UserRole, is_densely_ordered,
};

// ============================================================================
// Shared test setup
// ============================================================================

async fn seeded(blocks: &[(BlockType, &str)]) -> (Arc<MemoryStore>, BlockEditor, Vec<BlockKey>) {
    let store = Arc::new(MemoryStore::new());
    let section = SectionId::new();
    let mut keys = Vec::new();
    for (i, (block_type, content)) in blocks.iter().enumerate() {
        let created = store
            .create_block(NewBlock {
                section_id: section,
                block_type: *block_type,
                content: Some(content.to_string()),
                image_url: None,
                width: block_type.default_width(),
                order_index: i as u32 + 1,
            })
            .await
            .unwrap();
        keys.push(created.key);
    }
    store.clear_calls();
    let editor = BlockEditor::new(section, store.clone());
    editor.load().await.unwrap();
    (store, editor, keys)
}

fn orders(blocks: &[ContentBlock]) -> Vec<u32> {
    blocks.iter().map(|b| b.order_index).collect()
}

fn types(blocks: &[ContentBlock]) -> Vec<BlockType> {
    blocks.iter().map(|b| b.block_type).collect()
}

fn count(store: &MemoryStore, pred: impl Fn(&StoreCall) -> bool) -> usize {
    store.calls_matching(pred).len()
}

fn content_mutations(store: &MemoryStore) -> usize {
    count(store, StoreCall::is_content_mutation)
}

fn png(name: &str) -> Upload {
    Upload::new(name, b"\x89PNG".to_vec())
}

// ============================================================================
// Invariants
// ============================================================================

async fn random_ops(editor: &BlockEditor, rng: &mut StdRng, steps: usize) {
    for step in 0..steps {
        let blocks = editor.blocks();
        let len = blocks.len();
        match rng.gen_range(0..3) {
            0 => {
                let at = rng.gen_range(0..=len);
                let key = editor.insert(BlockType::Text, at, None, None).await.unwrap();
                editor.update_content(key, format!("step {step}")).await.unwrap();
            }
            1 if len > 0 => {
                let victim = blocks[rng.gen_range(0..len)].key;
                editor.delete(victim).await.unwrap();
            }
            _ if len > 0 => {
                let moved = blocks[rng.gen_range(0..len)].key;
                editor.reorder(moved, rng.gen_range(0..=len)).await.unwrap();
            }
            _ => {}
        }
        assert!(
            is_densely_ordered(&editor.blocks()),
            "gap after step {step}: {:?}",
            orders(&editor.blocks())
        );
    }
}

#[tokio::test]
async fn order_stays_dense_in_edit_mode() {
    let (store, editor, _) = seeded(&[(BlockType::Heading, "Titel"), (BlockType::Text, "a")]).await;
    let mut rng = StdRng::seed_from_u64(7);
    editor.start_edit().unwrap();
    random_ops(&editor, &mut rng, 200).await;

    editor.commit().await.unwrap();
    let persisted = store.list_blocks(editor.section_id()).await.unwrap();
    assert!(is_densely_ordered(&persisted));
    assert_eq!(persisted.len(), editor.blocks().len());
}

#[tokio::test]
async fn order_stays_dense_in_view_mode() {
    let (store, editor, _) = seeded(&[(BlockType::Text, "a"), (BlockType::Text, "b")]).await;
    let mut rng = StdRng::seed_from_u64(11);
    random_ops(&editor, &mut rng, 60).await;

    let persisted = store.list_blocks(editor.section_id()).await.unwrap();
    assert!(is_densely_ordered(&persisted));
    assert_eq!(persisted, editor.persisted());
}

#[tokio::test]
async fn width_is_clamped_at_both_ends() {
    let (_store, editor, keys) = seeded(&[(BlockType::Text, "a")]).await;
    for (input, expected) in [(-50, MIN_WIDTH), (0, MIN_WIDTH), (7, 7), (999, MAX_WIDTH)] {
        editor.update_width(keys[0], input).await.unwrap();
        assert_eq!(editor.blocks()[0].width, expected);
    }

    editor.start_edit().unwrap();
    editor.resize_start(keys[0], 600.0).unwrap();
    for x in [-1.0e12, -300.0, 0.0, 600.0, 900.0, 1.0e12] {
        editor.resize_move(1200.0, x);
        let width = editor.blocks()[0].width;
        assert!((MIN_WIDTH..=MAX_WIDTH).contains(&width), "width {width} at x={x}");
    }
    assert_eq!(editor.blocks()[0].width, MAX_WIDTH);
    assert_eq!(editor.resize_move(0.0, 10.0), None);
}

#[test]
fn reference_widths_pack_into_three_rows() {
    let widths = [12, 6, 6, 4, 8];
    let rows = pack_widths(&widths);
    let packed: Vec<Vec<u8>> = rows.iter().map(|r| widths[r.start..r.end].to_vec()).collect();
    assert_eq!(packed, vec![vec![12], vec![6, 6], vec![4, 8]]);
    assert_eq!(rows[2].width, 12);
    assert_eq!(rows[1].remaining(), 0);
    assert_eq!(pack_widths(&[6])[0].remaining(), 6);
}

#[test]
fn diff_reconstructs_both_sides() {
    let mut rng = StdRng::seed_from_u64(42);
    let alphabet = ["{", "}", "  \"a\": 1,", "  \"b\": 2,", "", "x", "y"];
    let random_text = |rng: &mut StdRng| {
        let n = rng.gen_range(0..12);
        (0..n)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect::<Vec<_>>()
            .join("\n")
    };

    for _ in 0..300 {
        let a = random_text(&mut rng);
        let b = random_text(&mut rng);

        let same = diff::diff_lines(&a, &a);
        assert!(same.iter().all(|l| l.kind == LineKind::Same));

        let lines = diff::diff_lines(&a, &b);
        assert_eq!(diff::reconstruct(&lines, LineKind::Add), b);
        assert_eq!(diff::reconstruct(&lines, LineKind::Remove), a);
    }
}

// ============================================================================
// Commit
// ============================================================================

#[tokio::test]
async fn empty_blocks_are_pruned_without_creates() {
    let (store, editor, _) = seeded(&[]).await;
    editor.start_edit().unwrap();
    let heading = editor.insert(BlockType::Heading, 0, None, None).await.unwrap();
    editor.update_content(heading, "   ").await.unwrap();
    editor.insert(BlockType::Image, 1, None, None).await.unwrap();

    editor.commit().await.unwrap();
    assert!(editor.blocks().is_empty());
    assert!(store.list_blocks(editor.section_id()).await.unwrap().is_empty());
    assert_eq!(count(&store, |c| matches!(c, StoreCall::CreateBlock(_))), 0);
}

#[tokio::test]
async fn blank_persisted_block_is_deleted_on_commit() {
    let (store, editor, keys) = seeded(&[(BlockType::Text, "a"), (BlockType::Text, "b")]).await;
    editor.start_edit().unwrap();
    editor.update_content(keys[0], "<p>&nbsp;</p>").await.unwrap();

    let report = editor.commit().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.updated, 1);
    let persisted = store.list_blocks(editor.section_id()).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].order_index, 1);
}

#[tokio::test]
async fn unchanged_draft_commits_nothing() {
    let (store, editor, keys) = seeded(&[(BlockType::Text, "a")]).await;
    editor.start_edit().unwrap();
    let report = editor.commit().await.unwrap();
    assert!(report.is_noop());
    assert!(store.calls().is_empty());

    // Dirty but equal after the edit: still nothing to write.
    editor.update_content(keys[0], "a").await.unwrap();
    let report = editor.commit().await.unwrap();
    assert!(report.is_noop());
    assert!(!report.history_recorded);
    assert_eq!(content_mutations(&store), 0);
    assert_eq!(count(&store, |c| matches!(c, StoreCall::CreateHistory(_))), 0);
}

#[tokio::test]
async fn shrinking_gallery_deletes_exactly_the_removed_image() {
    let (store, editor, _) = seeded(&[]).await;
    let gallery = editor
        .create_gallery(0, &[png("a.png"), png("b.png"), png("c.png")], None)
        .await
        .unwrap();
    let images = editor.block(gallery).unwrap().gallery_images();
    store.clear_calls();

    editor.start_edit().unwrap();
    editor.remove_gallery_image(gallery, 1).await.unwrap();
    assert!(store.calls().is_empty());
    editor.commit().await.unwrap();

    let blob_deletes = store.calls_matching(|c| matches!(c, StoreCall::DeleteBlob(_)));
    assert_eq!(blob_deletes, vec![StoreCall::DeleteBlob(images[1].clone())]);
    assert_eq!(count(&store, |c| matches!(c, StoreCall::UpdateBlock(..))), 1);
    assert!(store.has_blob(&images[0]) && store.has_blob(&images[2]));
}

#[tokio::test]
async fn rows_are_deleted_before_blobs() {
    let (store, editor, _) = seeded(&[]).await;
    let image = editor.insert_image(0, &png("a.png"), None).await.unwrap();
    store.clear_calls();

    editor.start_edit().unwrap();
    editor.delete(image).await.unwrap();
    editor.commit().await.unwrap();

    let calls = store.calls();
    let row = calls.iter().position(|c| matches!(c, StoreCall::DeleteBlock(_))).unwrap();
    let blob = calls.iter().position(|c| matches!(c, StoreCall::DeleteBlob(_))).unwrap();
    assert!(row < blob);
    assert_eq!(store.blob_count(), 0);
}

#[tokio::test]
async fn duplicate_signal_commits_once() {
    let (store, editor, keys) = seeded(&[(BlockType::Text, "a")]).await;
    editor.start_edit().unwrap();
    editor.update_content(keys[0], "b").await.unwrap();

    assert!(matches!(editor.commit_signal(1).await.unwrap(), SignalOutcome::Committed(_)));
    editor.update_content(keys[0], "c").await.unwrap();
    assert_eq!(editor.commit_signal(1).await.unwrap(), SignalOutcome::Ignored);
    assert_eq!(count(&store, |c| matches!(c, StoreCall::UpdateBlock(..))), 1);
    assert!(editor.is_dirty());
}

#[tokio::test]
async fn second_commit_while_in_flight_is_rejected() {
    let (store, editor, _) = seeded(&[]).await;
    editor.start_edit().unwrap();
    let key = editor.insert(BlockType::Text, 0, None, None).await.unwrap();
    editor.update_content(key, "Hallo").await.unwrap();
    store.set_yielding(true);

    let (first, second) = tokio::join!(editor.commit(), editor.commit());
    assert_eq!(first.unwrap().created, 1);
    assert!(matches!(second, Err(EditorError::CommitInFlight)));
    assert_eq!(count(&store, |c| matches!(c, StoreCall::CreateBlock(_))), 1);
}

#[tokio::test]
async fn failed_commit_keeps_editing_and_retry_converges() {
    let (store, editor, keys) = seeded(&[(BlockType::Text, "a")]).await;
    editor.start_edit().unwrap();
    let fresh = editor.insert(BlockType::Heading, 0, None, None).await.unwrap();
    editor.update_content(fresh, "Neu").await.unwrap();
    editor.update_content(keys[0], "a2").await.unwrap();

    store.fail_when(|c| matches!(c, StoreCall::UpdateBlock(..)));
    assert!(matches!(editor.commit().await, Err(EditorError::Mutation(_))));
    assert!(editor.is_editing());
    assert!(editor.is_dirty());

    store.heal();
    store.clear_calls();
    let report = editor.commit().await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);

    let persisted = store.list_blocks(editor.section_id()).await.unwrap();
    assert_eq!(types(&persisted), vec![BlockType::Heading, BlockType::Text]);
    assert_eq!(orders(&persisted), vec![1, 2]);
    assert_eq!(persisted[1].content.as_deref(), Some("a2"));
}

#[tokio::test]
async fn commit_retry_after_failed_relist_creates_nothing_twice() {
    let (store, editor, _) = seeded(&[]).await;
    editor.start_edit().unwrap();
    let key = editor.insert(BlockType::Heading, 0, None, None).await.unwrap();
    editor.update_content(key, "Hallo").await.unwrap();

    store.fail_when(|c| matches!(c, StoreCall::ListBlocks(_)));
    assert!(matches!(editor.commit().await, Err(EditorError::Mutation(_))));
    assert!(editor.is_editing());

    store.heal();
    store.clear_calls();
    let report = editor.commit().await.unwrap();
    assert_eq!(report.created, 0);
    assert!(store.calls_matching(|c| matches!(c, StoreCall::CreateBlock(_))).is_empty());
    assert!(report.before.is_empty());
    assert_eq!(report.after.len(), 1);

    let rows = store.list_blocks(editor.section_id()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content.as_deref(), Some("Hallo"));
}

#[tokio::test]
async fn commit_retry_after_failed_resync_creates_nothing_twice() {
    let (store, editor, keys) = seeded(&[(BlockType::Text, "a")]).await;
    editor.start_edit().unwrap();
    let fresh = editor.insert(BlockType::Heading, 0, None, None).await.unwrap();
    editor.update_content(fresh, "Neu").await.unwrap();
    editor.update_content(keys[0], "a2").await.unwrap();

    // The update fails and so does the re-list that follows it.
    store.fail_when(|c| matches!(c, StoreCall::UpdateBlock(..) | StoreCall::ListBlocks(_)));
    assert!(matches!(editor.commit().await, Err(EditorError::Mutation(_))));
    assert_eq!(store.calls_matching(|c| matches!(c, StoreCall::CreateBlock(_))).len(), 1);

    store.heal();
    store.clear_calls();
    let report = editor.commit().await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);

    let persisted = store.list_blocks(editor.section_id()).await.unwrap();
    assert_eq!(types(&persisted), vec![BlockType::Heading, BlockType::Text]);
    assert_eq!(persisted[1].content.as_deref(), Some("a2"));
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn insert_then_drag_text_to_front() {
    let (store, editor, keys) =
        seeded(&[(BlockType::Heading, "Camp"), (BlockType::Text, "Infos")]).await;
    editor.start_edit().unwrap();

    editor
        .insert(BlockType::Image, 1, Some("https://cdn.example/zelt.jpg".into()), None)
        .await
        .unwrap();
    let blocks = editor.blocks();
    assert_eq!(types(&blocks), vec![BlockType::Heading, BlockType::Image, BlockType::Text]);
    assert_eq!(orders(&blocks), vec![1, 2, 3]);
    assert_eq!(blocks[1].width, 6);

    assert!(editor.reorder(keys[1], 0).await.unwrap());
    let blocks = editor.blocks();
    assert_eq!(types(&blocks), vec![BlockType::Text, BlockType::Heading, BlockType::Image]);
    assert_eq!(orders(&blocks), vec![1, 2, 3]);

    editor.commit().await.unwrap();
    let persisted = store.list_blocks(editor.section_id()).await.unwrap();
    assert_eq!(types(&persisted), vec![BlockType::Text, BlockType::Heading, BlockType::Image]);
}

#[tokio::test]
async fn dropping_on_itself_or_successor_is_noop() {
    let (store, editor, keys) =
        seeded(&[(BlockType::Text, "a"), (BlockType::Text, "b"), (BlockType::Text, "c")]).await;
    assert!(!editor.reorder(keys[1], 1).await.unwrap());
    assert!(!editor.reorder(keys[1], 2).await.unwrap());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn unchanged_title_writes_no_history() {
    let store = Arc::new(MemoryStore::new());
    let owner = Principal::new("Mia", UserRole::Leitung);
    let section = create_section(store.as_ref(), &owner, "camp", "A").await.unwrap();
    let panel = SectionPanel::open(store.clone(), owner, section).await;

    panel.start_edit().unwrap();
    panel.set_title("A").unwrap();
    let report = panel.commit_edit().await.unwrap();
    assert!(!report.section_updated);
    assert_eq!(count(&store, |c| matches!(c, StoreCall::CreateHistory(_))), 0);
    assert!(panel.history().await.unwrap().is_empty());
}
