//! Section panel lifecycle against a SQLite database on disk.

use std::sync::Arc;

use kila_content::store::{BlockStore, SectionStore, SqliteStore, Upload};
use kila_content::{SectionPanel, create_section, list_sections, user_history};
use kila_types::{BlockType, Principal, SectionMeta, UserRole};

fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    let path = dir.path().join("content.db");
    Arc::new(SqliteStore::open(path, "https://camp.example").unwrap())
}

#[tokio::test]
async fn edit_commit_reopen_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let owner = Principal::new("Mia", UserRole::Leitung);

    let section = create_section(store.as_ref(), &owner, "camp", "Anreise").await.unwrap();
    let panel = SectionPanel::open(store.clone(), owner.clone(), section.clone()).await;
    assert!(panel.load_error().is_none());

    panel.start_edit().unwrap();
    panel.set_title("Anreise & Abfahrt").unwrap();
    panel
        .set_meta(SectionMeta {
            show_publish_date: true,
            publish_date: kila_types::parse_publish_date("2025-07-01").unwrap(),
            ..SectionMeta::default()
        })
        .unwrap();
    let heading = panel.editor().insert(BlockType::Heading, 0, None, None).await.unwrap();
    panel.editor().update_content(heading, "Treffpunkt").await.unwrap();
    let text = panel.editor().insert(BlockType::Text, 1, None, Some(8)).await.unwrap();
    panel.editor().update_content(text, "<p>Bahnhof, 9 Uhr</p>").await.unwrap();

    let report = panel.commit_edit().await.unwrap();
    assert!(report.section_updated);
    assert_eq!(report.blocks.unwrap().created, 2);
    drop(panel);

    // A fresh connection sees the committed state.
    let store = open_store(&dir);
    let sections = list_sections(store.as_ref(), "camp").await.unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Anreise & Abfahrt");
    assert!(sections[0].show_publish_date);

    let panel = SectionPanel::open(store.clone(), owner.clone(), sections[0].clone()).await;
    let blocks = panel.editor().blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].width, 8);
    assert_eq!(panel.layout().rows.len(), 2);

    let history = panel.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].added() > 0);
    assert_eq!(user_history(store.as_ref(), owner.id).await.unwrap().len(), 1);

    // View-mode image upload, then cascade delete.
    panel
        .editor()
        .insert_image(2, &Upload::new("karte.jpg", vec![0xff, 0xd8]), Some(4))
        .await
        .unwrap();
    assert_eq!(store.blob_count().unwrap(), 1);

    panel.delete().await.unwrap();
    assert!(store.list_blocks(section.id).await.unwrap().is_empty());
    assert!(store.get_section(section.id).await.is_err());
    assert_eq!(store.blob_count().unwrap(), 0);
}

#[tokio::test]
async fn assigned_editor_can_edit_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let owner = Principal::new("Mia", UserRole::Leitung);
    let admin = Principal::new("Ada", UserRole::Admin);
    let helper = Principal::new("Hans", UserRole::Member);

    let section = create_section(store.as_ref(), &owner, "dates", "Termine").await.unwrap();
    let as_admin = SectionPanel::open(store.clone(), admin, section.clone()).await;
    as_admin.assign_editors(vec![helper.id]).await.unwrap();

    let reloaded = store.get_section(section.id).await.unwrap();
    assert_eq!(reloaded.editor_ids, vec![helper.id]);
    let as_helper = SectionPanel::open(store, helper, reloaded).await;
    assert!(as_helper.can_edit());
    assert!(!as_helper.can_delete());
}
