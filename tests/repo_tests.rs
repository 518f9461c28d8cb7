#![cfg(feature = "inmem-store")]

use noticeboard::{
    models::{Attachments, NewMessage, UpdateMessage},
    repo::{inmem::InMemRepo, MessageRepo, RepoError},
};

fn new_message(title: &str, files: &[&str]) -> NewMessage {
    NewMessage {
        title: title.into(),
        enabled: true,
        attachments: Attachments::new(files.iter().map(|f| f.to_string()).collect()),
        ..Default::default()
    }
}

#[tokio::test]
async fn message_crud_scoped_by_owner() {
    let r = InMemRepo::new();

    // starts empty
    assert!(r.list_messages(1).await.unwrap().is_empty());

    let m = r.create_message(1, new_message("Notice", &["a.png"])).await.unwrap();
    assert_eq!(m.owner_id, 1);
    assert_eq!(m.attachments.as_slice(), ["a.png".to_string()]);

    // invisible to another owner
    assert!(r.list_messages(2).await.unwrap().is_empty());
    assert!(matches!(r.get_message(m.id, 2).await.unwrap_err(), RepoError::NotFound));
    let err = r
        .update_message(m.id, 2, UpdateMessage { title: Some("stolen".into()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
    assert!(matches!(r.delete_message(m.id, 2).await.unwrap_err(), RepoError::NotFound));

    // still intact for the owner
    assert_eq!(r.get_message(m.id, 1).await.unwrap().title, "Notice");

    let removed = r.delete_message(m.id, 1).await.unwrap();
    assert_eq!(removed.attachments.as_slice(), ["a.png".to_string()]);
    assert!(r.list_messages(1).await.unwrap().is_empty());
    assert!(matches!(r.delete_message(m.id, 1).await.unwrap_err(), RepoError::NotFound));
}

#[tokio::test]
async fn partial_update_touches_only_supplied_columns() {
    let r = InMemRepo::new();
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let m = r
        .create_message(7, NewMessage { start_date: Some(start), ..new_message("Old", &["a.png", "b.png"]) })
        .await
        .unwrap();

    let upd = r
        .update_message(m.id, 7, UpdateMessage { title: Some("New".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(upd.message.title, "New");
    assert_eq!(upd.message.attachments, m.attachments);
    assert_eq!(upd.message.start_date, Some(start));
    assert!(upd.message.enabled);
    assert!(upd.replaced.is_empty());
    assert!(upd.message.updated_at >= m.updated_at);
    assert_eq!(upd.message.created_at, m.created_at);
}

#[tokio::test]
async fn attachment_update_reports_replaced_list() {
    let r = InMemRepo::new();
    let m = r.create_message(3, new_message("Flyers", &["a.png", "b.png"])).await.unwrap();

    let upd = r
        .update_message(
            m.id,
            3,
            UpdateMessage { attachments: Some(Attachments::new(vec!["c.png".into()])), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(upd.message.attachments.as_slice(), ["c.png".to_string()]);
    assert_eq!(upd.replaced.as_slice(), ["a.png".to_string(), "b.png".to_string()]);
}

#[tokio::test]
async fn list_is_ordered_by_id() {
    let r = InMemRepo::new();
    for t in ["one", "two", "three"] {
        r.create_message(1, new_message(t, &[])).await.unwrap();
    }
    let titles: Vec<_> = r.list_messages(1).await.unwrap().into_iter().map(|m| m.title).collect();
    assert_eq!(titles, ["one", "two", "three"]);
}

#[tokio::test]
async fn snapshot_roundtrip_and_legacy_scalar_column() {
    let dir = tempfile::tempdir().unwrap();

    // rows written before attachments were stored as arrays
    let legacy = serde_json::json!({
        "messages": {
            "4": {
                "id": 4, "owner_id": 9, "title": "Legacy", "description": null, "file_type": null,
                "enabled": true, "start_date": null, "end_date": null, "attachments": "x.png",
                "created_at": "2023-01-02T03:04:05Z", "updated_at": "2023-01-02T03:04:05Z"
            },
            "5": {
                "id": 5, "owner_id": 9, "title": "Current", "description": null, "file_type": null,
                "enabled": false, "start_date": null, "end_date": null, "attachments": "[\"x.png\"]",
                "created_at": "2023-01-02T03:04:05Z", "updated_at": "2023-01-02T03:04:05Z"
            }
        }
    });
    std::fs::write(dir.path().join("messages.json"), serde_json::to_vec(&legacy).unwrap()).unwrap();

    let r = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    let listed = r.list_messages(9).await.unwrap();
    assert_eq!(listed.len(), 2);
    for m in &listed {
        assert_eq!(m.attachments.as_slice(), ["x.png".to_string()]);
    }

    // ids continue after the highest loaded row
    let created = r.create_message(9, new_message("Fresh", &[])).await.unwrap();
    assert_eq!(created.id, 6);

    // reload sees the new row; rewritten rows use the array form
    let reloaded = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    assert_eq!(reloaded.list_messages(9).await.unwrap().len(), 3);
    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(dir.path().join("messages.json")).unwrap()).unwrap();
    assert_eq!(raw["messages"]["6"]["attachments"], "[]");
}

#[tokio::test]
async fn corrupt_snapshot_refuses_to_open_and_is_left_intact() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    for t in ["a", "b", "c"] {
        r.create_message(1, new_message(t, &["f.png"])).await.unwrap();
    }

    // simulate a write cut short
    let path = dir.path().join("messages.json");
    let full = std::fs::read(&path).unwrap();
    std::fs::write(&path, &full[..full.len() / 2]).unwrap();

    let err = InMemRepo::with_snapshot_dir(dir.path()).err().expect("corrupt snapshot must not load");
    assert!(matches!(err, RepoError::Internal(_)));
    assert_eq!(std::fs::read(&path).unwrap(), &full[..full.len() / 2]);
}

#[tokio::test]
async fn snapshot_write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path().join("nested")).unwrap();
    let m = r.create_message(1, new_message("a", &[])).await.unwrap();
    r.update_message(m.id, 1, UpdateMessage { title: Some("b".into()), ..Default::default() }).await.unwrap();

    let names: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, ["messages.json"]);
    let reloaded = InMemRepo::with_snapshot_dir(dir.path().join("nested")).unwrap();
    assert_eq!(reloaded.get_message(m.id, 1).await.unwrap().title, "b");
}

#[tokio::test]
async fn failed_snapshot_write_fails_the_call_and_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let r = InMemRepo::with_snapshot_dir(dir.path()).unwrap();
    let kept = r.create_message(1, new_message("kept", &["k.png"])).await.unwrap();

    // a directory in the snapshot's place makes every rename fail
    let path = dir.path().join("messages.json");
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let err = r.create_message(1, new_message("lost", &[])).await.unwrap_err();
    assert!(matches!(err, RepoError::Internal(_)));

    let err = r
        .update_message(
            kept.id,
            1,
            UpdateMessage { attachments: Some(Attachments::new(vec!["n.png".into()])), ..Default::default() },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Internal(_)));

    assert!(matches!(r.delete_message(kept.id, 1).await.unwrap_err(), RepoError::Internal(_)));

    // memory still matches the last snapshot that reached disk
    let listed = r.list_messages(1).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "kept");
    assert_eq!(listed[0].attachments.as_slice(), ["k.png".to_string()]);
    assert!(!dir.path().join(".messages.json.part").exists());
}
