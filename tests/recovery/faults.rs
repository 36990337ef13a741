//! Injected append failures on one half of a write.

use crate::common::*;

#[test]
fn failed_embedding_append_leaves_incomplete() {
    let mut t = TestDb::new();
    t.db.inject_embedding_failures(1);

    let err = t
        .db
        .insert("a", &vector_for(1), record! { "k" => 1 })
        .unwrap_err();
    assert!(err.is_storage_error());
    assert_eq!(t.db.incomplete(), vec![RecordId::from("a")]);
    assert!(t
        .db
        .search(&vector_for(1), Metric::Cosine, 5, None)
        .unwrap()
        .is_empty());

    // The state is the same after a restart
    t.reopen();
    assert_eq!(t.db.recovery_report().incomplete, vec![RecordId::from("a")]);

    t.db.insert("a", &vector_for(1), record! { "k" => 1 }).unwrap();
    assert_consistent(&t.db);
}

#[test]
fn failed_metadata_append_touches_nothing() {
    let mut t = TestDb::new();
    t.db.inject_metadata_failures(1);

    let err = t.db.insert(1u64, &vector_for(1), record! {}).unwrap_err();
    assert!(err.is_storage_error());
    assert!(t.db.is_empty());

    t.reopen();
    assert!(t.db.recovery_report().is_clean());
    assert!(t.db.is_empty());
}

#[test]
fn failed_metadata_delete_after_embedding_delete() {
    let mut t = TestDb::new();
    t.db.insert(1u64, &vector_for(1), record! { "k" => 1 })
        .unwrap();
    t.db.inject_metadata_failures(1);

    assert!(t.db.delete(1u64).unwrap_err().is_storage_error());
    // Embedding gone, metadata kept: INCOMPLETE, never a search hit
    assert_eq!(t.db.incomplete(), vec![RecordId::Int(1)]);
    assert!(t
        .db
        .search(&vector_for(1), Metric::Cosine, 5, None)
        .unwrap()
        .is_empty());

    // Retrying completes the delete
    assert!(t.db.delete(1u64).unwrap().is_applied());
    t.reopen();
    assert!(t.db.is_empty());
    assert!(t.db.recovery_report().is_clean());
}

#[test]
fn failed_vector_update_keeps_new_metadata() {
    let t = TestDb::new();
    t.db.insert(1u64, &vector_for(1), record! { "v" => 1 })
        .unwrap();
    t.db.inject_embedding_failures(1);

    let err = t
        .db
        .update(1u64, Some(&vector_for(2)), Some(record! { "v" => 2 }))
        .unwrap_err();
    assert!(err.is_storage_error());

    // Old vector stays; metadata already moved on
    let entry = t.db.get(1u64).unwrap();
    assert!(entry.is_complete());
    assert_eq!(entry.record, record! { "v" => 2 });
    assert_eq!(&entry.embedding.unwrap()[..], &vector_for(1)[..]);
}

#[test]
fn searches_keep_working_through_failures() {
    let t = TestDb::new();
    for i in 0..10u64 {
        t.db.insert(i, &vector_for(i), record! {}).unwrap();
    }
    t.db.inject_embedding_failures(3);
    for i in 10..13u64 {
        assert!(t.db.insert(i, &vector_for(i), record! {}).is_err());
    }
    t.db.insert(13u64, &vector_for(13), record! {}).unwrap();

    let hits = t.db.search(&vector_for(0), Metric::DotProduct, 20, None).unwrap();
    assert_eq!(hits.len(), 11);
    assert_eq!(t.db.incomplete().len(), 3);
}

#[test]
fn half_written_metadata_frame_is_rolled_back() {
    let mut t = TestDb::new();
    t.db.insert(1u64, &vector_for(1), record! { "k" => 1 })
        .unwrap();
    t.db.inject_partial_metadata_write();

    assert!(t
        .db
        .insert(2u64, &vector_for(2), record! { "k" => 2 })
        .unwrap_err()
        .is_storage_error());
    t.db.insert(3u64, &vector_for(3), record! { "k" => 3 })
        .unwrap();

    // Every acknowledged write replays; nothing is torn or corrupt
    t.reopen();
    let report = t.db.recovery_report().clone();
    assert!(report.is_clean());
    assert_eq!(report.truncated_bytes, 0);
    assert_eq!(t.db.ids(), vec![RecordId::Int(1), RecordId::Int(3)]);
    assert_consistent(&t.db);
}

#[test]
fn half_written_embedding_frame_is_rolled_back() {
    let mut t = TestDb::new();
    t.db.inject_partial_embedding_write();
    assert!(t.db.insert(1u64, &vector_for(1), record! {}).is_err());
    assert_eq!(t.db.incomplete(), vec![RecordId::Int(1)]);

    t.db.insert(2u64, &vector_for(2), record! {}).unwrap();
    t.reopen();
    assert_eq!(t.db.recovery_report().truncated_bytes, 0);
    assert_eq!(t.db.incomplete(), vec![RecordId::Int(1)]);
    assert_eq!(
        &t.db.embedding(2u64).unwrap().unwrap()[..],
        &vector_for(2)[..]
    );
}
