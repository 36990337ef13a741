//! Reopen, configuration and compaction behaviour of disk-backed stores.

use crate::common::*;
use svdb::{Durability, FieldType};

#[test]
fn data_survives_reopen() {
    let mut t = TestDb::new();
    for i in 0..20u64 {
        t.db.insert(i, &vector_for(i), record! { "n" => i as i64 })
            .unwrap();
    }
    t.db.insert("named", &vector_for(100), record! { "n" => -1 })
        .unwrap();
    t.db.update(3u64, Some(&vector_for(300)), Some(record! { "extra" => true }))
        .unwrap();
    t.db.delete(7u64).unwrap();

    let before = t.db.search(&vector_for(5), Metric::Cosine, 10, None).unwrap();
    t.reopen();

    assert_eq!(t.db.len(), 20);
    assert!(!t.db.contains(7u64));
    assert_eq!(
        t.db.get(3u64).unwrap().record,
        record! { "extra" => true }
    );
    assert_eq!(&t.db.embedding(3u64).unwrap().unwrap()[..], &vector_for(300)[..]);
    assert_eq!(t.db.get("named").unwrap().record, record! { "n" => -1 });
    assert_eq!(
        t.db.search(&vector_for(5), Metric::Cosine, 10, None).unwrap(),
        before
    );
    assert!(t.db.recovery_report().is_clean());
    assert_consistent(&t.db);
}

#[test]
fn dimension_persists_without_config_value() {
    let mut t = TestDb::new();
    t.db.insert(1u64, &vector_for(1), record! {}).unwrap();
    t.close();

    // Drop the dimension from svdb.toml; the log header still knows it
    let config_path = t.path().join(svdb::CONFIG_FILE_NAME);
    SvdbConfig::default().write_to_file(&config_path).unwrap();
    t.open_again();
    assert_eq!(t.db.dimension(), DIM);
}

#[test]
fn reopen_with_other_dimension_fails() {
    let mut t = TestDb::new();
    t.db.insert(1u64, &vector_for(1), record! {}).unwrap();
    t.close();

    let err = Database::open_with_config(t.path(), SvdbConfig::with_dimension(DIM + 1))
        .unwrap_err();
    assert!(matches!(
        err,
        SvdbError::DimensionMismatch {
            expected: DIM,
            ..
        }
    ));

    // svdb.toml is untouched by the failed open
    t.open_again();
    assert_eq!(t.db.config().dimension, Some(DIM));
}

#[test]
fn new_store_without_dimension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = Database::open(dir.path()).unwrap_err();
    assert!(matches!(err, SvdbError::InvalidArgument { .. }));
    // The default config was still written for the user to edit
    assert!(dir.path().join(svdb::CONFIG_FILE_NAME).exists());
}

#[test]
fn second_open_is_locked_out() {
    let t = TestDb::new();
    let err = Database::open(t.path()).unwrap_err();
    assert!(err.is_storage_error());
}

#[test]
fn schema_persists_after_records_are_gone() {
    let mut t = TestDb::new();
    t.db.insert("a", &vector_for(1), record! { "year" => 2024, "lang" => "en" })
        .unwrap();
    t.db.delete("a").unwrap();
    t.reopen();

    let schema = t.db.schema();
    assert_eq!(schema.get("year"), Some(FieldType::Number));
    assert_eq!(schema.get("lang"), Some(FieldType::String));

    let err = t
        .db
        .insert("b", &vector_for(2), record! { "year" => "next" })
        .unwrap_err();
    assert!(matches!(err, SvdbError::SchemaConflict { .. }));
}

#[test]
fn compaction_shrinks_logs_and_keeps_state() {
    let mut t = TestDb::new();
    for i in 0..10u64 {
        t.db.insert(i, &vector_for(i), record! { "v" => 0 }).unwrap();
    }
    for round in 1..=20i64 {
        for i in 0..10u64 {
            t.db.update(i, Some(&vector_for(i + round as u64)), Some(record! { "v" => round }))
                .unwrap();
        }
    }
    let embeddings_before = std::fs::metadata(t.embeddings_log()).unwrap().len();
    let metadata_before = std::fs::metadata(t.metadata_log()).unwrap().len();
    let hits_before = t.db.search(&vector_for(0), Metric::Euclidean, 5, None).unwrap();

    let dropped = t.db.compact().unwrap();
    assert!(dropped >= 400, "dropped {}", dropped);
    assert!(std::fs::metadata(t.embeddings_log()).unwrap().len() < embeddings_before);
    assert!(std::fs::metadata(t.metadata_log()).unwrap().len() < metadata_before);
    assert_eq!(
        t.db.search(&vector_for(0), Metric::Euclidean, 5, None).unwrap(),
        hits_before
    );

    // Nothing left to drop
    assert_eq!(t.db.compact().unwrap(), 0);

    t.reopen();
    assert_eq!(t.db.len(), 10);
    assert_eq!(t.db.get(4u64).unwrap().record, record! { "v" => 20 });
    assert_eq!(
        t.db.search(&vector_for(0), Metric::Euclidean, 5, None).unwrap(),
        hits_before
    );
}

#[test]
fn compaction_on_open_respects_threshold() {
    let mut t = TestDb::with_config(SvdbConfig {
        compaction_min_dead: 50,
        ..SvdbConfig::with_dimension(DIM)
    });
    t.db.insert(1u64, &vector_for(1), record! {}).unwrap();
    for i in 0..10u64 {
        t.db.update(1u64, Some(&vector_for(i)), None).unwrap();
    }
    let small = std::fs::metadata(t.embeddings_log()).unwrap().len();
    t.reopen();
    // Ten dead frames: below threshold, left alone
    assert_eq!(std::fs::metadata(t.embeddings_log()).unwrap().len(), small);

    for i in 0..60u64 {
        t.db.update(1u64, Some(&vector_for(i)), None).unwrap();
    }
    let large = std::fs::metadata(t.embeddings_log()).unwrap().len();
    t.reopen();
    assert!(std::fs::metadata(t.embeddings_log()).unwrap().len() < large);
    assert_eq!(&t.db.embedding(1u64).unwrap().unwrap()[..], &vector_for(59)[..]);
}

#[test]
fn always_durability_round_trips() {
    let mut t = TestDb::new_strict();
    assert_eq!(t.db.config().durability_mode().unwrap(), Durability::Always);
    for i in 0..5u64 {
        t.db.insert(i, &vector_for(i), record! { "i" => i as i64 })
            .unwrap();
    }
    t.reopen();
    assert_eq!(t.db.config().durability_mode().unwrap(), Durability::Always);
    assert_eq!(t.db.len(), 5);
    assert_consistent(&t.db);
}

#[test]
fn unknown_durability_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = SvdbConfig {
        durability: "sometimes".to_string(),
        ..SvdbConfig::with_dimension(DIM)
    };
    let err = Database::open_with_config(dir.path(), config).unwrap_err();
    assert!(matches!(err, SvdbError::InvalidArgument { .. }));
}

#[test]
fn ephemeral_has_no_path() {
    let db = Database::ephemeral(DIM).unwrap();
    assert!(db.path().is_none());
    db.insert(1u64, &vector_for(1), record! {}).unwrap();
    assert_eq!(db.compact().unwrap(), 0);
}
