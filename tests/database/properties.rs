//! Property tests: random operation sequences against a model.

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u64),
    UpdateVector(u64, u64),
    UpdateRecord(u64, i64),
    Delete(u64),
}

fn op() -> impl Strategy<Value = Op> {
    let id = 0u64..12;
    prop_oneof![
        (id.clone(), any::<u64>()).prop_map(|(i, s)| Op::Insert(i, s)),
        (id.clone(), any::<u64>()).prop_map(|(i, s)| Op::UpdateVector(i, s)),
        (id.clone(), -100i64..100).prop_map(|(i, n)| Op::UpdateRecord(i, n)),
        id.prop_map(Op::Delete),
    ]
}

/// Apply `ops` to `db` and to a model map; return the model
fn run(db: &Database, ops: &[Op]) -> BTreeMap<u64, (u64, i64)> {
    let mut model = BTreeMap::new();
    for op in ops {
        match *op {
            Op::Insert(id, seed) => {
                let result = db.insert(id, &vector_for(seed), record! { "n" => 0 });
                if model.contains_key(&id) {
                    assert!(matches!(result, Err(SvdbError::AlreadyExists { .. })));
                } else {
                    result.unwrap();
                    model.insert(id, (seed, 0));
                }
            }
            Op::UpdateVector(id, seed) => {
                let outcome = db.update(id, Some(&vector_for(seed)), None).unwrap();
                match model.get_mut(&id) {
                    Some(entry) => {
                        assert!(outcome.is_applied());
                        entry.0 = seed;
                    }
                    None => assert!(outcome.is_not_found()),
                }
            }
            Op::UpdateRecord(id, n) => {
                let outcome = db.update(id, None, Some(record! { "n" => n })).unwrap();
                match model.get_mut(&id) {
                    Some(entry) => {
                        assert!(outcome.is_applied());
                        entry.1 = n;
                    }
                    None => assert!(outcome.is_not_found()),
                }
            }
            Op::Delete(id) => {
                let outcome = db.delete(id).unwrap();
                assert_eq!(outcome.is_applied(), model.remove(&id).is_some());
            }
        }
    }
    model
}

fn assert_matches_model(db: &Database, model: &BTreeMap<u64, (u64, i64)>) {
    let ids: Vec<RecordId> = model.keys().map(|&id| RecordId::Int(id)).collect();
    assert_eq!(db.ids(), ids);
    for (&id, &(seed, n)) in model {
        let entry = db.get(id).unwrap();
        assert!(entry.is_complete());
        assert_eq!(entry.record, record! { "n" => n });
        assert_eq!(&entry.embedding.unwrap()[..], &vector_for(seed)[..]);
    }
    assert_consistent(db);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn identifiers_stay_consistent(ops in prop::collection::vec(op(), 1..60)) {
        let mut t = TestDb::new();
        let model = run(&t.db, &ops);
        assert_matches_model(&t.db, &model);

        // Every stored id is searchable; nothing else is
        let k = model.len().max(1);
        let hits = t.db.search(&vector_for(0), Metric::Euclidean, k, None).unwrap();
        prop_assert_eq!(hits.len(), model.len());

        t.reopen();
        prop_assert!(t.db.recovery_report().is_clean());
        assert_matches_model(&t.db, &model);
    }

    #[test]
    fn wrong_length_never_stored(len in 0usize..12) {
        prop_assume!(len != DIM);
        let db = Database::ephemeral(DIM).unwrap();
        let vector = vec![0.5f32; len];
        prop_assert!(db.insert(1u64, &vector, record!()).is_err());
        prop_assert!(db.is_empty());
        prop_assert!(db.schema().is_empty());
    }

    #[test]
    fn search_agrees_with_brute_force(
        seeds in prop::collection::vec(any::<u64>(), 1..80),
        query in any::<u64>(),
        k in 1usize..20,
        metric in prop::sample::select(Metric::ALL.to_vec()),
    ) {
        let db = Database::ephemeral(DIM).unwrap();
        for (i, seed) in seeds.iter().enumerate() {
            db.insert(i as u64, &vector_for(*seed), record! { "even" => i % 2 == 0 }).unwrap();
        }
        let filter = Filter::eq("even", true);
        for f in [None, Some(&filter)] {
            let hits = db.search(&vector_for(query), metric, k, f).unwrap();
            prop_assert_eq!(hit_ids(&hits), brute_force(&db, &vector_for(query), metric, k, f));
        }
    }
}
