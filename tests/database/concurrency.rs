//! Concurrent writers and readers sharing one database.

use crate::common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: u64 = 8;
const PER_THREAD: u64 = 100;

#[test]
fn writers_on_distinct_ids() {
    let mut t = TestDb::new();
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let db = Arc::clone(&t.db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let id = tid * PER_THREAD + i;
                    db.insert(id, &vector_for(id), record! { "thread" => tid as i64 })
                        .unwrap();
                }
                // Delete every tenth of our own ids
                for i in (0..PER_THREAD).step_by(10) {
                    db.delete(tid * PER_THREAD + i).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected = (THREADS * (PER_THREAD - PER_THREAD / 10)) as usize;
    assert_eq!(t.db.len(), expected);
    assert_consistent(&t.db);

    t.reopen();
    assert_eq!(t.db.len(), expected);
    assert_consistent(&t.db);
}

#[test]
fn writers_racing_on_one_id() {
    let mut t = TestDb::new();
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let db = Arc::clone(&t.db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut inserted = 0u32;
                for round in 0..50u64 {
                    match db.insert("hot", &vector_for(tid * 1000 + round), record! { "by" => tid as i64 }) {
                        Ok(()) => inserted += 1,
                        Err(SvdbError::AlreadyExists { .. }) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                    let _ = db.update("hot", Some(&vector_for(round)), None).unwrap();
                    if round % 7 == tid % 7 {
                        db.delete("hot").unwrap();
                    }
                }
                inserted
            })
        })
        .collect();
    let inserted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(inserted >= 1);

    // Whatever the interleaving, the id is either fully present or absent
    assert_consistent(&t.db);
    if let Some(entry) = t.db.get("hot") {
        assert!(entry.is_complete());
    }

    t.reopen();
    assert!(t.db.recovery_report().is_clean());
    assert_consistent(&t.db);
}

#[test]
fn searches_during_writes_never_see_torn_records() {
    let t = TestDb::new();
    for i in 0..200u64 {
        t.db.insert(i, &vector_for(i), record! { "phase" => "seed" })
            .unwrap();
    }

    let writer = {
        let db = Arc::clone(&t.db);
        thread::spawn(move || {
            for i in 200..600u64 {
                db.insert(i, &vector_for(i), record! { "phase" => "live" })
                    .unwrap();
                if i % 3 == 0 {
                    db.delete(i - 100).unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..4u64)
        .map(|r| {
            let db = Arc::clone(&t.db);
            thread::spawn(move || {
                let filter = Filter::one_of("phase", ["seed", "live"]);
                for q in 0..100u64 {
                    let hits = db
                        .search(&vector_for(r * 100 + q), Metric::Cosine, 10, Some(&filter))
                        .unwrap();
                    assert!(hits.len() <= 10);
                    for hit in &hits {
                        assert!(filter.matches(&hit.record));
                    }
                    for w in hits.windows(2) {
                        assert!(
                            w[0].score > w[1].score
                                || (w[0].score == w[1].score && w[0].id < w[1].id)
                        );
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_consistent(&t.db);
}

#[test]
fn filtered_hits_match_even_while_field_flips() {
    let t = TestDb::new();
    for i in 0..200u64 {
        t.db.insert(i, &vector_for(i), record! { "type" => "doc" })
            .unwrap();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let db = Arc::clone(&t.db);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let kind = if round % 2 == 0 { "img" } else { "doc" };
                for i in 0..200u64 {
                    db.update(i, None, Some(record! { "type" => kind })).unwrap();
                }
                round += 1;
            }
        })
    };

    let filter = Filter::eq("type", "doc");
    for q in 0..500u64 {
        let hits = t
            .db
            .search(&vector_for(q), Metric::Cosine, 200, Some(&filter))
            .unwrap();
        let violating = hits.iter().filter(|h| !filter.matches(&h.record)).count();
        assert_eq!(violating, 0, "query {}", q);
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}
