//! Property and concurrency tests for the similarity index.

use bugsift_search::SimilarityIndex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

const DIMS: usize = 16;

fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1.0f32..1.0, DIMS)
        .prop_filter("non-zero norm", |v| v.iter().map(|x| x * x).sum::<f32>() > 1e-3)
}

fn arb_corpus() -> impl Strategy<Value = Vec<Vec<f32>>> {
    prop::collection::vec(arb_vector(), 1..40)
}

fn snapshot(corpus: &[Vec<f32>]) -> Vec<(String, Vec<f32>)> {
    corpus
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("bug-{i:04}"), v.clone()))
        .collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(128))]

    #[test]
    fn every_vector_finds_itself_at_similarity_one(corpus in arb_corpus()) {
        let index = SimilarityIndex::new(DIMS);
        for (id, vector) in snapshot(&corpus) {
            index.insert(&id, &vector).expect("insert");
        }

        for (id, vector) in snapshot(&corpus) {
            let hits = index.query(&vector, corpus.len()).expect("query");
            let own = hits.iter().find(|h| h.id == id).expect("own id returned");
            prop_assert!((own.similarity - 1.0).abs() < 1e-6);
            prop_assert!(hits[0].similarity <= own.similarity + 1e-9);
        }
    }

    #[test]
    fn results_are_sorted_and_bounded(corpus in arb_corpus(), query in arb_vector(), k in 0usize..60) {
        let index = SimilarityIndex::new(DIMS);
        for (id, vector) in snapshot(&corpus) {
            index.insert(&id, &vector).expect("insert");
        }
        let hits = index.query(&query, k).expect("query");
        prop_assert_eq!(hits.len(), k.min(corpus.len()));
        for pair in hits.windows(2) {
            prop_assert!(pair[0].similarity >= pair[1].similarity);
            if pair[0].similarity.total_cmp(&pair[1].similarity).is_eq() {
                prop_assert!(pair[0].id < pair[1].id);
            }
        }
        for hit in &hits {
            prop_assert!((0.0..=1.0).contains(&hit.similarity));
        }
    }

    #[test]
    fn rebuild_twice_gives_identical_results(corpus in arb_corpus(), query in arb_vector()) {
        let index = SimilarityIndex::new(DIMS);
        let rows = snapshot(&corpus);

        index.rebuild(|| Ok(rows.clone())).expect("first rebuild");
        let first = index.query(&query, 10).expect("query");
        index.rebuild(|| Ok(rows.clone())).expect("second rebuild");
        let second = index.query(&query, 10).expect("query");

        prop_assert_eq!(first, second);
        prop_assert_eq!(index.stats().generation, 2);
    }

    #[test]
    fn removed_ids_disappear(corpus in arb_corpus(), query in arb_vector()) {
        let index = SimilarityIndex::new(DIMS);
        let rows = snapshot(&corpus);
        for (id, vector) in &rows {
            index.insert(id, vector).expect("insert");
        }
        for (id, _) in rows.iter().step_by(2) {
            index.remove(id);
        }
        let hits = index.query(&query, rows.len()).expect("query");
        for (i, (id, _)) in rows.iter().enumerate() {
            let present = hits.iter().any(|h| &h.id == id);
            prop_assert_eq!(present, i % 2 == 1);
        }
    }
}

#[test]
fn inserts_racing_a_rebuild_are_not_lost() {
    let index = SimilarityIndex::new(DIMS);
    let base: Vec<(String, Vec<f32>)> = (0..200)
        .map(|i| {
            let mut v = vec![0.0f32; DIMS];
            v[i % DIMS] = 1.0;
            v[(i + 1) % DIMS] = 0.5;
            (format!("base-{i:04}"), v)
        })
        .collect();

    std::thread::scope(|scope| {
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let index = &index;
                scope.spawn(move || {
                    for i in 0..50 {
                        let mut v = vec![0.1f32; DIMS];
                        v[(w + i) % DIMS] = 1.0;
                        index.insert(&format!("live-{w}-{i:03}"), &v).expect("insert");
                    }
                })
            })
            .collect();

        for _ in 0..5 {
            index.rebuild(|| Ok(base.clone())).expect("rebuild");
        }
        for writer in writers {
            writer.join().expect("writer thread");
        }
    });

    // Every live insert either landed after the last swap or was replayed.
    for w in 0..4 {
        for i in 0..50 {
            assert!(index.contains(&format!("live-{w}-{i:03}")), "live-{w}-{i:03} lost");
        }
    }
    assert!(index.len() >= 200);
}

#[test]
fn queries_see_complete_generations_during_rebuild() {
    let index = SimilarityIndex::new(DIMS);
    let make = |prefix: &str| -> Vec<(String, Vec<f32>)> {
        (0..100)
            .map(|i| {
                let mut v = vec![0.0f32; DIMS];
                v[i % DIMS] = 1.0;
                (format!("{prefix}-{i:03}"), v)
            })
            .collect()
    };
    let old = make("old");
    let new = make("new");
    index.rebuild(|| Ok(old.clone())).expect("seed");

    let done = AtomicBool::new(false);
    std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut target = vec![0.0f32; DIMS];
            target[0] = 1.0;
            while !done.load(Ordering::SeqCst) {
                let hits = index.query(&target, 100).expect("query");
                assert_eq!(hits.len(), 100);
                let old_count = hits.iter().filter(|h| h.id.starts_with("old")).count();
                assert!(old_count == 0 || old_count == 100, "mixed generation: {old_count}");
            }
        });

        for round in 0..20 {
            let rows = if round % 2 == 0 { &new } else { &old };
            index.rebuild(|| Ok(rows.clone())).expect("rebuild");
        }
        done.store(true, Ordering::SeqCst);
        reader.join().expect("reader thread");
    });
}
