#![no_main]

use bugsift_search::{Embedder, HashEmbedder, SimilarityIndex};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|text: &str| {
    let embedder = HashEmbedder::new(64);
    let Ok(vector) = embedder.embed(text) else {
        return;
    };
    assert_eq!(vector.len(), 64);
    assert!(vector.iter().all(|v| v.is_finite()));

    let index = SimilarityIndex::new(64);
    if index.insert("bug-fuzz", &vector).is_ok() {
        let hits = index.query(&vector, 1).expect("query");
        assert!(hits.iter().all(|n| (0.0..=1.0).contains(&n.similarity)));
    }
});
