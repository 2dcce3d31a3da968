use bugsift_search::{Embedder, HashEmbedder, SimilarityIndex};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const SIZES: [usize; 3] = [1_000, 10_000, 50_000];
const WORDS: &[&str] = &[
    "crash", "checkout", "login", "timeout", "upload", "render", "dark", "mode", "push",
    "notification", "cart", "payment", "profile", "photo", "settings", "network", "offline",
    "sync", "freeze", "battery",
];

fn synthetic_text(seed: usize) -> String {
    (0..12)
        .map(|i| WORDS[(seed.wrapping_mul(31) + i * 7 + seed / (i + 1)) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_index(embedder: &HashEmbedder, size: usize) -> SimilarityIndex {
    let index = SimilarityIndex::new(embedder.dims());
    for i in 0..size {
        let vector = embedder.embed(&synthetic_text(i)).unwrap_or_default();
        let _ = index.insert(&format!("bug-{i:08}"), &vector);
    }
    index
}

fn bench_query(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let mut group = c.benchmark_group("index.query_top10");

    for size in SIZES {
        let index = build_index(&embedder, size);
        let query = embedder
            .embed(&synthetic_text(size / 2))
            .unwrap_or_default();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &query, |b, query| {
            b.iter(|| black_box(index.query(query, 10).map(|hits| hits.len())));
        });
    }

    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let rows: Vec<(String, Vec<f32>)> = (0..10_000)
        .map(|i| {
            (
                format!("bug-{i:08}"),
                embedder.embed(&synthetic_text(i)).unwrap_or_default(),
            )
        })
        .collect();
    let index = SimilarityIndex::new(embedder.dims());

    c.bench_function("index.rebuild_10k", |b| {
        b.iter(|| black_box(index.rebuild(|| Ok(rows.clone())).map(|s| s.indexed)));
    });
}

criterion_group!(benches, bench_query, bench_rebuild);
criterion_main!(benches);
