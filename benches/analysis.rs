use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deep_research::clustering::{kmeans, pca};
use deep_research::research::actor::{select_top_k, ScoredChunk};
use deep_research::text::max_similarity;

const DIM: usize = 1536;

fn embeddings(n: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            (0..DIM)
                .map(|j| (((i * 31 + j * 17) % 97) as f32 / 97.0) - 0.5)
                .collect()
        })
        .collect()
}

fn bench_latent_topics(c: &mut Criterion) {
    let samples = embeddings(200);
    c.bench_function("pca_200x1536_to_10", |b| {
        b.iter(|| pca(black_box(&samples), 10))
    });

    let reduced = pca(&samples, 10);
    c.bench_function("kmeans_200_k8", |b| {
        b.iter(|| kmeans(black_box(&reduced), 8, 42))
    });
}

fn bench_scoring(c: &mut Criterion) {
    let known = embeddings(500);
    let candidate = embeddings(1).remove(0);
    c.bench_function("redundancy_against_500", |b| {
        b.iter(|| max_similarity(black_box(&candidate), &known))
    });

    let scored: Vec<ScoredChunk> = (0..400)
        .map(|i| ScoredChunk {
            score: ((i * 7919) % 1000) as f32 / 1000.0,
            text: format!("chunk {}", i),
            source_index: i % 20,
            embedding: Vec::new(),
        })
        .collect();
    c.bench_function("select_top_15_of_400", |b| {
        b.iter(|| select_top_k(black_box(scored.clone()), 15))
    });
}

criterion_group!(benches, bench_latent_topics, bench_scoring);
criterion_main!(benches);
