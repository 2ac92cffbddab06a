//! Benchmarks for sentence encoding and classifier inference
//!
//! Run with: cargo bench --bench inference

use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use burn::backend::NdArray;
use burn_textcnn::{
    embeddings::{EmbeddingLookup, WordVectors},
    pipelines::text_classification::{
        ClassifierConfig, Predictor, Provenance, SentenceEncoder, TrainedModel,
    },
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

type Backend = NdArray;

const DIM: usize = 50;

fn embeddings() -> Arc<dyn EmbeddingLookup> {
    let pairs = (0..1_000).map(|i| {
        let vector = (0..DIM).map(|j| ((i * DIM + j) % 17) as f32 / 17.0).collect();

        (format!("w{i}"), vector)
    });

    Arc::new(WordVectors::from_pairs(DIM, pairs).expect("valid vectors"))
}

fn sentence(tokens: usize) -> String {
    (0..tokens)
        .map(|i| format!("w{}", (i * 37) % 1_200))
        .collect::<Vec<_>>()
        .join(" ")
}

fn bench_encoding(c: &mut Criterion) {
    let device = Default::default();
    let encoder = SentenceEncoder::new(embeddings(), 64);

    let mut group = c.benchmark_group("encode_batch");

    for batch_size in [1, 8, 32] {
        let texts: Vec<String> = (0..batch_size).map(|_| sentence(40)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(batch_size), &texts, |b, texts| {
            b.iter(|| black_box(encoder.encode_batch::<Backend, _>(texts, &device)));
        });
    }

    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let device = Default::default();
    let embeddings = embeddings();

    let labels: BTreeSet<String> = ["negative", "neutral", "positive"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let config = ClassifierConfig::new()
        .with_embedding_dim(DIM)
        .with_max_seq_length(64)
        .with_feature_maps(32)
        .with_labels(&labels);

    let model = config.init::<Backend>(&device);
    let trained = TrainedModel::new(
        config,
        model,
        PathBuf::from("unused"),
        Provenance::Trained,
        false,
    );

    let predictor = Predictor::<Backend>::new(embeddings, device);
    let text = sentence(40);

    c.bench_function("predict", |b| {
        b.iter(|| black_box(predictor.predict(&text, &trained).expect("prediction")));
    });
}

criterion_group!(benches, bench_encoding, bench_predict);

criterion_main!(benches);
