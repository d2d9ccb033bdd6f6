//! Benchmarks for score derivation and checkpoint access.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resumeflow::checkpoint::{CheckpointEntry, CheckpointStore, InMemorySessionStorage};
use resumeflow::core::StageName;
use resumeflow::models::AlignmentScores;
use resumeflow::pipeline::scoring::{alignment_percentage, preservation_percentage};
use resumeflow::testing::{sample_generated, sample_preservation};
use std::sync::Arc;
use uuid::Uuid;

fn scoring_benchmark(c: &mut Criterion) {
    let requirements: Vec<String> = (0..40).map(|i| format!("skill-{i}")).collect();
    let names: Vec<&str> = requirements.iter().map(String::as_str).collect();
    let scores = (0..12).fold(AlignmentScores::new(), |scores, group| {
        scores.with_group(format!("group-{group}"), &names[..25], &names[25..])
    });
    let preservation = sample_preservation();

    c.bench_function("alignment_percentage", |b| {
        b.iter(|| alignment_percentage(black_box(&scores), 0));
    });
    c.bench_function("preservation_percentage", |b| {
        b.iter(|| preservation_percentage(black_box(&preservation), 0));
    });
}

fn checkpoint_benchmark(c: &mut Criterion) {
    let store = CheckpointStore::new(Arc::new(InMemorySessionStorage::new()), "bench");
    let entry = CheckpointEntry::completed(
        StageName::Generate,
        serde_json::to_value(sample_generated()).unwrap_or_default(),
        Uuid::now_v7(),
    );

    c.bench_function("checkpoint_round_trip", |b| {
        b.iter(|| {
            tokio_test::block_on(async {
                store.put(black_box(&entry)).await.ok();
                black_box(store.get(StageName::Generate).await.ok())
            })
        });
    });
}

criterion_group!(benches, scoring_benchmark, checkpoint_benchmark);
criterion_main!(benches);
