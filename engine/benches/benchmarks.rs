//! Benchmarks for storysync-engine
//!
//! Run with: cargo bench -p storysync-engine

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use storysync_engine::{
    CollectionKind, ConflictResolver, Document, DocumentStore, Entity, SaveScheduler,
};

fn document(entities_per_collection: usize, offset: i64) -> Document {
    let epoch = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut doc = Document::new_empty("bench", "Bench", epoch);
    for kind in CollectionKind::ALL {
        let collection = doc.collection_mut(kind);
        for i in 0..entities_per_collection {
            let at = Utc
                .timestamp_opt(1_700_000_000 + (i as i64 * 7 + offset) % 100, 0)
                .unwrap();
            collection.push(
                Entity::new(format!("{}-{i}", kind.as_str()), at)
                    .with_field("name", json!(format!("entity {i}")))
                    .with_field("summary", json!("lorem ipsum dolor sit amet")),
            );
        }
    }
    doc
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let resolver = ConflictResolver::default();

    for size in [10, 100, 1000] {
        let local = document(size, 0);
        let remote = document(size, 3);
        group.bench_with_input(BenchmarkId::new("documents", size), &size, |b, _| {
            b.iter(|| resolver.merge(black_box(&local), black_box(&remote)))
        });
    }

    group.finish();
}

fn bench_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");

    for size in [10, 100, 1000] {
        let doc = document(size, 0);
        group.bench_with_input(BenchmarkId::new("apply_mutation", size), &size, |b, _| {
            let mut store = DocumentStore::with_document(doc.clone());
            let at = Utc.timestamp_opt(1_700_000_500, 0).unwrap();
            b.iter(|| {
                store
                    .apply_mutation(|d| d.upsert_entity(CollectionKind::Scenes, Entity::new("scenes-0", at)))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_scheduler(c: &mut Criterion) {
    c.bench_function("scheduler/burst_1000", |b| {
        b.iter(|| {
            let mut scheduler = SaveScheduler::default();
            let mut fired = 0;
            for t in 0..1000u64 {
                scheduler.on_mutation(t * 100);
                if scheduler.poll(t * 100).is_some() {
                    fired += 1;
                }
            }
            black_box(fired)
        })
    });
}

criterion_group!(benches, bench_merge, bench_mutation, bench_scheduler);
criterion_main!(benches);
