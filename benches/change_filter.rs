use criterion::{Criterion, criterion_group, criterion_main};
use embedding_sync::config::FieldNames;
use embedding_sync::document::Document;
use embedding_sync::filter::{ChangeFilter, content_hash};
use serde_json::json;
use std::hint::black_box;

pub fn criterion_benchmark(c: &mut Criterion) {
    let names = FieldNames::new("text", "hash", "vectors");
    let text =
        "Azure Cosmos DB is a fully managed NoSQL, relational, and vector database. ".repeat(64);
    let filter = ChangeFilter::new(&names);

    let batch: Vec<Document> = (0..100)
        .map(|i| {
            let hash = if i % 2 == 0 {
                content_hash(&text)
            } else {
                "stale".to_string()
            };
            Document::from_value(
                json!({
                    "id": i.to_string(),
                    "text": text,
                    "hash": hash,
                    "vectors": vec![0.5_f64; 1536],
                    "_etag": "\"0000\"",
                    "_ts": 1_700_000_000
                }),
                &names,
            )
            .expect("can build document")
        })
        .collect();

    c.bench_function("decide_batch", |b| {
        b.iter(|| {
            batch
                .iter()
                .filter(|document| filter.decide(black_box(document)).needs_update)
                .count()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
