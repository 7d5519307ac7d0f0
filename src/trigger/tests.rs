use super::*;
use crate::config::FieldNames;
use crate::embeddings::EmbeddingError;
use crate::filter::content_hash;
use serde_json::json;
use std::io::Cursor;
use std::time::Duration;

struct ConstantBackend;

#[async_trait]
impl EmbeddingBackend for ConstantBackend {
    async fn embed(
        &self,
        inputs: &[String],
        dimensions: u32,
    ) -> std::result::Result<Vec<Vec<f64>>, EmbeddingError> {
        Ok(inputs.iter().map(|_| vec![0.5; dimensions as usize]).collect())
    }
}

struct DownBackend;

#[async_trait]
impl EmbeddingBackend for DownBackend {
    async fn embed(
        &self,
        _inputs: &[String],
        _dimensions: u32,
    ) -> std::result::Result<Vec<Vec<f64>>, EmbeddingError> {
        Err(EmbeddingError::Transport("connection refused".to_string()))
    }
}

/// Backend whose request never completes.
struct StalledBackend;

#[async_trait]
impl EmbeddingBackend for StalledBackend {
    async fn embed(
        &self,
        _inputs: &[String],
        _dimensions: u32,
    ) -> std::result::Result<Vec<Vec<f64>>, EmbeddingError> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct MemorySink {
    batches: Vec<Vec<Value>>,
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn upsert(&mut self, documents: Vec<Value>) -> Result<()> {
        self.batches.push(documents);
        Ok(())
    }
}

fn handler<B: EmbeddingBackend>(backend: B) -> ChangeFeedHandler<B, MemorySink> {
    let updater = EmbeddingUpdater::new(backend, FieldNames::new("text", "hash", "vectors"), 2);
    ChangeFeedHandler::new(updater, MemorySink::default())
}

#[tokio::test]
async fn writes_updated_documents_to_sink() {
    let mut handler = handler(ConstantBackend);
    let written = handler
        .handle(vec![
            json!({"id": "1", "text": "new"}),
            json!({"id": "2", "text": "same", "hash": content_hash("same")}),
        ])
        .await
        .expect("batch should succeed");

    assert_eq!(written, 1);
    assert_eq!(
        handler.sink().batches,
        vec![vec![json!({
            "id": "1",
            "text": "new",
            "vectors": [0.5, 0.5],
            "hash": content_hash("new")
        })]]
    );
}

#[tokio::test]
async fn nothing_reaches_sink_when_unchanged() {
    let mut handler = handler(ConstantBackend);
    let written = handler
        .handle(vec![json!({"id": "1", "text": "same", "hash": content_hash("same")})])
        .await
        .expect("batch should succeed");

    assert_eq!(written, 0);
    assert!(handler.sink().batches.is_empty());

    let written = handler.handle(Vec::new()).await.expect("batch should succeed");
    assert_eq!(written, 0);
    assert!(handler.into_sink().batches.is_empty());
}

#[tokio::test]
async fn failed_batch_writes_nothing() {
    let mut handler = handler(DownBackend);
    let result = handler
        .handle(vec![json!({"id": "1", "text": "new"})])
        .await;

    assert!(matches!(
        result,
        Err(SyncError::Embedding(EmbeddingError::Transport(_)))
    ));
    assert!(handler.sink().batches.is_empty());
}

#[tokio::test]
async fn cancelled_batch_writes_nothing() {
    let updater =
        EmbeddingUpdater::new(StalledBackend, FieldNames::new("text", "hash", "vectors"), 2);
    let mut handler =
        ChangeFeedHandler::new(updater, WriterSink::new(Vec::new(), BatchFormat::Lines));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        handler.handle(vec![
            json!({"id": "1", "text": "new"}),
            json!({"id": "2", "text": "also new"}),
        ]),
    )
    .await;

    assert!(outcome.is_err(), "stalled batch should not complete");
    assert!(handler.into_sink().into_inner().is_empty());
}

#[test]
fn reads_array_batches() {
    let input = r#"[{"id": "1", "text": "a"}, {"id": "2", "text": "b"}]"#;
    let batch = read_batch(Cursor::new(input), BatchFormat::Array).expect("should read batch");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1]["id"], json!("2"));

    let single = read_batch(Cursor::new(r#"{"id": "1"}"#), BatchFormat::Array)
        .expect("should read single document");
    assert_eq!(single, vec![json!({"id": "1"})]);

    assert!(read_batch(Cursor::new("[{"), BatchFormat::Array).is_err());
}

#[test]
fn reads_line_batches_skipping_bad_lines() {
    let input = "{\"id\": \"1\"}\n\nnot json\n{\"id\": \"2\"}\n";
    let batch = read_batch(Cursor::new(input), BatchFormat::Lines).expect("should read batch");
    assert_eq!(batch, vec![json!({"id": "1"}), json!({"id": "2"})]);
}

#[test]
fn reads_line_batches_skipping_invalid_utf8() {
    let mut input = b"{\"id\":\"1\",\"text\":\"a\"}\n".to_vec();
    input.extend_from_slice(b"{\"id\":\"2\",\"text\":\"\xff\xfe\"}\n");
    input.extend_from_slice(b"{\"id\":\"3\",\"text\":\"c\"}\r\n");

    let batch = read_batch(Cursor::new(input), BatchFormat::Lines).expect("should read batch");
    let ids: Vec<&str> = batch.iter().filter_map(|v| v["id"].as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
}

#[tokio::test]
async fn writer_sink_formats() {
    let documents = vec![json!({"id": "1"}), json!({"id": "2"})];

    let mut lines = WriterSink::new(Vec::new(), BatchFormat::Lines);
    lines
        .upsert(documents.clone())
        .await
        .expect("should write lines");
    let output = String::from_utf8(lines.into_inner()).expect("output should be utf-8");
    assert_eq!(output, "{\"id\":\"1\"}\n{\"id\":\"2\"}\n");

    let mut array = WriterSink::new(Vec::new(), BatchFormat::Array);
    array.upsert(documents.clone()).await.expect("should write array");
    let output = array.into_inner();
    let parsed: Vec<Value> = serde_json::from_slice(&output).expect("output should be json");
    assert_eq!(parsed, documents);
}
