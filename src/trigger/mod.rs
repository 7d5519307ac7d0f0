// Change-feed trigger
// Receives one batch of changed items, runs the updater and hands the result to the sink

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::Value;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

use crate::document::DocumentError;
use crate::embeddings::EmbeddingBackend;
use crate::updater::EmbeddingUpdater;
use crate::{Result, SyncError};

/// How a batch is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchFormat {
    /// A single JSON array of documents
    #[default]
    Array,
    /// One JSON document per line
    Lines,
}

/// Destination for updated documents. Each item fully replaces the stored
/// item with the same `id`.
#[async_trait]
pub trait DocumentSink: Send {
    async fn upsert(&mut self, documents: Vec<Value>) -> Result<()>;
}

/// Sink that serializes each upserted batch to a writer.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    format: BatchFormat,
}

impl<W: Write + Send> WriterSink<W> {
    #[inline]
    pub fn new(writer: W, format: BatchFormat) -> Self {
        Self { writer, format }
    }

    #[inline]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> DocumentSink for WriterSink<W> {
    async fn upsert(&mut self, documents: Vec<Value>) -> Result<()> {
        let encode = |e: serde_json::Error| SyncError::Sink(e.to_string());
        match self.format {
            BatchFormat::Array => {
                serde_json::to_writer_pretty(&mut self.writer, &documents).map_err(encode)?;
                writeln!(self.writer)?;
            }
            BatchFormat::Lines => {
                for document in &documents {
                    serde_json::to_writer(&mut self.writer, document).map_err(encode)?;
                    writeln!(self.writer)?;
                }
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Read one change batch. Unparseable lines in [`BatchFormat::Lines`] input,
/// including lines that are not UTF-8, are skipped; an unparseable array fails
/// the read.
pub fn read_batch<R: BufRead>(reader: R, format: BatchFormat) -> Result<Vec<Value>> {
    match format {
        BatchFormat::Array => {
            let value: Value = serde_json::from_reader(reader)
                .map_err(|e| DocumentError::Parse(e.to_string()))?;
            Ok(match value {
                Value::Array(items) => items,
                single => vec![single],
            })
        }
        BatchFormat::Lines => {
            let mut items = Vec::new();
            // Split on raw bytes so a line that is not valid UTF-8 is skipped
            // like any other unparseable line instead of failing the batch.
            for (number, line) in reader.split(b'\n').enumerate() {
                let line = line?;
                if line.trim_ascii().is_empty() {
                    continue;
                }
                match serde_json::from_slice::<Value>(&line) {
                    Ok(value) => items.push(value),
                    Err(e) => warn!("Skipping unparseable line {}: {}", number + 1, e),
                }
            }
            Ok(items)
        }
    }
}

/// Handles change batches for one collection.
pub struct ChangeFeedHandler<B, S> {
    updater: EmbeddingUpdater<B>,
    sink: S,
}

impl<B, S> ChangeFeedHandler<B, S>
where
    B: EmbeddingBackend,
    S: DocumentSink,
{
    #[inline]
    pub fn new(updater: EmbeddingUpdater<B>, sink: S) -> Self {
        Self { updater, sink }
    }

    #[inline]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    #[inline]
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process one delivered batch and return how many documents were written.
    ///
    /// Nothing reaches the sink unless the whole batch succeeded, so a failed
    /// call can simply be redelivered.
    pub async fn handle(&mut self, batch: Vec<Value>) -> Result<usize> {
        if batch.is_empty() {
            debug!("Received empty change batch");
            return Ok(0);
        }

        info!("Documents modified: {}", batch.len());

        let updated = self.updater.update_raw(batch).await?;
        if updated.is_empty() {
            info!("No documents need new embeddings");
            return Ok(0);
        }

        let count = updated.len();
        self.sink.upsert(updated).await?;
        info!("Wrote {} updated documents", count);
        Ok(count)
    }
}
