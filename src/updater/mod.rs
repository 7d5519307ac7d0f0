// Embedding updater
// Re-embeds the documents whose text changed, using one backend request per batch


use serde_json::Value;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::{Config, FieldNames};
use crate::document::Document;
use crate::embeddings::{EmbeddingBackend, validate_vectors};
use crate::filter::ChangeFilter;

/// A document the change filter flagged, with the values its update will carry.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub document: Document,
    pub new_hash: String,
    pub text: String,
}

pub struct EmbeddingUpdater<B> {
    backend: B,
    filter: ChangeFilter,
    names: FieldNames,
    dimensions: u32,
}

impl<B: EmbeddingBackend> EmbeddingUpdater<B> {
    #[inline]
    pub fn new(backend: B, names: FieldNames, dimensions: u32) -> Self {
        Self {
            filter: ChangeFilter::new(&names),
            backend,
            names,
            dimensions,
        }
    }

    #[inline]
    pub fn from_config(backend: B, config: &Config) -> Self {
        Self::new(
            backend,
            config.fields.clone(),
            config.embedding.dimensions,
        )
    }

    #[inline]
    pub fn names(&self) -> &FieldNames {
        &self.names
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the change filter over `batch`, keeping only documents that need a new
    /// embedding. Relative order is preserved.
    #[inline]
    pub fn plan(&self, batch: Vec<Document>) -> Vec<PendingUpdate> {
        batch
            .into_iter()
            .filter_map(|document| {
                let decision = self.filter.decide(&document);
                if decision.needs_update {
                    debug!("Document {} needs a new embedding", document.id());
                    let text = document.text(self.filter.embed_field()).to_string();
                    Some(PendingUpdate {
                        document,
                        new_hash: decision.new_hash,
                        text,
                    })
                } else {
                    debug!("Document {} is unchanged, skipping", document.id());
                    None
                }
            })
            .collect()
    }

    /// Embed every changed document in `batch` and return the updated documents.
    ///
    /// An empty result means nothing needs to be written. Any backend failure
    /// fails the whole batch; no document is returned in that case.
    ///
    /// The updater itself never retries. The Azure OpenAI client repeats a
    /// throttled or failed request only when `retry_attempts` is above 1 (the
    /// default is 1), and it sleeps between attempts on a blocking worker thread.
    pub async fn update(&self, batch: Vec<Document>) -> Result<Vec<Document>> {
        let received = batch.len();
        let pending = self.plan(batch);

        if pending.is_empty() {
            debug!("No changed documents in batch of {}", received);
            return Ok(Vec::new());
        }

        info!(
            "Generating embeddings for {} of {} documents",
            pending.len(),
            received
        );

        let (texts, targets): (Vec<String>, Vec<(Document, String)>) = pending
            .into_iter()
            .map(|update| (update.text, (update.document, update.new_hash)))
            .unzip();

        let vectors = self.backend.embed(&texts, self.dimensions).await?;
        validate_vectors(&vectors, texts.len(), self.dimensions)?;

        let updated = targets
            .into_iter()
            .zip(vectors)
            .map(|((document, new_hash), vector)| document.with_embedding(vector, new_hash))
            .collect();

        Ok(updated)
    }

    /// Parse raw change-feed items into documents. Items that cannot be
    /// parsed are logged and left out; they never fail the batch.
    #[inline]
    pub fn parse_batch(&self, batch: Vec<Value>) -> Vec<Document> {
        batch
            .into_iter()
            .enumerate()
            .filter_map(|(position, value)| match Document::from_value(value, &self.names) {
                Ok(document) => Some(document),
                Err(e) => {
                    warn!("Skipping malformed document at position {}: {}", position, e);
                    None
                }
            })
            .collect()
    }

    /// [`update`](Self::update) over raw JSON items, returning the items to write back.
    pub async fn update_raw(&self, batch: Vec<Value>) -> Result<Vec<Value>> {
        let documents = self.parse_batch(batch);
        let updated = self.update(documents).await?;
        Ok(updated
            .into_iter()
            .map(|document| document.into_value(&self.names))
            .collect())
    }
}
