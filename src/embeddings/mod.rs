// Embeddings module
// Backend abstraction for turning text into vectors, plus the Azure OpenAI client


pub mod azure_openai;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use azure_openai::AzureOpenAiClient;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Failed to build embedding request: {0}")]
    Request(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Embedding service rejected the request: HTTP {0}")]
    Status(u16),

    #[error("Embedding service is throttling requests (HTTP 429)")]
    RateLimited,

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Embedding service returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Vector {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Embedding task did not complete: {0}")]
    Interrupted(String),
}

/// Something that maps an ordered list of texts to one vector per text.
///
/// Implementations must return vectors in input order. A failure covers the
/// whole request; partial results are never returned.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(
        &self,
        inputs: &[String],
        dimensions: u32,
    ) -> Result<Vec<Vec<f64>>, EmbeddingError>;
}

/// Check that a response holds exactly one vector of the requested length per input.
#[inline]
pub fn validate_vectors(
    vectors: &[Vec<f64>],
    expected_count: usize,
    dimensions: u32,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }

    let expected = dimensions as usize;
    if let Some((index, vector)) = vectors
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != expected)
    {
        return Err(EmbeddingError::DimensionMismatch {
            index,
            expected,
            actual: vector.len(),
        });
    }

    Ok(())
}

/// Send a single short input and verify the backend answers with the configured dimensionality.
#[inline]
pub async fn probe<B>(backend: &B, dimensions: u32) -> Result<(), EmbeddingError>
where
    B: EmbeddingBackend + ?Sized,
{
    debug!("Probing embedding backend with {} dimensions", dimensions);
    let inputs = vec!["ping".to_string()];
    let vectors = backend.embed(&inputs, dimensions).await?;
    validate_vectors(&vectors, inputs.len(), dimensions)
}
