
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::{EmbeddingBackend, EmbeddingError};
use crate::config::EmbeddingConfig;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;

/// Client for an Azure OpenAI embeddings deployment.
///
/// `ureq` is blocking, so each request runs on tokio's blocking pool and the
/// async `embed` call is the only suspension point.
#[derive(Clone)]
pub struct AzureOpenAiClient {
    url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff: Duration,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    dimensions: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

impl fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("url", &self.url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("retry_attempts", &self.retry_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl AzureOpenAiClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let url = config
            .embeddings_url()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        Ok(Self {
            url,
            api_key: config.api_key.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts.max(1),
            backoff: DEFAULT_BACKOFF,
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles on each further attempt.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Issue one embeddings request for all `inputs`, blocking the calling thread.
    pub fn embed_blocking(
        &self,
        inputs: &[String],
        dimensions: u32,
    ) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Requesting {} embeddings with {} dimensions from {}",
            inputs.len(),
            dimensions,
            self.url
        );

        let request = EmbeddingsRequest {
            input: inputs,
            dimensions,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Request(format!("failed to serialize request: {e}")))?;

        let response_text = self.make_request_with_retry(|| {
            let mut request = self
                .agent
                .post(self.url.as_str())
                .header("Content-Type", "application/json");
            if let Some(api_key) = &self.api_key {
                request = request.header("api-key", api_key.as_str());
            }
            request
                .send(request_json.as_str())
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let vectors = parse_response(&response_text, inputs.len())?;
        debug!("Received {} embeddings", vectors.len());
        Ok(vectors)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String, EmbeddingError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let failure = match &error {
                        ureq::Error::StatusCode(429) => {
                            warn!(
                                "Rate limited (status 429), attempt {}/{}",
                                attempt, self.retry_attempts
                            );
                            EmbeddingError::RateLimited
                        }
                        ureq::Error::StatusCode(status) if *status >= 500 => {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.retry_attempts
                            );
                            EmbeddingError::Status(*status)
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(EmbeddingError::Status(*status));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            EmbeddingError::Transport(error.to_string())
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(EmbeddingError::Transport(error.to_string()));
                        }
                    };

                    last_error = Some(failure);

                    if attempt < self.retry_attempts {
                        let delay = self.backoff * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.url);

        Err(last_error.unwrap_or_else(|| {
            EmbeddingError::Transport("request failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl EmbeddingBackend for AzureOpenAiClient {
    async fn embed(
        &self,
        inputs: &[String],
        dimensions: u32,
    ) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.clone();
        let inputs = inputs.to_vec();
        tokio::task::spawn_blocking(move || client.embed_blocking(&inputs, dimensions))
            .await
            .map_err(|e| EmbeddingError::Interrupted(e.to_string()))?
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Decode the response body into vectors ordered by their `index`.
fn parse_response(body: &str, expected: usize) -> Result<Vec<Vec<f64>>, EmbeddingError> {
    let mut response: EmbeddingsResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

    if response.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: response.data.len(),
        });
    }

    response.data.sort_by_key(|entry| entry.index);
    if let Some((position, entry)) = response
        .data
        .iter()
        .enumerate()
        .find(|(position, entry)| entry.index != *position)
    {
        return Err(EmbeddingError::MalformedResponse(format!(
            "expected index {position}, found {}",
            entry.index
        )));
    }

    Ok(response
        .data
        .into_iter()
        .map(|entry| entry.embedding)
        .collect())
}
