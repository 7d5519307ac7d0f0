
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::document::{ID_FIELD, SYSTEM_FIELDS};

pub const DEFAULT_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Attempts per embedding request. One attempt means the client never retries
/// on its own; a failed batch is left to the change feed to redeliver.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
pub const MAX_EMBEDDING_DIMENSIONS: u32 = 8192;

pub const ENV_EMBED_FIELD: &str = "EMBED_PROPERTY";
pub const ENV_HASH_FIELD: &str = "HASH_PROPERTY";
pub const ENV_VECTOR_FIELD: &str = "VECTOR_PROPERTY";
pub const ENV_ENDPOINT: &str = "OPENAI_ENDPOINT";
pub const ENV_API_KEY: &str = "OPENAI_KEY";
pub const ENV_DEPLOYMENT: &str = "OPENAI_DEPLOYMENT_NAME";
pub const ENV_DIMENSIONS: &str = "OPENAI_DIMENSIONS";
pub const ENV_API_VERSION: &str = "OPENAI_API_VERSION";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub fields: FieldNames,
    pub embedding: EmbeddingConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Names of the document fields the handler reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldNames {
    pub embed: String,
    pub hash: String,
    pub vector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub deployment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_version: String,
    pub dimensions: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    DirectoryError,
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
    #[error("Invalid value for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("Field name for {0} cannot be empty")]
    EmptyFieldName(&'static str),
    #[error("Field name {0} is used for more than one purpose")]
    DuplicateFieldName(String),
    #[error("Field name {0} is reserved by the document store")]
    ReservedFieldName(String),
    #[error("Invalid endpoint URL: {0} (must be an http or https URL)")]
    InvalidEndpoint(String),
    #[error("Invalid deployment name: {0} (cannot be empty)")]
    InvalidDeployment(String),
    #[error("Invalid API version: {0} (cannot be empty)")]
    InvalidApiVersion(String),
    #[error("Invalid embedding dimensions: {0} (must be between 1 and 8192)")]
    InvalidDimensions(u32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Settings as read from disk, before environment overrides and required-field checks.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawConfig {
    fields: RawFieldNames,
    embedding: RawEmbeddingConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFieldNames {
    embed: Option<String>,
    hash: Option<String>,
    vector: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEmbeddingConfig {
    endpoint: Option<String>,
    deployment: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    dimensions: Option<u32>,
    timeout_seconds: Option<u64>,
    retry_attempts: Option<u32>,
}

impl RawConfig {
    pub(crate) fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay values from the process environment, or any other key lookup.
    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields = &mut self.fields;
        override_with(&mut fields.embed, lookup(ENV_EMBED_FIELD));
        override_with(&mut fields.hash, lookup(ENV_HASH_FIELD));
        override_with(&mut fields.vector, lookup(ENV_VECTOR_FIELD));

        let embedding = &mut self.embedding;
        override_with(&mut embedding.endpoint, lookup(ENV_ENDPOINT));
        override_with(&mut embedding.api_key, lookup(ENV_API_KEY));
        override_with(&mut embedding.deployment, lookup(ENV_DEPLOYMENT));
        override_with(&mut embedding.api_version, lookup(ENV_API_VERSION));

        if let Some(value) = lookup(ENV_DIMENSIONS) {
            let dimensions = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_DIMENSIONS,
                    value,
                })?;
            embedding.dimensions = Some(dimensions);
        }

        Ok(())
    }

    pub(crate) fn resolve(self, base_dir: PathBuf) -> Result<Config, ConfigError> {
        let RawConfig { fields, embedding } = self;

        let fields = FieldNames {
            embed: fields
                .embed
                .ok_or(ConfigError::MissingSetting("fields.embed"))?,
            hash: fields
                .hash
                .ok_or(ConfigError::MissingSetting("fields.hash"))?,
            vector: fields
                .vector
                .ok_or(ConfigError::MissingSetting("fields.vector"))?,
        };

        let embedding = EmbeddingConfig {
            endpoint: embedding
                .endpoint
                .ok_or(ConfigError::MissingSetting("embedding.endpoint"))?,
            deployment: embedding
                .deployment
                .ok_or(ConfigError::MissingSetting("embedding.deployment"))?,
            api_key: embedding.api_key.filter(|key| !key.trim().is_empty()),
            api_version: embedding
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            dimensions: embedding
                .dimensions
                .ok_or(ConfigError::MissingSetting("embedding.dimensions"))?,
            timeout_seconds: embedding
                .timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            retry_attempts: embedding.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
        };

        let config = Config {
            fields,
            embedding,
            base_dir,
        };
        config.validate()?;
        Ok(config)
    }
}

fn override_with(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *slot = Some(value);
    }
}

impl Config {
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".embedding-sync"))
            .or_else(|| dirs::config_dir().map(|config| config.join("embedding-sync")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, then apply environment overrides.
    ///
    /// A missing file is not an error as long as the environment supplies every
    /// required setting.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        Self::load_with(config_dir, |key| std::env::var(key).ok())
    }

    #[inline]
    pub fn load_with<P, F>(config_dir: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join("config.toml");

        let mut raw = if config_path.exists() {
            debug!("Reading configuration from {}", config_path.display());
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            RawConfig::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
        } else {
            debug!(
                "No config file at {}, using environment only",
                config_path.display()
            );
            RawConfig::default()
        };

        raw.apply_env(lookup)
            .context("Failed to apply environment overrides")?;

        raw.resolve(config_dir.to_path_buf())
            .context("Configuration validation failed")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fields.validate()?;
        self.embedding.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }
}

impl FieldNames {
    #[inline]
    pub fn new(embed: &str, hash: &str, vector: &str) -> Self {
        Self {
            embed: embed.to_string(),
            hash: hash.to_string(),
            vector: vector.to_string(),
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("fields.embed", &self.embed),
            ("fields.hash", &self.hash),
            ("fields.vector", &self.vector),
        ];

        for (setting, name) in named {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyFieldName(setting));
            }
            if name == ID_FIELD || SYSTEM_FIELDS.contains(&name.as_str()) {
                return Err(ConfigError::ReservedFieldName(name.clone()));
            }
        }

        if self.embed == self.hash || self.embed == self.vector {
            return Err(ConfigError::DuplicateFieldName(self.embed.clone()));
        }
        if self.hash == self.vector {
            return Err(ConfigError::DuplicateFieldName(self.hash.clone()));
        }

        Ok(())
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.deployment.trim().is_empty() {
            return Err(ConfigError::InvalidDeployment(self.deployment.clone()));
        }

        if self.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidApiVersion(self.api_version.clone()));
        }

        if !(1..=MAX_EMBEDDING_DIMENSIONS).contains(&self.dimensions) {
            return Err(ConfigError::InvalidDimensions(self.dimensions));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    /// Endpoint as a URL, normalised to end in `/` so relative joins append.
    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let mut endpoint = self.endpoint.trim().to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        let url =
            Url::parse(&endpoint).map_err(|_| ConfigError::InvalidEndpoint(self.endpoint.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        Ok(url)
    }

    /// Full URL of the deployment's embeddings operation.
    #[inline]
    pub fn embeddings_url(&self) -> Result<Url, ConfigError> {
        let path = format!("openai/deployments/{}/embeddings", self.deployment.trim());
        let mut url = self
            .endpoint_url()?
            .join(&path)
            .map_err(|_| ConfigError::InvalidDeployment(self.deployment.clone()))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }
}
