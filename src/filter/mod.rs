// Change filter
// Decides from the content hash whether a document needs a fresh embedding

#[cfg(test)]
mod tests;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::FieldNames;
use crate::document::Document;

/// Outcome of checking one document against its stored hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub needs_update: bool,
    pub new_hash: String,
}

/// Lowercase hex SHA-256 of `text`.
#[inline]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ChangeFilter {
    embed_field: String,
}

impl ChangeFilter {
    #[inline]
    pub fn new(names: &FieldNames) -> Self {
        Self {
            embed_field: names.embed.clone(),
        }
    }

    #[inline]
    pub fn embed_field(&self) -> &str {
        &self.embed_field
    }

    /// Hash the embed field and compare it with the stored hash.
    ///
    /// A document without a stored hash has never been embedded and always
    /// needs an update. A stored hash that is not a string never matches.
    #[inline]
    pub fn decide(&self, document: &Document) -> Decision {
        let new_hash = content_hash(document.text(&self.embed_field));
        let needs_update = match document.stored_hash() {
            None => true,
            Some(Value::String(stored)) => *stored != new_hash,
            Some(_) => true,
        };

        Decision {
            needs_update,
            new_hash,
        }
    }
}
