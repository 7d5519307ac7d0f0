// Document model
// Splits a raw change-feed item into the fields the handler owns and an ordered bag of everything else


use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::FieldNames;

pub const ID_FIELD: &str = "id";

/// Bookkeeping fields maintained by the document store. They are regenerated on
/// every write, so they are dropped on read and never re-emitted.
pub const SYSTEM_FIELDS: [&str; 6] = ["_rid", "_self", "_etag", "_attachments", "_lsn", "_ts"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
    #[error("document has no `id` field")]
    MissingId,
    #[error("document `id` must be a string, found {0}")]
    InvalidId(&'static str),
    #[error("failed to parse document: {0}")]
    Parse(String),
}

/// A single stored item as delivered by the change feed.
///
/// The hash and vector fields are held apart from the remaining fields so they
/// can only be replaced together. Everything else, including `id` and the embed
/// field, stays in `fields` in its original order.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    hash: Option<Value>,
    vector: Option<Value>,
    fields: Map<String, Value>,
}

impl Document {
    #[inline]
    pub fn from_value(value: Value, names: &FieldNames) -> Result<Self, DocumentError> {
        let object = match value {
            Value::Object(object) => object,
            other => return Err(DocumentError::NotAnObject(value_kind(&other))),
        };

        let id = match object.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(DocumentError::InvalidId(value_kind(other))),
            None => return Err(DocumentError::MissingId),
        };

        let mut hash = None;
        let mut vector = None;
        let mut fields = Map::with_capacity(object.len());

        for (key, value) in object {
            if SYSTEM_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if key == names.hash {
                hash = Some(value);
            } else if key == names.vector {
                vector = Some(value);
            } else {
                fields.insert(key, value);
            }
        }

        Ok(Self {
            id,
            hash,
            vector,
            fields,
        })
    }

    #[inline]
    pub fn from_json(json: &str, names: &FieldNames) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| DocumentError::Parse(e.to_string()))?;
        Self::from_value(value, names)
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The hash recorded when the vector was last generated, if any.
    #[inline]
    pub fn stored_hash(&self) -> Option<&Value> {
        self.hash.as_ref()
    }

    #[inline]
    pub fn vector(&self) -> Option<&Value> {
        self.vector.as_ref()
    }

    #[inline]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Text of the named field. Missing and non-string values read as empty.
    #[inline]
    pub fn text(&self, name: &str) -> &str {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Replace the vector and hash in one step.
    #[inline]
    #[must_use]
    pub fn with_embedding(mut self, vector: Vec<f64>, hash: String) -> Self {
        self.vector = Some(Value::Array(vector.into_iter().map(Value::from).collect()));
        self.hash = Some(Value::String(hash));
        self
    }

    /// Serialize back into the stored shape: original fields in order, then the
    /// vector field, then the hash field.
    #[inline]
    pub fn into_value(self, names: &FieldNames) -> Value {
        let mut object = self.fields;
        if let Some(vector) = self.vector {
            object.insert(names.vector.clone(), vector);
        }
        if let Some(hash) = self.hash {
            object.insert(names.hash.clone(), hash);
        }
        Value::Object(object)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
