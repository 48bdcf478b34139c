use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A document as handed to the store: field name to JSON value.
pub type Document = Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse template {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("template must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Immutable sample document every synthesized insert is cloned from.
#[derive(Clone, Debug)]
pub struct Template {
    fields: Arc<Document>,
}

impl Template {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, TemplateError> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields: Arc::new(fields),
            }),
            other => Err(TemplateError::NotAnObject(kind_of(&other))),
        }
    }

    /// Small built-in document used when no template file is configured.
    pub fn sample() -> Self {
        let mut fields = Document::new();
        fields.insert("kind".into(), Value::from("synthetic"));
        fields.insert("name".into(), Value::from("docdb-bench sample"));
        fields.insert("quantity".into(), Value::from(42));
        fields.insert("price".into(), Value::from(19.99));
        fields.insert("tags".into(), Value::from(vec!["load", "test"]));
        Self {
            fields: Arc::new(fields),
        }
    }

    pub fn fields(&self) -> &Document {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Copy the template and stamp a fresh v4 UUID into `partition_key`.
/// The field is added when the template lacks it.
pub fn synthesize(template: &Template, partition_key: &str) -> Document {
    let mut doc = template.fields().clone();
    doc.insert(
        partition_key.to_string(),
        Value::String(uuid::Uuid::new_v4().to_string()),
    );
    doc
}

/// Build `count` synthesized documents for one submission.
pub fn synthesize_batch(template: &Template, partition_key: &str, count: usize) -> Vec<Document> {
    (0..count)
        .map(|_| synthesize(template, partition_key))
        .collect()
}
