//! Knowledge store: loads bundled JSON assets into an immutable [`Document`].
//!
//! The document is kept as an untyped `serde_json` tree. Nothing mutates it
//! after load; the matcher only ever borrows it.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure to produce a [`Document`] from an asset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("knowledge asset '{name}' could not be read: {source}")]
    Missing {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("knowledge asset '{name}' is not valid JSON: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("knowledge asset '{name}' must be a JSON object at the top level")]
    NotAnObject { name: String },
}

/// The parsed knowledge base: a top-level JSON mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    root: Map<String, Value>,
}

impl Document {
    /// Parses a JSON string. `name` is only used in error messages.
    pub fn parse(name: &str, json: &str) -> Result<Self, LoadError> {
        let value: Value = serde_json::from_str(json).map_err(|source| LoadError::Malformed {
            name: name.to_string(),
            source,
        })?;
        Self::from_value(name, value)
    }

    pub fn from_value(name: &str, value: Value) -> Result<Self, LoadError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(LoadError::NotAnObject {
                name: name.to_string(),
            }),
        }
    }

    /// Top-level entries in traversal order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.root.iter()
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

/// Resolves asset names against a directory of bundled resources.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    assets_dir: PathBuf,
}

impl KnowledgeStore {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
        }
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    /// Reads and parses the named asset.
    pub fn load(&self, name: &str) -> Result<Document, LoadError> {
        let path = self.assets_dir.join(name);
        let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Missing {
            name: name.to_string(),
            source,
        })?;
        let doc = Document::parse(name, &content)?;
        tracing::debug!(asset = name, entries = doc.len(), "loaded knowledge asset");
        Ok(doc)
    }
}
