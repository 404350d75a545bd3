//! Export output targets.
//!
//! File I/O is an external collaborator: the export engine only checks
//! for conflicts and writes documents through [`ExportSink`], which keeps
//! the all-or-nothing pre-flight testable without touching a disk.

pub mod fs;

use std::collections::BTreeMap;

/// Error type for sink writes.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Underlying I/O failure.
    #[error("write to {name} failed: {source}")]
    Io {
        /// Target name the write was for.
        name: String,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// An output target for export documents.
pub trait ExportSink {
    /// Whether a document with this name already exists.
    fn exists(&self, name: &str) -> bool;

    /// Write a document. Overwrites are the caller's responsibility to
    /// prevent; the sink does not re-check.
    fn write(&mut self, name: &str, contents: &str) -> Result<(), SinkError>;
}

/// In-memory sink for tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    documents: BTreeMap<String, String>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a document, e.g. to provoke a pre-flight conflict.
    pub fn preload(&mut self, name: impl Into<String>, contents: impl Into<String>) {
        self.documents.insert(name.into(), contents.into());
    }

    /// Read a written document back.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.documents.get(name).map(|s| s.as_str())
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the sink holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl ExportSink for MemorySink {
    fn exists(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<(), SinkError> {
        self.documents.insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

pub use fs::DirSink;
