//! Filesystem-backed export sink.

use std::path::{Path, PathBuf};

use super::{ExportSink, SinkError};

/// Sink writing documents as files under one directory.
///
/// Known limitation: `exists` and `write` are separate calls, so two
/// invocations racing on the same directory can interleave between the
/// pre-flight check and the writes.
#[derive(Debug, Clone)]
pub struct DirSink {
    root: PathBuf,
}

impl DirSink {
    /// Create a sink rooted at a directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path a document name maps to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// The sink's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ExportSink for DirSink {
    fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<(), SinkError> {
        std::fs::write(self.path_for(name), contents).map_err(|source| SinkError::Io {
            name: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_sink_sees_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken.json"), "{}").unwrap();

        let mut sink = DirSink::new(dir.path());
        assert!(sink.exists("taken.json"));
        assert!(!sink.exists("free.json"));

        sink.write("free.json", "{\"a\":1}").unwrap();
        let read = std::fs::read_to_string(dir.path().join("free.json")).unwrap();
        assert_eq!(read, "{\"a\":1}");
    }
}
