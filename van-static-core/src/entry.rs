use std::path::PathBuf;
use std::sync::Arc;

use crate::resources::Distribution;

/// What a [`ResourceEntry`] stands for. Every consumer matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Dir,
    /// Idempotency marker written after a resource tree has been walked completely.
    Stamp,
}

/// The unit flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Slash-separated logical path inside the package.
    pub resource_path: String,
    /// Local path holding the bytes (or the directory, for `Dir`).
    pub filesystem_path: PathBuf,
    pub distribution_name: String,
    pub distribution: Arc<Distribution>,
    pub kind: EntryKind,
}

impl ResourceEntry {
    /// Same logical entry, bytes read from somewhere else.
    pub fn with_filesystem_path(&self, filesystem_path: PathBuf) -> Self {
        ResourceEntry {
            filesystem_path,
            ..self.clone()
        }
    }

    /// Final path segment of the logical path.
    pub fn basename(&self) -> &str {
        self.resource_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.resource_path)
    }
}
