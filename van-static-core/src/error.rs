//! Error type shared by every stage of the publishing pipeline.

use std::path::PathBuf;
use std::process::ExitStatus;

/// Everything that can go wrong while walking, stamping, minifying or publishing.
///
/// Configuration problems (`Config`, `InvalidResourceSpec`, `UnsupportedScheme`,
/// `UnsupportedEncoding`) are raised by [`crate::extract::extract`] before any I/O.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid resource spec {0:?}: expected \"package:path\"")]
    InvalidResourceSpec(String),

    #[error("unsupported target scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("unsupported encoding {0:?}")]
    UnsupportedEncoding(String),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("minifier failed on {} ({status})", path.display())]
    Minify { path: PathBuf, status: ExitStatus },

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl PublishError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PublishError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by the caller's configuration rather than by I/O.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PublishError::Config(_)
                | PublishError::InvalidResourceSpec(_)
                | PublishError::UnsupportedScheme(_)
                | PublishError::UnsupportedEncoding(_)
        )
    }
}

pub type PublishResult<T> = Result<T, PublishError>;
