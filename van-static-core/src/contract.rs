//! # contract: the seams of the publishing pipeline
//!
//! Three traits separate the pipeline from the outside world:
//!
//! - [`ResourceProvider`] resolves packages and lists their resource trees.
//!   [`crate::resources::PackageIndex`] is the directory-backed implementation.
//! - [`Sink`] consumes the final entry stream. Implementations live in
//!   [`crate::sink`] and are selected by target scheme.
//! - [`ObjectStore`] is the minimal bucket API the remote sink needs. It is
//!   async so that real clients can sit on top of an SDK; the remote sink
//!   drives it from its own runtime.
//!
//! ## Mocking & Testing
//! `ObjectStore` is annotated for `mockall`; the generated `MockObjectStore`
//! is exported when the `test-export-mocks` feature is enabled (the default).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::entry::ResourceEntry;
use crate::error::PublishResult;
use crate::resources::Distribution;
use crate::sink::PublishReport;

/// The pull-based stream of entries handed from one stage to the next.
pub type EntryStream<'a> = dyn Iterator<Item = PublishResult<ResourceEntry>> + 'a;

/// Package-resource resolution over a logical, slash-separated namespace.
pub trait ResourceProvider {
    /// Resolve the package's metadata. Unknown names fail with `PackageNotFound`.
    fn distribution(&self, package: &str) -> PublishResult<Arc<Distribution>>;

    /// Names of the members of a resource directory, in listing order.
    fn list_dir(&self, package: &str, resource_path: &str) -> PublishResult<Vec<String>>;

    fn is_dir(&self, package: &str, resource_path: &str) -> PublishResult<bool>;

    /// Absolute filesystem path of a resource.
    fn filename(&self, package: &str, resource_path: &str) -> PublishResult<PathBuf>;
}

/// A publishing target.
///
/// All methods take `&self` except `close`: the stamp filter queries
/// `has_stamp` while `put` is still pulling entries from it.
pub trait Sink {
    /// Consume the stream until it ends or yields an error.
    fn put(&self, entries: &mut EntryStream<'_>) -> PublishResult<PublishReport>;

    /// Whether `resource_path` of `distribution` is already present at the target.
    fn has_stamp(&self, distribution: &Distribution, resource_path: &str) -> PublishResult<bool>;

    /// Release whatever the sink holds. Safe to call more than once.
    fn close(&mut self) -> PublishResult<()>;
}

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// One object upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub key: String,
    /// Local file whose bytes become the object body.
    pub source: PathBuf,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: String,
}

/// Minimal bucket operations used by [`crate::sink::remote::RemoteSink`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Upload `object.source` under `object.key` with public-read access.
    async fn put(&self, object: &PutObject) -> Result<(), StoreError>;
}
