//! Publish into an object-storage bucket, with optional encoded variants.
//!
//! Keys follow `{prefix}/{project}/{version}/{path}`; an encoded variant goes
//! to `{prefix}/{encoding}/{project}/{version}/{path}`. Files whose type is
//! not worth compressing are still published at the encoded key, unchanged,
//! so the parallel tree is always complete.
//!
//! The object store is async. The sink connects lazily and drives it with a
//! private current-thread runtime, so it must not be used from inside
//! another runtime's worker thread.

use std::fs::File;
use std::io;
use std::iter;
use std::path::Path;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::unsync::OnceCell;
use tempfile::{NamedTempFile, TempDir};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::contract::{EntryStream, ObjectStore, PutObject, Sink};
use crate::entry::{EntryKind, ResourceEntry};
use crate::error::{PublishError, PublishResult};
use crate::resources::Distribution;
use crate::sink::s3::S3Store;
use crate::sink::{Encoding, PublishReport, SinkOptions, Target, CACHE_CONTROL};

/// MIME types that are compressed for the `gzip` variant.
pub const COMPRESSIBLE_TYPES: &[&str] = &[
    "application/javascript",
    "application/json",
    "application/x-javascript",
    "application/xml",
    "image/svg+xml",
    "text/css",
    "text/csv",
    "text/html",
    "text/javascript",
    "text/plain",
    "text/xml",
];

type Connector = Box<dyn Fn(&Runtime) -> PublishResult<Arc<dyn ObjectStore>>>;

struct Connection {
    runtime: Runtime,
    store: Arc<dyn ObjectStore>,
}

pub struct RemoteSink {
    bucket: String,
    prefix: String,
    encodings: Vec<Encoding>,
    connect: Connector,
    connection: OnceCell<Connection>,
    staging: Option<TempDir>,
}

impl RemoteSink {
    /// Registry entry for the `s3` scheme.
    pub fn open(target: &Target, options: &SinkOptions) -> PublishResult<Box<dyn Sink>> {
        let credentials = options.credentials.clone();
        let sink = Self::with_connector(target, options, move |runtime, bucket| {
            let store = runtime.block_on(S3Store::connect(bucket, &credentials));
            Ok(Arc::new(store) as Arc<dyn ObjectStore>)
        })?;
        Ok(Box::new(sink))
    }

    /// Publish through an already constructed store.
    pub fn with_store(
        target: &Target,
        options: &SinkOptions,
        store: Arc<dyn ObjectStore>,
    ) -> PublishResult<Self> {
        Self::with_connector(target, options, move |_, _| Ok(Arc::clone(&store)))
    }

    fn with_connector<F>(target: &Target, options: &SinkOptions, connect: F) -> PublishResult<Self>
    where
        F: Fn(&Runtime, &str) -> PublishResult<Arc<dyn ObjectStore>> + 'static,
    {
        let bucket = target
            .host()
            .ok_or_else(|| {
                PublishError::Config(format!("object storage target needs a bucket: {target}"))
            })?
            .to_string();
        let prefix = target.path().trim_matches('/').to_string();
        let staging = tempfile::Builder::new()
            .prefix("van-static-gzip")
            .tempdir()
            .map_err(|e| PublishError::io(std::env::temp_dir(), e))?;
        let mut encodings = options.encodings.clone();
        encodings.dedup();
        info!(bucket = %bucket, prefix = %prefix, ?encodings, "Putting resources in bucket");
        let connect_bucket = bucket.clone();
        Ok(RemoteSink {
            bucket,
            prefix,
            encodings,
            connect: Box::new(move |runtime| connect(runtime, &connect_bucket)),
            connection: OnceCell::new(),
            staging: Some(staging),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key of `resource_path`, optionally inside an encoding's parallel tree.
    pub fn key(
        &self,
        encoding: Option<Encoding>,
        distribution: &Distribution,
        resource_path: &str,
    ) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(5);
        if !self.prefix.is_empty() {
            parts.push(&self.prefix);
        }
        if let Some(encoding) = encoding {
            parts.push(encoding.name());
        }
        parts.push(&distribution.project_name);
        parts.push(&distribution.version);
        parts.push(resource_path.trim_start_matches('/'));
        parts.join("/")
    }

    fn connection(&self) -> PublishResult<&Connection> {
        self.connection.get_or_try_init(|| {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(PublishError::Runtime)?;
            let store = (self.connect)(&runtime)?;
            Ok(Connection { runtime, store })
        })
    }

    fn send(&self, object: PutObject) -> PublishResult<()> {
        let connection = self.connection()?;
        debug!(key = %object.key, source = %object.source.display(), "Uploading");
        connection
            .runtime
            .block_on(connection.store.put(&object))
            .map_err(|e| PublishError::ObjectStore(format!("upload of {} failed: {e}", object.key)))
    }

    fn put_stamp(&self, entry: &ResourceEntry) -> PublishResult<()> {
        self.send(PutObject {
            key: self.key(None, &entry.distribution, &entry.resource_path),
            source: entry.filesystem_path.clone(),
            content_type: None,
            content_encoding: None,
            cache_control: CACHE_CONTROL.to_string(),
        })
    }

    /// Upload every encoding variant of one file, identity first. Returns the upload count.
    fn put_file(&self, entry: &ResourceEntry) -> PublishResult<usize> {
        let content_type = mime_guess::from_path(&entry.resource_path)
            .first()
            .map(|mime| mime.essence_str().to_string());
        let compressible = content_type
            .as_deref()
            .is_some_and(|ct| COMPRESSIBLE_TYPES.contains(&ct));
        let variants = iter::once(None).chain(self.encodings.iter().copied().map(Some));

        let mut uploads = 0;
        for encoding in variants {
            let key = self.key(encoding, &entry.distribution, &entry.resource_path);
            let object = |source: &Path, content_encoding: Option<&str>| PutObject {
                key: key.clone(),
                source: source.to_path_buf(),
                content_type: content_type.clone(),
                content_encoding: content_encoding.map(str::to_string),
                cache_control: CACHE_CONTROL.to_string(),
            };
            match encoding {
                None => self.send(object(&entry.filesystem_path, None))?,
                Some(Encoding::Gzip) if compressible => {
                    let compressed = self.gzip(&entry.filesystem_path)?;
                    self.send(object(compressed.path(), Some("gzip")))?;
                }
                Some(Encoding::Gzip) => {
                    debug!(path = %entry.resource_path, ?content_type, "Not compressible, uploading as is");
                    self.send(object(&entry.filesystem_path, None))?;
                }
            }
            uploads += 1;
        }
        Ok(uploads)
    }

    /// Gzip `source` at the best level into a staging file, removed when dropped.
    fn gzip(&self, source: &Path) -> PublishResult<NamedTempFile> {
        let staging = self
            .staging
            .as_ref()
            .ok_or_else(|| PublishError::Config("remote sink used after close".into()))?;
        let mut input = File::open(source).map_err(|e| PublishError::io(source, e))?;
        let compressed =
            NamedTempFile::new_in(staging.path()).map_err(|e| PublishError::io(staging.path(), e))?;
        let mut encoder = GzEncoder::new(compressed.as_file(), Compression::best());
        io::copy(&mut input, &mut encoder).map_err(|e| PublishError::io(compressed.path(), e))?;
        encoder
            .finish()
            .map_err(|e| PublishError::io(compressed.path(), e))?;
        Ok(compressed)
    }
}

impl Sink for RemoteSink {
    fn put(&self, entries: &mut EntryStream<'_>) -> PublishResult<PublishReport> {
        let mut report = PublishReport::default();
        for entry in entries {
            let entry = entry?;
            match entry.kind {
                EntryKind::Dir => continue,
                EntryKind::Stamp => {
                    self.put_stamp(&entry)?;
                    report.stamps += 1;
                    report.uploads += 1;
                }
                EntryKind::File => {
                    report.uploads += self.put_file(&entry)?;
                    report.files += 1;
                }
            }
        }
        info!(
            bucket = %self.bucket,
            files = report.files,
            stamps = report.stamps,
            uploads = report.uploads,
            "Remote put finished"
        );
        Ok(report)
    }

    fn has_stamp(&self, distribution: &Distribution, resource_path: &str) -> PublishResult<bool> {
        let key = self.key(None, distribution, resource_path);
        let connection = self.connection()?;
        connection
            .runtime
            .block_on(connection.store.exists(&key))
            .map_err(|e| PublishError::ObjectStore(format!("existence check of {key} failed: {e}")))
    }

    fn close(&mut self) -> PublishResult<()> {
        match self.staging.take() {
            Some(staging) => {
                let path = staging.path().to_path_buf();
                debug!(staging = %path.display(), "Removing gzip staging directory");
                staging.close().map_err(|e| PublishError::io(path, e))
            }
            None => Ok(()),
        }
    }
}
