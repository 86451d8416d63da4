//! # stamp: skip resource trees that were already published
//!
//! A stamp is a tiny marker object published after a resource spec has been
//! walked to the end. Its presence at the target is the only thing consulted
//! on the next run: when it exists, the whole spec is skipped. Stamps carry
//! no checksum, they are a boolean flag.
//!
//! Stamps are published under the `van.static` distribution at the version
//! of this crate, in a `stamps/` directory:
//!
//! ```text
//! van.static/0.9.0/stamps/{project}-{version}-{base32(path)}[-{encodings}].stamp
//! ```
//!
//! The path is base32 encoded with `=` padding.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use data_encoding::BASE32;
use tracing::{debug, info};

use crate::contract::ResourceProvider;
use crate::entry::{EntryKind, ResourceEntry};
use crate::error::{PublishError, PublishResult};
use crate::resources::{Distribution, ResourceSpec};
use crate::sink::Encoding;
use crate::walk::{walk, ResourceWalk};

/// Project name stamps are published under.
pub const STAMP_OWNER: &str = "van.static";

const STAMP_DIR: &str = "stamps";

/// Names, writes and locates stamp markers for one run.
#[derive(Debug, Clone)]
pub struct StampStore {
    scratch: PathBuf,
    encodings: Vec<Encoding>,
    owner: Arc<Distribution>,
}

impl StampStore {
    /// Markers are written into `scratch`; `encodings` become part of every stamp name.
    pub fn new(scratch: impl Into<PathBuf>, encodings: &[Encoding]) -> Self {
        let mut encodings = encodings.to_vec();
        encodings.sort_by_key(|e| e.name());
        encodings.dedup();
        StampStore {
            scratch: scratch.into(),
            encodings,
            owner: Arc::new(Distribution::new(STAMP_OWNER, env!("CARGO_PKG_VERSION"))),
        }
    }

    /// The distribution stamp entries are published under.
    pub fn owner(&self) -> &Arc<Distribution> {
        &self.owner
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Deterministic marker file name for `resource_path` of `distribution`.
    pub fn file_name(&self, distribution: &Distribution, resource_path: &str) -> String {
        let mut name = format!(
            "{}-{}-{}",
            distribution.project_name,
            distribution.version,
            BASE32.encode(resource_path.as_bytes())
        );
        if !self.encodings.is_empty() {
            let joined: Vec<&str> = self.encodings.iter().map(|e| e.name()).collect();
            name.push('-');
            name.push_str(&joined.join("-"));
        }
        name.push_str(".stamp");
        name
    }

    /// Logical path of the stamp inside the owner distribution.
    pub fn stamp_path(&self, distribution: &Distribution, resource_path: &str) -> String {
        format!("{STAMP_DIR}/{}", self.file_name(distribution, resource_path))
    }

    /// Write the marker for `spec` into the scratch directory and describe it as an entry.
    pub fn write_marker(
        &self,
        distribution: &Distribution,
        spec: &ResourceSpec,
    ) -> PublishResult<ResourceEntry> {
        let name = self.file_name(distribution, &spec.path);
        let marker = self.scratch.join(&name);
        fs::write(&marker, format!("stamp: {spec} at {distribution}\n"))
            .map_err(|e| PublishError::io(&marker, e))?;
        debug!(stamp = %name, spec = %spec, "Wrote stamp marker");
        Ok(ResourceEntry {
            resource_path: format!("{STAMP_DIR}/{name}"),
            filesystem_path: marker,
            distribution_name: self.owner.project_name.clone(),
            distribution: Arc::clone(&self.owner),
            kind: EntryKind::Stamp,
        })
    }
}

/// Enumerate every resource spec as [`ResourceEntry`]s, skipping stamped ones.
///
/// `exists` is asked whether the stamp of a spec is already at the target
/// (it receives the stamp owner distribution and the stamp path). A spec that
/// is not stamped is walked completely and followed by one `Stamp` entry.
/// Overlapping specs are walked independently; their shared subtree is
/// yielded once per spec.
pub fn walk_resources<'a, P, F>(
    specs: &'a [ResourceSpec],
    provider: &'a P,
    stamps: &'a StampStore,
    exists: F,
) -> ResourceStream<'a, P, F>
where
    P: ResourceProvider + ?Sized,
    F: FnMut(&Distribution, &str) -> PublishResult<bool>,
{
    ResourceStream {
        specs: specs.iter(),
        provider,
        stamps,
        exists,
        distributions: HashMap::new(),
        current: None,
        skipped: 0,
        failed: false,
    }
}

struct CurrentSpec<'a, P: ?Sized> {
    spec: &'a ResourceSpec,
    distribution: Arc<Distribution>,
    walk: ResourceWalk<'a, P>,
}

/// Iterator returned by [`walk_resources`]. Fused after the first error.
pub struct ResourceStream<'a, P: ?Sized, F> {
    specs: std::slice::Iter<'a, ResourceSpec>,
    provider: &'a P,
    stamps: &'a StampStore,
    exists: F,
    distributions: HashMap<String, Arc<Distribution>>,
    current: Option<CurrentSpec<'a, P>>,
    skipped: usize,
    failed: bool,
}

impl<'a, P, F> ResourceStream<'a, P, F>
where
    P: ResourceProvider + ?Sized,
    F: FnMut(&Distribution, &str) -> PublishResult<bool>,
{
    /// Number of specs skipped so far because their stamp already existed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn distribution(&mut self, package: &str) -> PublishResult<Arc<Distribution>> {
        if let Some(found) = self.distributions.get(package) {
            return Ok(Arc::clone(found));
        }
        let found = self.provider.distribution(package)?;
        self.distributions
            .insert(package.to_string(), Arc::clone(&found));
        Ok(found)
    }

    /// Start walking `spec` unless it is stamped. Returns whether it was started.
    fn begin(&mut self, spec: &'a ResourceSpec) -> PublishResult<bool> {
        let distribution = self.distribution(&spec.package)?;
        let stamp_path = self.stamps.stamp_path(&distribution, &spec.path);
        if (self.exists)(self.stamps.owner(), &stamp_path)? {
            info!(spec = %spec, stamp = %stamp_path, "Stamp exists, skipping");
            return Ok(false);
        }
        info!(spec = %spec, distribution = %distribution, "Walking");
        self.current = Some(CurrentSpec {
            spec,
            distribution,
            walk: walk(self.provider, &spec.package, &spec.path),
        });
        Ok(true)
    }

    fn check(&mut self, item: PublishResult<ResourceEntry>) -> PublishResult<ResourceEntry> {
        if item.is_err() {
            self.failed = true;
            self.current = None;
        }
        item
    }
}

fn to_entry<P>(
    provider: &P,
    package: &str,
    distribution: &Arc<Distribution>,
    resource_path: String,
    kind: EntryKind,
) -> PublishResult<ResourceEntry>
where
    P: ResourceProvider + ?Sized,
{
    Ok(ResourceEntry {
        filesystem_path: provider.filename(package, &resource_path)?,
        resource_path,
        distribution_name: package.to_string(),
        distribution: Arc::clone(distribution),
        kind,
    })
}

impl<'a, P, F> Iterator for ResourceStream<'a, P, F>
where
    P: ResourceProvider + ?Sized,
    F: FnMut(&Distribution, &str) -> PublishResult<bool>,
{
    type Item = PublishResult<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(current) = self.current.as_mut() {
                let item = match current.walk.next() {
                    Some(Ok((path, kind))) => Some(to_entry(
                        self.provider,
                        &current.spec.package,
                        &current.distribution,
                        path,
                        kind,
                    )),
                    Some(Err(e)) => Some(Err(e)),
                    None => None,
                };
                if let Some(item) = item {
                    return Some(self.check(item));
                }
                if let Some(done) = self.current.take() {
                    let stamp = self.stamps.write_marker(&done.distribution, done.spec);
                    return Some(self.check(stamp));
                }
            }
            let spec = self.specs.next()?;
            match self.begin(spec) {
                Ok(true) => {}
                Ok(false) => self.skipped += 1,
                Err(e) => return Some(self.check(Err(e))),
            }
        }
    }
}
