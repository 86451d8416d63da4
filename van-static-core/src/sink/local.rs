//! Publish into a local directory tree.
//!
//! Files are hard linked into `{root}/{project}/{version}/{path}` when
//! possible. The first link failure that is not a stale target from an
//! earlier run switches the sink to plain copies for the rest of its life.
//!
//! A linked file shares its inode with the package source. Writing into a
//! published file in place also rewrites the source; remove it first and
//! write a new file instead.

use std::cell::Cell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::contract::{EntryStream, Sink};
use crate::entry::EntryKind;
use crate::error::{PublishError, PublishResult};
use crate::resources::{join_resource_path, Distribution};
use crate::sink::{PublishReport, SinkOptions, Target};

/// How a [`LocalSink`] places file bytes. Only ever moves from `Linking` to `Copying`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    Linking,
    Copying,
}

type Linker = Box<dyn Fn(&Path, &Path) -> io::Result<()>>;

pub struct LocalSink {
    root: PathBuf,
    mode: Cell<CopyMode>,
    link: Linker,
}

impl LocalSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalSink {
            root: root.into(),
            mode: Cell::new(CopyMode::Linking),
            link: Box::new(|source, target| fs::hard_link(source, target)),
        }
    }

    /// Accepts `file:///absolute/path` only.
    pub fn from_target(target: &Target) -> PublishResult<Self> {
        if target.scheme() != "file" {
            return Err(PublishError::UnsupportedScheme(target.scheme().to_string()));
        }
        let root = target.url().to_file_path().map_err(|()| {
            PublishError::Config(format!(
                "local target must be file:///absolute/path, got {target}"
            ))
        })?;
        info!(root = %root.display(), "Putting resources in local directory");
        Ok(Self::new(root))
    }

    /// Registry entry for the `file` scheme.
    pub fn open(target: &Target, options: &SinkOptions) -> PublishResult<Box<dyn Sink>> {
        let sink = Self::from_target(target)?;
        if !options.encodings.is_empty() {
            warn!(
                encodings = ?options.encodings,
                "Encoded variants are only published to object storage, ignoring for local target"
            );
        }
        Ok(Box::new(sink))
    }

    /// Replace the hard-link primitive, e.g. to simulate a cross-device failure.
    pub fn with_linker<F>(mut self, link: F) -> Self
    where
        F: Fn(&Path, &Path) -> io::Result<()> + 'static,
    {
        self.link = Box::new(link);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> CopyMode {
        self.mode.get()
    }

    /// `{root}/{project}/{version}/{resource_path}` with platform separators.
    pub fn target_path(&self, distribution: &Distribution, resource_path: &str) -> PathBuf {
        let base = self
            .root
            .join(&distribution.project_name)
            .join(&distribution.version);
        join_resource_path(&base, resource_path)
    }

    fn place(&self, source: &Path, target: &Path) -> PublishResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PublishError::io(parent, e))?;
        }
        if self.mode.get() == CopyMode::Linking && self.try_link(source, target)? {
            return Ok(());
        }
        debug!(from = %source.display(), to = %target.display(), "Copying");
        if target.exists() {
            fs::remove_file(target).map_err(|e| PublishError::io(target, e))?;
        }
        fs::copy(source, target).map_err(|e| PublishError::io(target, e))?;
        Ok(())
    }

    /// Hard link `source` to `target`. `Ok(false)` means the sink fell back to copying.
    fn try_link(&self, source: &Path, target: &Path) -> PublishResult<bool> {
        debug!(from = %source.display(), to = %target.display(), "Hard linking");
        let failure = match (self.link)(source, target) {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(target = %target.display(), "Replacing file from a previous run");
                fs::remove_file(target).map_err(|e| PublishError::io(target, e))?;
                match (self.link)(source, target) {
                    Ok(()) => return Ok(true),
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };
        warn!(
            error = %failure,
            from = %source.display(),
            to = %target.display(),
            "Hard linking failed, copying files from now on"
        );
        self.mode.set(CopyMode::Copying);
        Ok(false)
    }
}

impl Sink for LocalSink {
    fn put(&self, entries: &mut EntryStream<'_>) -> PublishResult<PublishReport> {
        let mut report = PublishReport::default();
        for entry in entries {
            let entry = entry?;
            let target = self.target_path(&entry.distribution, &entry.resource_path);
            match entry.kind {
                EntryKind::Dir => {
                    fs::create_dir_all(&target).map_err(|e| PublishError::io(&target, e))?;
                    report.directories += 1;
                }
                EntryKind::File => {
                    self.place(&entry.filesystem_path, &target)?;
                    report.files += 1;
                }
                EntryKind::Stamp => {
                    self.place(&entry.filesystem_path, &target)?;
                    report.stamps += 1;
                }
            }
        }
        info!(
            root = %self.root.display(),
            directories = report.directories,
            files = report.files,
            stamps = report.stamps,
            "Local put finished"
        );
        Ok(report)
    }

    fn has_stamp(&self, distribution: &Distribution, resource_path: &str) -> PublishResult<bool> {
        Ok(self.target_path(distribution, resource_path).exists())
    }

    fn close(&mut self) -> PublishResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ResourceEntry;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn source_tree() -> (TempDir, Vec<ResourceEntry>) {
        let src = tempdir().unwrap();
        let example = src.path().join("example");
        fs::create_dir_all(example.join("css")).unwrap();
        fs::write(example.join("css/example.css"), "a { }\n").unwrap();
        fs::write(example.join("example.txt"), "Example Text\n").unwrap();
        let dist = Arc::new(Distribution::new("van.static", "0.6"));
        let entry = |path: &str, kind| ResourceEntry {
            resource_path: path.to_string(),
            filesystem_path: src.path().join(path),
            distribution_name: "van.static".into(),
            distribution: Arc::clone(&dist),
            kind,
        };
        let entries = vec![
            entry("example", EntryKind::Dir),
            entry("example/css", EntryKind::Dir),
            entry("example/css/example.css", EntryKind::File),
            entry("example/example.txt", EntryKind::File),
        ];
        (src, entries)
    }

    fn put_all(sink: &LocalSink, entries: &[ResourceEntry]) -> PublishReport {
        let mut stream = entries.iter().cloned().map(Ok::<_, PublishError>);
        sink.put(&mut stream).unwrap()
    }

    #[test]
    fn rejects_non_file_or_relative_targets() {
        let s3: Target = "s3://bucket/path".parse().unwrap();
        assert!(LocalSink::from_target(&s3).is_err());
        let relative: Target = "file://relative/path".parse().unwrap();
        assert!(LocalSink::from_target(&relative).is_err());
    }

    #[test]
    fn put_lays_out_project_and_version() {
        let (_src, entries) = source_tree();
        let out = tempdir().unwrap();
        let sink = LocalSink::new(out.path());
        let report = put_all(&sink, &entries);

        assert_eq!(report.directories, 2);
        assert_eq!(report.files, 2);
        let base = out.path().join("van.static/0.6/example");
        assert_eq!(
            fs::read_to_string(base.join("example.txt")).unwrap(),
            "Example Text\n"
        );
        assert!(base.join("css/example.css").is_file());
        assert_eq!(sink.mode(), CopyMode::Linking);
    }

    #[test]
    fn put_twice_replaces_previous_files() {
        let (_src, entries) = source_tree();
        let out = tempdir().unwrap();
        let sink = LocalSink::new(out.path());
        put_all(&sink, &entries);
        put_all(&sink, &entries);
        assert_eq!(sink.mode(), CopyMode::Linking);
        assert!(out
            .path()
            .join("van.static/0.6/example/example.txt")
            .is_file());
    }

    #[test]
    fn link_failure_falls_back_to_copying_for_good() {
        let (_src, entries) = source_tree();
        let out = tempdir().unwrap();
        let calls = Rc::new(RefCell::new(0));
        let counted = Rc::clone(&calls);
        let sink = LocalSink::new(out.path()).with_linker(move |_, _| {
            *counted.borrow_mut() += 1;
            Err(io::Error::new(io::ErrorKind::Other, "Invalid cross-device link"))
        });

        let report = put_all(&sink, &entries);

        assert_eq!(report.files, 2);
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(sink.mode(), CopyMode::Copying);
        let base = out.path().join("van.static/0.6/example");
        assert_eq!(
            fs::read_to_string(base.join("example.txt")).unwrap(),
            "Example Text\n"
        );
        assert_eq!(fs::read_to_string(base.join("css/example.css")).unwrap(), "a { }\n");
    }

    #[cfg(unix)]
    #[test]
    fn linked_files_share_the_source_inode() {
        use std::os::unix::fs::MetadataExt;

        let (src, entries) = source_tree();
        let out = tempdir().unwrap();
        let sink = LocalSink::new(out.path());
        put_all(&sink, &entries);

        let source = src.path().join("example/example.txt");
        let published = out.path().join("van.static/0.6/example/example.txt");
        let inode = |p: &Path| fs::metadata(p).unwrap().ino();
        assert_eq!(inode(&source), inode(&published));

        // In-place writes reach the source.
        fs::write(&published, "changed\n").unwrap();
        assert_eq!(fs::read_to_string(&source).unwrap(), "changed\n");

        // A replacement file does not.
        fs::remove_file(&published).unwrap();
        fs::write(&published, "replaced\n").unwrap();
        assert_eq!(fs::read_to_string(&source).unwrap(), "changed\n");
        assert_ne!(inode(&source), inode(&published));
    }

    #[test]
    fn has_stamp_reflects_disk() {
        let out = tempdir().unwrap();
        let sink = LocalSink::new(out.path());
        let dist = Distribution::new("van.static", "0.9.0");
        assert!(!sink.has_stamp(&dist, "stamps/x.stamp").unwrap());
        let path = sink.target_path(&dist, "stamps/x.stamp");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stamp").unwrap();
        assert!(sink.has_stamp(&dist, "stamps/x.stamp").unwrap());
    }
}
