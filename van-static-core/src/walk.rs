//! Depth-first enumeration of one package resource directory.

use std::collections::VecDeque;
use std::io;

use tracing::{debug, info};

use crate::contract::ResourceProvider;
use crate::entry::EntryKind;
use crate::error::{PublishError, PublishResult};

/// Walk `root` inside `package`, yielding `(resource_path, kind)` pairs.
///
/// The root comes first, then its members in listing order. Subdirectories
/// are announced and entered before their later siblings. Members whose name
/// starts with `.` are neither reported nor entered. Each directory is listed
/// only when the walk reaches it.
pub fn walk<'a, P>(provider: &'a P, package: &str, root: &str) -> ResourceWalk<'a, P>
where
    P: ResourceProvider + ?Sized,
{
    ResourceWalk {
        provider,
        package: package.to_string(),
        root: Some(root.to_string()),
        stack: Vec::new(),
        failed: false,
    }
}

/// Iterator returned by [`walk`]. Fused after the first error.
pub struct ResourceWalk<'a, P: ?Sized> {
    provider: &'a P,
    package: String,
    root: Option<String>,
    stack: Vec<(String, VecDeque<String>)>,
    failed: bool,
}

impl<P> ResourceWalk<'_, P>
where
    P: ResourceProvider + ?Sized,
{
    fn enter(&mut self, dir: String) -> PublishResult<()> {
        let members = self.provider.list_dir(&self.package, &dir)?;
        self.stack.push((dir, members.into()));
        Ok(())
    }

    fn start(&mut self, root: String) -> PublishResult<(String, EntryKind)> {
        if !self.provider.is_dir(&self.package, &root)? {
            let path = self.provider.filename(&self.package, &root)?;
            if !path.is_file() {
                return Err(PublishError::io(
                    path,
                    io::Error::new(io::ErrorKind::NotFound, "resource does not exist"),
                ));
            }
            debug!(package = %self.package, path = %root, "Resource root is a single file");
            return Ok((root, EntryKind::File));
        }
        self.enter(root.clone())?;
        Ok((root, EntryKind::Dir))
    }

    fn advance(&mut self) -> Option<PublishResult<(String, EntryKind)>> {
        loop {
            let (parent, members) = self.stack.last_mut()?;
            let next = members
                .pop_front()
                .map(|name| (name.starts_with('.'), format!("{parent}/{name}")));
            let Some((hidden, path)) = next else {
                self.stack.pop();
                continue;
            };
            if hidden {
                continue;
            }
            return Some(match self.provider.is_dir(&self.package, &path) {
                Ok(true) => {
                    info!(package = %self.package, path = %path, "Recursing into directory");
                    self.enter(path.clone()).map(|()| (path, EntryKind::Dir))
                }
                Ok(false) => {
                    debug!(package = %self.package, path = %path, "Found resource");
                    Ok((path, EntryKind::File))
                }
                Err(e) => Err(e),
            });
        }
    }
}

impl<P> Iterator for ResourceWalk<'_, P>
where
    P: ResourceProvider + ?Sized,
{
    type Item = PublishResult<(String, EntryKind)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.root.take() {
            Some(root) => Some(self.start(root)),
            None => self.advance(),
        };
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::PackageIndex;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn example_tree() -> (TempDir, PackageIndex) {
        let tmp = tempdir().unwrap();
        let example = tmp.path().join("example");
        fs::create_dir_all(example.join("css")).unwrap();
        fs::create_dir_all(example.join("js")).unwrap();
        fs::create_dir_all(example.join(".svn")).unwrap();
        fs::write(example.join("css/example.css"), "body { color: red; }\n").unwrap();
        fs::write(example.join("js/example.js"), "var a = 1;\n").unwrap();
        fs::write(example.join("example.txt"), "Example Text\n").unwrap();
        fs::write(example.join(".hidden"), "secret").unwrap();
        fs::write(example.join(".svn/entries"), "svn").unwrap();
        let mut index = PackageIndex::new();
        index.insert("pkg", "1.0", tmp.path());
        (tmp, index)
    }

    #[test]
    fn walks_depth_first_skipping_hidden_entries() {
        let (_tmp, index) = example_tree();
        let walked: Vec<_> = walk(&index, "pkg", "example")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            walked,
            vec![
                ("example".to_string(), EntryKind::Dir),
                ("example/css".to_string(), EntryKind::Dir),
                ("example/css/example.css".to_string(), EntryKind::File),
                ("example/example.txt".to_string(), EntryKind::File),
                ("example/js".to_string(), EntryKind::Dir),
                ("example/js/example.js".to_string(), EntryKind::File),
            ]
        );
    }

    #[test]
    fn single_file_root_is_yielded_as_file() {
        let (_tmp, index) = example_tree();
        let walked: Vec<_> = walk(&index, "pkg", "example/example.txt")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            walked,
            vec![("example/example.txt".to_string(), EntryKind::File)]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let (_tmp, index) = example_tree();
        let mut walked = walk(&index, "pkg", "example/nothing-here");
        assert!(matches!(
            walked.next(),
            Some(Err(PublishError::Io { source, .. })) if source.kind() == io::ErrorKind::NotFound
        ));
        assert!(walked.next().is_none());
    }

    #[test]
    fn unknown_package_fails_once() {
        let (_tmp, index) = example_tree();
        let mut walked = walk(&index, "nope", "example");
        assert!(matches!(
            walked.next(),
            Some(Err(PublishError::PackageNotFound(_)))
        ));
        assert!(walked.next().is_none());
    }
}
