//! Packages, resource specs, and the directory-backed [`PackageIndex`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::contract::ResourceProvider;
use crate::error::{PublishError, PublishResult};

/// A package identity pinned to one version for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Distribution {
    pub project_name: String,
    pub version: String,
}

impl Distribution {
    pub fn new(project_name: impl Into<String>, version: impl Into<String>) -> Self {
        Distribution {
            project_name: project_name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.project_name, self.version)
    }
}

/// A parsed `"package:path"` resource spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub package: String,
    pub path: String,
}

impl FromStr for ResourceSpec {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (package, path) = s
            .split_once(':')
            .ok_or_else(|| PublishError::InvalidResourceSpec(s.to_string()))?;
        let path = path.trim_matches('/');
        if package.is_empty() || path.is_empty() || path.split('/').any(|seg| seg == "..") {
            return Err(PublishError::InvalidResourceSpec(s.to_string()));
        }
        Ok(ResourceSpec {
            package: package.to_string(),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.path)
    }
}

/// Where a package's resources live on disk, and which version they are.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageRoot {
    pub version: String,
    pub root: PathBuf,
}

/// Resolves packages against plain directories.
///
/// Directory listings are sorted by name so that walks are reproducible.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: BTreeMap<String, PackageRoot>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` at `version`, served from `root`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> &mut Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        self.packages.insert(
            name.into(),
            PackageRoot {
                version: version.into(),
                root,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn package(&self, package: &str) -> PublishResult<&PackageRoot> {
        self.packages
            .get(package)
            .ok_or_else(|| PublishError::PackageNotFound(package.to_string()))
    }

    fn resolve(&self, package: &str, resource_path: &str) -> PublishResult<PathBuf> {
        let root = &self.package(package)?.root;
        Ok(join_resource_path(root, resource_path))
    }
}

impl FromIterator<(String, PackageRoot)> for PackageIndex {
    fn from_iter<T: IntoIterator<Item = (String, PackageRoot)>>(iter: T) -> Self {
        let mut index = PackageIndex::new();
        for (name, package) in iter {
            index.insert(name, package.version, package.root);
        }
        index
    }
}

impl ResourceProvider for PackageIndex {
    fn distribution(&self, package: &str) -> PublishResult<Arc<Distribution>> {
        let found = self.package(package)?;
        debug!(package, version = %found.version, "Resolved distribution");
        Ok(Arc::new(Distribution::new(package, found.version.clone())))
    }

    fn list_dir(&self, package: &str, resource_path: &str) -> PublishResult<Vec<String>> {
        let dir = self.resolve(package, resource_path)?;
        let read = std::fs::read_dir(&dir).map_err(|e| PublishError::io(&dir, e))?;
        let mut names = Vec::new();
        for member in read {
            let member = member.map_err(|e| PublishError::io(&dir, e))?;
            let name = member.file_name().into_string().map_err(|raw| {
                PublishError::io(
                    dir.join(raw),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "resource name is not valid UTF-8",
                    ),
                )
            })?;
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn is_dir(&self, package: &str, resource_path: &str) -> PublishResult<bool> {
        Ok(self.resolve(package, resource_path)?.is_dir())
    }

    fn filename(&self, package: &str, resource_path: &str) -> PublishResult<PathBuf> {
        self.resolve(package, resource_path)
    }
}

/// Map a slash-separated logical path onto a platform path under `base`.
pub fn join_resource_path(base: &Path, resource_path: &str) -> PathBuf {
    resource_path
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .fold(base.to_path_buf(), |path, seg| path.join(seg))
}
