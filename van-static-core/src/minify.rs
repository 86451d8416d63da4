//! Optional minification stage.
//!
//! `.js` and `.css` files are run through an external compressor with the
//! YUI Compressor command line (`--type js|css -o OUT IN`). Output files live
//! in a private workspace that is removed by [`Minifier::dispose`] or on drop.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::{debug, error};

use crate::entry::{EntryKind, ResourceEntry};
use crate::error::{PublishError, PublishResult};

pub const DEFAULT_MINIFIER: &str = "yui-compressor";

#[derive(Debug)]
pub struct Minifier {
    program: PathBuf,
    leading_args: Vec<OsString>,
    workspace: Option<TempDir>,
    counter: usize,
}

impl Minifier {
    pub fn new() -> PublishResult<Self> {
        Self::with_program(DEFAULT_MINIFIER)
    }

    /// Use `program` instead of `yui-compressor`. It must accept the same arguments.
    pub fn with_program(program: impl Into<PathBuf>) -> PublishResult<Self> {
        Self::with_command(program, Vec::<OsString>::new())
    }

    /// Parse a whitespace-separated command line such as `java -jar yuicompressor.jar`.
    pub fn from_command_line(command: &str) -> PublishResult<Self> {
        let mut words = command.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| PublishError::Config("empty minifier command".into()))?;
        Self::with_command(program, words.map(OsString::from).collect())
    }

    /// `program` is invoked as `program LEADING_ARGS... --type T -o OUT IN`.
    pub fn with_command(
        program: impl Into<PathBuf>,
        leading_args: Vec<OsString>,
    ) -> PublishResult<Self> {
        let workspace = tempfile::Builder::new()
            .prefix("van-static-minify")
            .tempdir()
            .map_err(|e| PublishError::io(std::env::temp_dir(), e))?;
        debug!(workspace = %workspace.path().display(), "Created minifier workspace");
        Ok(Minifier {
            program: program.into(),
            leading_args,
            workspace: Some(workspace),
            counter: 0,
        })
    }

    /// The private workspace, until disposed.
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_ref().map(TempDir::path)
    }

    /// Wrap `entries`, minifying `.js` and `.css` files as they are pulled.
    pub fn compress<I>(&mut self, entries: I) -> Compressed<'_, I>
    where
        I: Iterator<Item = PublishResult<ResourceEntry>>,
    {
        Compressed {
            minifier: self,
            entries,
        }
    }

    /// Remove the workspace and everything in it. Later calls do nothing.
    pub fn dispose(&mut self) -> PublishResult<()> {
        match self.workspace.take() {
            Some(workspace) => {
                let path = workspace.path().to_path_buf();
                debug!(workspace = %path.display(), "Removing minifier workspace");
                workspace.close().map_err(|e| PublishError::io(path, e))
            }
            None => Ok(()),
        }
    }

    fn minify(&mut self, entry: ResourceEntry) -> PublishResult<ResourceEntry> {
        let kind = match entry.kind {
            EntryKind::File if entry.resource_path.ends_with(".js") => "js",
            EntryKind::File if entry.resource_path.ends_with(".css") => "css",
            EntryKind::File | EntryKind::Dir | EntryKind::Stamp => return Ok(entry),
        };
        self.counter += 1;
        let name = format!("{}-{}", self.counter, entry.basename());
        let target = self
            .workspace()
            .map(|workspace| workspace.join(name))
            .ok_or_else(|| PublishError::Config("minifier used after dispose".into()))?;
        debug!(
            kind,
            from = %entry.filesystem_path.display(),
            to = %target.display(),
            "Minifying"
        );
        let status = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("--type")
            .arg(kind)
            .arg("-o")
            .arg(&target)
            .arg(&entry.filesystem_path)
            .status()
            .map_err(|e| PublishError::io(&self.program, e))?;
        if !status.success() {
            error!(path = %entry.filesystem_path.display(), %status, "Minifier failed");
            return Err(PublishError::Minify {
                path: entry.filesystem_path,
                status,
            });
        }
        Ok(entry.with_filesystem_path(target))
    }
}

impl Drop for Minifier {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

/// Iterator returned by [`Minifier::compress`].
pub struct Compressed<'a, I> {
    minifier: &'a mut Minifier,
    entries: I,
}

impl<I> Iterator for Compressed<'_, I>
where
    I: Iterator<Item = PublishResult<ResourceEntry>>,
{
    type Item = PublishResult<ResourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.next()?;
        Some(entry.and_then(|entry| self.minifier.minify(entry)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::resources::Distribution;
    use std::fs;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    /// A stand-in compressor run through `sh`, with YUI-style positional arguments.
    fn fake_compressor(dir: &TempDir, body: &str) -> Minifier {
        let script = dir.path().join("fake-compressor.sh");
        fs::write(&script, format!("{body}\n")).unwrap();
        Minifier::with_command("sh", vec![script.into_os_string()]).unwrap()
    }

    fn entry(dir: &TempDir, resource_path: &str, kind: EntryKind) -> ResourceEntry {
        let filesystem_path = dir.path().join(resource_path.replace('/', "_"));
        if kind != EntryKind::Dir {
            fs::write(&filesystem_path, "keep me\n").unwrap();
        }
        ResourceEntry {
            resource_path: resource_path.to_string(),
            filesystem_path,
            distribution_name: "pkg".into(),
            distribution: Arc::new(Distribution::new("pkg", "1.0")),
            kind,
        }
    }

    #[test]
    fn passes_through_directories_stamps_and_other_files() {
        let tools = tempdir().unwrap();
        let mut minifier = fake_compressor(&tools, "exit 1");
        let input = vec![
            entry(&tools, "example/css", EntryKind::Dir),
            entry(&tools, "example/example.txt", EntryKind::File),
            entry(&tools, "stamps/x.stamp", EntryKind::Stamp),
        ];
        let out: Vec<_> = minifier
            .compress(input.clone().into_iter().map(Ok))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn minifies_into_counter_named_files() {
        let tools = tempdir().unwrap();
        let mut minifier = fake_compressor(&tools, r#"tr a-z A-Z < "$5" > "$4""#);
        let input = vec![
            entry(&tools, "example/css/example.css", EntryKind::File),
            entry(&tools, "example/js/example.js", EntryKind::File),
        ];
        let workspace = minifier.workspace().unwrap().to_path_buf();
        let out: Vec<_> = minifier
            .compress(input.clone().into_iter().map(Ok))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(out[0].resource_path, "example/css/example.css");
        assert_eq!(out[0].filesystem_path, workspace.join("1-example.css"));
        assert_eq!(out[1].filesystem_path, workspace.join("2-example.js"));
        assert_eq!(fs::read_to_string(&out[1].filesystem_path).unwrap(), "KEEP ME\n");

        minifier.dispose().unwrap();
        assert!(!workspace.exists());
        minifier.dispose().unwrap();
    }

    #[test]
    fn failing_minifier_is_fatal_and_workspace_still_removed() {
        let tools = tempdir().unwrap();
        let mut minifier = fake_compressor(&tools, "exit 3");
        let input = vec![entry(&tools, "app.js", EntryKind::File)];
        let workspace = minifier.workspace().unwrap().to_path_buf();
        let err = minifier
            .compress(input.into_iter().map(Ok))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert!(matches!(err, PublishError::Minify { .. }));
        drop(minifier);
        assert!(!workspace.exists());
    }
}
