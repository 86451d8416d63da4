//! `load_config`: read the optional YAML configuration file of `van-static extract`.
//!
//! The file names the packages that may be published (their version and the
//! directory holding their resources) and defaults for every `extract` flag.
//! Secrets never live here: credentials come from flags or the ambient AWS
//! environment.
//!
//! ```yaml
//! target: file:///srv/static
//! resources: ["pkg:assets/app"]
//! minify: false
//! ignore_stamps: false
//! encodings: [gzip]
//! minifier: yui-compressor
//! packages:
//!   pkg: { version: "2.0", root: ./pkg }
//! ```
//!
//! Relative package roots are resolved against the directory of the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};
use van_static_core::{PackageIndex, PackageRoot};

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    pub target: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub minify: Option<bool>,
    pub ignore_stamps: Option<bool>,
    #[serde(default)]
    pub encodings: Vec<String>,
    pub minifier: Option<String>,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageRoot>,
}

impl CliConfig {
    /// The packages of this file as a resource provider.
    pub fn package_index(&self) -> PackageIndex {
        self.packages
            .iter()
            .map(|(name, package)| (name.clone(), package.clone()))
            .collect()
    }
}

/// Loads a YAML config file and resolves package roots relative to it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!(
                "Failed to parse config YAML {:?}: {e}",
                path_ref
            ));
        }
    };

    let base = path_ref.parent().unwrap_or_else(|| Path::new(""));
    for package in config.packages.values_mut() {
        if package.root.is_relative() {
            package.root = base.join(&package.root);
        }
    }

    info!(
        config_path = ?path_ref,
        packages = config.packages.len(),
        resources = config.resources.len(),
        "Parsed config YAML successfully"
    );
    Ok(config)
}
