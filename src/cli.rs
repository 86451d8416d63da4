//! Command line interface of `van-static`.
//!
//! Flags override the configuration file. All publishing logic lives in
//! `van-static-core`; this module only merges settings and runs
//! [`van_static_core::extract()`] on a blocking thread, since the core drives
//! its own runtime for object storage.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use van_static_core::{extract, Credentials, ExtractRequest, PackageIndex, PublishReport};

use crate::load_config::{load_config, CliConfig};

/// Publish versioned static resources of packages to a directory or a bucket.
#[derive(Debug, Parser)]
#[clap(
    name = "van-static",
    version,
    about = "Publish versioned package resources to a local directory or an S3 bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk the given resources and publish them to the target
    Extract(ExtractArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ExtractArgs {
    /// Path to the YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Resource to publish, as package:path (may be repeated)
    #[clap(long = "resource", value_name = "SPEC")]
    pub resources: Vec<String>,

    /// Where to put the resources: file:///abs/dir or s3://bucket/prefix
    #[clap(long)]
    pub target: Option<String>,

    /// Minify .js and .css files
    #[clap(long, alias = "yui-compressor", overrides_with = "no_minify")]
    pub minify: bool,

    /// Do not minify
    #[clap(long, alias = "no-yui-compressor", overrides_with = "minify")]
    pub no_minify: bool,

    /// Minifier command line, invoked as PROGRAM --type js|css -o OUT IN
    #[clap(long, value_name = "PROGRAM")]
    pub minifier: Option<String>,

    /// Publish even if a stamp says the resource is already there
    #[clap(long)]
    pub ignore_stamps: bool,

    /// Also publish an encoded copy of every file (may be repeated)
    #[clap(long = "encoding", value_name = "NAME")]
    pub encodings: Vec<String>,

    /// AWS access key
    #[clap(long)]
    pub aws_access_key: Option<String>,

    /// AWS secret key
    #[clap(long)]
    pub aws_secret_key: Option<String>,

    /// AWS region of the bucket
    #[clap(long)]
    pub aws_region: Option<String>,

    /// Endpoint of an S3-compatible service
    #[clap(long)]
    pub s3_endpoint_url: Option<String>,

    /// The logging level to use
    #[clap(long, default_value = "WARN")]
    pub loglevel: String,
}

impl Cli {
    pub fn log_level(&self) -> Result<Level> {
        match &self.command {
            Commands::Extract(args) => parse_level(&args.loglevel),
        }
    }
}

/// Accepts tracing level names plus `WARNING` and `CRITICAL`.
pub fn parse_level(name: &str) -> Result<Level> {
    match name.trim().to_ascii_uppercase().as_str() {
        "WARNING" => Ok(Level::WARN),
        "CRITICAL" | "FATAL" => Ok(Level::ERROR),
        other => other
            .parse::<Level>()
            .with_context(|| format!("unknown log level {name:?}")),
    }
}

impl ExtractArgs {
    /// Merge flags over the config file into a request and the packages to read from.
    pub fn resolve(self) -> Result<(ExtractRequest, PackageIndex)> {
        let config = match &self.config {
            Some(path) => load_config(path)?,
            None => CliConfig::default(),
        };

        let target = self.target.or(config.target.clone()).unwrap_or_default();
        if target.trim().is_empty() {
            bail!("a target is required: pass --target or set `target` in the config file");
        }
        let resources = if self.resources.is_empty() {
            config.resources.clone()
        } else {
            self.resources
        };
        if resources.is_empty() {
            bail!("at least one resource is required: pass --resource or set `resources` in the config file");
        }
        let minify = match (self.minify, self.no_minify) {
            (true, _) => true,
            (_, true) => false,
            _ => config.minify.unwrap_or(false),
        };
        let encodings = if self.encodings.is_empty() {
            config.encodings.clone()
        } else {
            self.encodings
        };

        let request = ExtractRequest {
            resources,
            target,
            minify,
            minifier: self.minifier.or(config.minifier.clone()),
            ignore_stamps: self.ignore_stamps || config.ignore_stamps.unwrap_or(false),
            encodings,
            credentials: Credentials {
                access_key: self.aws_access_key,
                secret_key: self.aws_secret_key,
                endpoint_url: self.s3_endpoint_url,
                region: self.aws_region,
            },
        };
        Ok((request, config.package_index()))
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("van-static starting");

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args).await,
    };
    match &result {
        Ok(report) => {
            tracing::info!(command = "extract", ?report, "Extract complete");
            print!("{}", serde_yaml::to_string(report)?);
        }
        Err(e) => tracing::error!(command = "extract", error = %e, "Extract failed"),
    }
    result.map(|_| ())
}

async fn run_extract(args: ExtractArgs) -> Result<PublishReport> {
    let (request, index) = args.resolve()?;
    tracing::info!(
        target_uri = %request.target,
        resources = ?request.resources,
        packages = index.len(),
        "Starting extract"
    );
    let report = tokio::task::spawn_blocking(move || extract(&request, &index))
        .await
        .context("extract task did not complete")?
        .context("Extract failed")?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> ExtractArgs {
        let mut full = vec!["van-static", "extract"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Extract(args) => args,
        }
    }

    #[test]
    fn parses_repeated_flags() {
        let args = args(&[
            "--resource",
            "pkg:a",
            "--resource",
            "pkg:b",
            "--encoding",
            "gzip",
            "--target",
            "s3://bucket/p",
        ]);
        assert_eq!(args.resources, vec!["pkg:a", "pkg:b"]);
        assert_eq!(args.encodings, vec!["gzip"]);
        assert_eq!(args.loglevel, "WARN");
    }

    #[test]
    fn last_minify_flag_wins() {
        assert!(!args(&["--minify", "--no-minify"]).minify);
        assert!(args(&["--no-minify", "--minify"]).minify);
        assert!(args(&["--yui-compressor"]).minify);
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert_eq!(parse_level("warning").unwrap(), Level::WARN);
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("critical").unwrap(), Level::ERROR);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn flags_override_config_defaults() {
        let (request, index) = args(&[
            "--resource",
            "pkg:x",
            "--target",
            "file:///srv/static",
            "--aws-secret-key",
            "s",
        ])
        .resolve()
        .unwrap();
        assert_eq!(request.resources, vec!["pkg:x"]);
        assert_eq!(request.target, "file:///srv/static");
        assert!(!request.minify);
        assert_eq!(request.credentials.secret_key.as_deref(), Some("s"));
        assert!(index.is_empty());
    }

    #[test]
    fn missing_target_or_resources_fail() {
        let err = args(&["--resource", "pkg:x"]).resolve().unwrap_err();
        assert!(err.to_string().contains("target"));
        let err = args(&["--target", "file:///srv"]).resolve().unwrap_err();
        assert!(err.to_string().contains("resource"));
    }
}
