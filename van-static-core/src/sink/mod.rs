//! Publishing backends and the scheme registry that selects them.
//!
//! A target URI's scheme picks the backend: `file` for [`local::LocalSink`],
//! `s3` for [`remote::RemoteSink`]. Adding a backend means adding one entry to
//! [`SINKS`].

pub mod local;
pub mod remote;
pub mod s3;

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::contract::Sink;
use crate::error::{PublishError, PublishResult};

/// `Cache-Control` sent with every upload. Published paths are versioned, so they never change.
pub const CACHE_CONTROL: &str = "max-age=32140800";

/// An additional content encoding published next to the identity variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Gzip,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
        }
    }
}

impl FromStr for Encoding {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(Encoding::Gzip),
            _ => Err(PublishError::UnsupportedEncoding(s.to_string())),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed target URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    /// Percent-decoded URL path.
    path: String,
}

impl Target {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Bucket name for object-storage targets.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str().filter(|h| !h.is_empty())
    }

    /// Decoded path, e.g. `/my prefix` for `s3://bucket/my%20prefix`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl FromStr for Target {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(PublishError::Config("a target is required".into()));
        }
        let url = Url::parse(s)
            .map_err(|e| PublishError::Config(format!("invalid target {s:?}: {e}")))?;
        let path = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|e| PublishError::Config(format!("invalid target path in {s:?}: {e}")))?
            .into_owned();
        Ok(Target { url, path })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Explicit object-store credentials. When absent the ambient environment is used.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Endpoint of an S3-compatible service, instead of AWS.
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .finish()
    }
}

/// Everything a sink factory needs besides the target.
#[derive(Debug, Clone, Default)]
pub struct SinkOptions {
    pub encodings: Vec<Encoding>,
    pub credentials: Credentials,
}

/// What a `put` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub directories: usize,
    pub files: usize,
    pub stamps: usize,
    /// Objects sent to a bucket, one per encoding variant.
    pub uploads: usize,
    /// Resource specs skipped because their stamp already existed.
    pub skipped: usize,
}

pub type SinkFactory = fn(&Target, &SinkOptions) -> PublishResult<Box<dyn Sink>>;

/// Scheme registry.
pub const SINKS: &[(&str, SinkFactory)] = &[
    ("file", local::LocalSink::open),
    ("s3", remote::RemoteSink::open),
];

/// Reject targets no backend is registered for, without touching anything.
pub fn factory_for(target: &Target) -> PublishResult<SinkFactory> {
    SINKS
        .iter()
        .find(|(scheme, _)| *scheme == target.scheme())
        .map(|(_, factory)| *factory)
        .ok_or_else(|| PublishError::UnsupportedScheme(target.scheme().to_string()))
}

/// Build the sink registered for `target`'s scheme.
pub fn open_sink(target: &Target, options: &SinkOptions) -> PublishResult<Box<dyn Sink>> {
    let factory = factory_for(target)?;
    info!(target_uri = %target, scheme = target.scheme(), "Opening sink");
    factory(target, options)
}
