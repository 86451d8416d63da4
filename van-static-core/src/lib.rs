#![doc = "van-static-core: publish versioned static resources of packages."]

//! This crate holds the whole publishing pipeline; the `van-static` binary
//! only parses flags and configuration and calls [`extract::extract`].
//!
//! The pipeline is a chain of pull-based iterators over [`ResourceEntry`]:
//! resource specs are walked ([`walk`]), already-published specs are skipped
//! and new ones stamped ([`stamp`]), `.js`/`.css` files are optionally
//! minified ([`minify`]) and the result is consumed by a [`Sink`] chosen from
//! the target URI ([`sink`]).
//!
//! # Usage
//! Build a [`PackageIndex`] (or any other [`ResourceProvider`]), fill an
//! [`ExtractRequest`] and call [`extract()`].

pub mod contract;
pub mod entry;
pub mod error;
pub mod extract;
pub mod minify;
pub mod resources;
pub mod sink;
pub mod stamp;
pub mod walk;

pub use contract::{ObjectStore, ResourceProvider, Sink};
pub use entry::{EntryKind, ResourceEntry};
pub use error::{PublishError, PublishResult};
pub use extract::{extract, ExtractRequest};
pub use resources::{Distribution, PackageIndex, PackageRoot, ResourceSpec};
pub use sink::{Credentials, Encoding, PublishReport, Target};
