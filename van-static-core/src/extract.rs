//! # extract: one publishing run from request to report
//!
//! Everything the caller can get wrong is checked before anything is
//! touched. After that the sink is opened, a scratch directory for stamp
//! markers is created, the entry stream is built and handed to the sink.
//! The minifier workspace, the scratch directory and the sink are released
//! whatever happened; a failure while releasing is only logged.

use tracing::{info, warn};

use crate::contract::{ResourceProvider, Sink};
use crate::error::{PublishError, PublishResult};
use crate::minify::Minifier;
use crate::resources::ResourceSpec;
use crate::sink::{factory_for, open_sink, Credentials, Encoding, PublishReport, SinkOptions, Target};
use crate::stamp::{walk_resources, StampStore};

/// Input of one run, as received from the command line or a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractRequest {
    /// `"package:path"` specs, published in order.
    pub resources: Vec<String>,
    /// `file:///abs/path` or `s3://bucket/prefix`.
    pub target: String,
    pub minify: bool,
    /// Minifier command line; `yui-compressor` when unset.
    pub minifier: Option<String>,
    /// Publish even when a stamp says the spec is already there.
    pub ignore_stamps: bool,
    pub encodings: Vec<String>,
    pub credentials: Credentials,
}

/// A request that passed validation.
#[derive(Debug)]
struct Plan {
    specs: Vec<ResourceSpec>,
    target: Target,
    encodings: Vec<Encoding>,
}

impl ExtractRequest {
    fn plan(&self) -> PublishResult<Plan> {
        let target: Target = self.target.parse()?;
        factory_for(&target)?;
        if self.resources.is_empty() {
            return Err(PublishError::Config(
                "at least one resource spec is required".into(),
            ));
        }
        if self.credentials.access_key.is_some() != self.credentials.secret_key.is_some() {
            return Err(PublishError::Config(
                "an access key and a secret key must be given together".into(),
            ));
        }
        let specs = self
            .resources
            .iter()
            .map(|r| r.parse())
            .collect::<PublishResult<Vec<ResourceSpec>>>()?;
        let mut encodings = self
            .encodings
            .iter()
            .map(|e| e.parse())
            .collect::<PublishResult<Vec<Encoding>>>()?;
        encodings.sort_by_key(|e| e.name());
        encodings.dedup();
        if self.minify
            && self
                .minifier
                .as_deref()
                .is_some_and(|cmd| cmd.trim().is_empty())
        {
            return Err(PublishError::Config("empty minifier command".into()));
        }
        Ok(Plan {
            specs,
            target,
            encodings,
        })
    }
}

/// Publish `request.resources` from `provider` to `request.target`.
pub fn extract<P>(request: &ExtractRequest, provider: &P) -> PublishResult<PublishReport>
where
    P: ResourceProvider + ?Sized,
{
    let plan = request.plan()?;
    let options = SinkOptions {
        encodings: plan.encodings.clone(),
        credentials: request.credentials.clone(),
    };
    let sink = open_sink(&plan.target, &options)?;
    run(request, &plan, provider, sink)
}

/// Like [`extract`], but into an already opened sink. The target is still validated.
pub fn extract_to<P>(
    request: &ExtractRequest,
    provider: &P,
    sink: Box<dyn Sink>,
) -> PublishResult<PublishReport>
where
    P: ResourceProvider + ?Sized,
{
    let plan = request.plan()?;
    run(request, &plan, provider, sink)
}

fn run<P>(
    request: &ExtractRequest,
    plan: &Plan,
    provider: &P,
    mut sink: Box<dyn Sink>,
) -> PublishResult<PublishReport>
where
    P: ResourceProvider + ?Sized,
{
    info!(
        target_uri = %plan.target,
        specs = plan.specs.len(),
        minify = request.minify,
        ignore_stamps = request.ignore_stamps,
        "Extracting resources"
    );
    let result = stage(request, plan, provider, sink.as_ref());
    if let Err(e) = sink.close() {
        warn!(error = %e, target_uri = %plan.target, "Closing sink failed");
    }
    result
}

fn stage<P>(
    request: &ExtractRequest,
    plan: &Plan,
    provider: &P,
    sink: &dyn Sink,
) -> PublishResult<PublishReport>
where
    P: ResourceProvider + ?Sized,
{
    let scratch = tempfile::Builder::new()
        .prefix("van-static-stamps")
        .tempdir()
        .map_err(|e| PublishError::io(std::env::temp_dir(), e))?;
    let stamps = StampStore::new(scratch.path(), &plan.encodings);

    let mut minifier = if request.minify {
        let built = match request.minifier.as_deref() {
            Some(command) => Minifier::from_command_line(command),
            None => Minifier::new(),
        };
        Some(built?)
    } else {
        None
    };

    let ignore_stamps = request.ignore_stamps;
    let mut stream = walk_resources(&plan.specs, provider, &stamps, |distribution, path| {
        if ignore_stamps {
            Ok(false)
        } else {
            sink.has_stamp(distribution, path)
        }
    });
    let result = match minifier.as_mut() {
        Some(minifier) => sink.put(&mut minifier.compress(&mut stream)),
        None => sink.put(&mut stream),
    };
    let skipped = stream.skipped();
    drop(stream);

    if let Some(minifier) = minifier.as_mut() {
        if let Err(e) = minifier.dispose() {
            warn!(error = %e, "Removing minifier workspace failed");
        }
    }
    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(error = %e, scratch = %scratch_path.display(), "Removing stamp scratch directory failed");
    }

    let mut report = result?;
    report.skipped = skipped;
    info!(
        files = report.files,
        stamps = report.stamps,
        uploads = report.uploads,
        skipped = report.skipped,
        "Extract finished"
    );
    Ok(report)
}
