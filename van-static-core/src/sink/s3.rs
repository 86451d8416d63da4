//! [`ObjectStore`] on top of the AWS S3 SDK.
//!
//! Credentials are either passed explicitly or picked up from the ambient
//! AWS environment (`AWS_ACCESS_KEY_ID`, profiles, instance metadata, ...).
//! An `endpoint_url` switches to an S3-compatible service with path-style
//! addressing.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials as AwsCredentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, StorageClass};
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use crate::contract::{ObjectStore, PutObject, StoreError};
use crate::sink::Credentials;

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for `bucket`. No request is made until the first call.
    pub async fn connect(bucket: &str, credentials: &Credentials) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        match (&credentials.access_key, &credentials.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                info!("Using explicit AWS credentials");
                loader = loader.credentials_provider(AwsCredentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "van-static",
                ));
            }
            (None, None) => info!("Using AWS credentials from the environment"),
            _ => warn!("Ignoring an access key or secret key given without the other"),
        }
        if let Some(region) = &credentials.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &credentials.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(credentials.endpoint_url.is_some())
            .build();
        info!(bucket, "S3 client ready");
        S3Store {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        debug!(bucket = %self.bucket, key, "HEAD object");
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(false),
            Err(e) => Err(format!("HEAD {key}: {}", DisplayErrorContext(&e)).into()),
        }
    }

    async fn put(&self, object: &PutObject) -> Result<(), StoreError> {
        debug!(
            bucket = %self.bucket,
            key = %object.key,
            content_type = ?object.content_type,
            content_encoding = ?object.content_encoding,
            "PUT object"
        );
        let body = ByteStream::from_path(&object.source)
            .await
            .map_err(|e| format!("reading {}: {e}", object.source.display()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .body(body)
            .acl(ObjectCannedAcl::PublicRead)
            .storage_class(StorageClass::ReducedRedundancy)
            .cache_control(&object.cache_control)
            .set_content_type(object.content_type.clone())
            .set_content_encoding(object.content_encoding.clone())
            .send()
            .await
            .map_err(|e| format!("PUT {}: {}", object.key, DisplayErrorContext(&e)))?;
        Ok(())
    }
}
