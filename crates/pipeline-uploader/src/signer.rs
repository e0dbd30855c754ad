//! Presigned PUT URLs for direct uploads

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    Client,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::S3Config;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum SignError {
    #[error("invalid expiry: {0}")]
    Expiry(String),

    #[error("presigning failed: {0}")]
    Presign(String),
}

#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// URL that accepts one PUT of `object` with the given content type.
    async fn put_url(
        &self,
        object: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, SignError>;
}

#[derive(Clone)]
pub struct S3UrlSigner {
    client: Client,
    bucket: String,
}

impl S3UrlSigner {
    pub async fn new(config: &S3Config, bucket: impl Into<String>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.path_style);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "pipeline-uploader",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let bucket = bucket.into();
        info!(bucket = %bucket, region = %config.region, "URL signer initialized");

        Self {
            client: Client::from_conf(builder.build()),
            bucket,
        }
    }
}

#[async_trait]
impl UrlSigner for S3UrlSigner {
    #[instrument(skip(self))]
    async fn put_url(
        &self,
        object: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, SignError> {
        let presigning =
            PresigningConfig::expires_in(expires_in).map_err(|e| SignError::Expiry(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| SignError::Presign(e.to_string()))?;

        debug!(bucket = %self.bucket, "Generated presigned PUT URL");
        Ok(request.uri().to_string())
    }
}
