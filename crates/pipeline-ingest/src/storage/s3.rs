//! S3-compatible object store (AWS S3, MinIO, GCS interoperability endpoint)

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    Client,
};
use tracing::{debug, info, instrument};

use super::{decode_text, FetchError, FetchedText, ObjectRef, ObjectStore};
use crate::config::StorageConfig;

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from configuration. Static credentials are used when
    /// both keys are configured; otherwise the default provider chain applies.
    pub async fn new(config: &StorageConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.path_style);

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            builder = builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "pipeline-ingest",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Object store client initialized"
        );

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, object), fields(object = %object))]
    async fn fetch_text(&self, object: &ObjectRef) -> Result<FetchedText, FetchError> {
        let head = self
            .client
            .head_object()
            .bucket(&object.container)
            .key(&object.object)
            .send()
            .await;
        if let Err(e) = head {
            if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                return Err(FetchError::NotFound(object.clone()));
            }
            return Err(FetchError::Storage {
                object: object.clone(),
                message: e.to_string(),
            });
        }

        let response = match self
            .client
            .get_object()
            .bucket(&object.container)
            .key(&object.object)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Deleted between the existence check and the read
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Err(FetchError::NotFound(object.clone()));
                }
                return Err(FetchError::Storage {
                    object: object.clone(),
                    message: e.to_string(),
                });
            },
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| FetchError::Storage {
                object: object.clone(),
                message: format!("failed to read body: {}", e),
            })?
            .into_bytes()
            .to_vec();

        debug!(bytes = bytes.len(), "Downloaded object");
        Ok(decode_text(bytes))
    }
}
