//! Opaque byte storage keyed by adapter-generated locations.
//!
//! Callers hand over bytes and get back a location string; they never choose
//! keys themselves. The real implementation talks to any S3-compatible object
//! store (MinIO in development), and a recording mock is always available for
//! tests.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::{error::SdkError, primitives::ByteStream, Client as AwsS3SdkClient};
use envconfig::Envconfig;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};
use uuid::Uuid;

mod mock;

pub use mock::{BlobStoreCall, MockBlobStore};

const BLOB_SAVE: &str = "blob_store_save_ms";
const BLOB_LOAD: &str = "blob_store_load_ms";
const BLOB_DELETE: &str = "blob_store_delete_ms";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object storage operation failed: {0}")]
    OperationFailed(String),
}

#[derive(Envconfig, Clone, Debug)]
pub struct ObjectStorageConfig {
    #[envconfig(from = "OBJECT_STORAGE_ENDPOINT", default = "http://localhost:9000")]
    pub endpoint: String,

    #[envconfig(from = "OBJECT_STORAGE_REGION", default = "us-east-1")]
    pub region: String,

    #[envconfig(from = "OBJECT_STORAGE_ACCESS_KEY_ID", default = "minioadmin")]
    pub access_key_id: String,

    #[envconfig(from = "OBJECT_STORAGE_SECRET_ACCESS_KEY", default = "minioadmin")]
    pub secret_access_key: String,

    #[envconfig(from = "OBJECT_STORAGE_BUCKET", default = "text-analysis")]
    pub bucket: String,

    // MinIO only serves path-style requests
    #[envconfig(from = "OBJECT_STORAGE_FORCE_PATH_STYLE", default = "true")]
    pub force_path_style: bool,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `data` under a freshly generated key and returns that key.
    async fn save(&self, data: Vec<u8>) -> Result<String, BlobStoreError>;

    async fn load(&self, location: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, location: &str) -> Result<(), BlobStoreError>;

    /// Cheap reachability check, used by the liveness probe.
    async fn ping(&self) -> Result<(), BlobStoreError>;
}

/// Produces `<prefix>/<uuid-v7>.<extension>` keys. An empty prefix yields
/// `<uuid>.<extension>`, an empty extension drops the dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: String,
    extension: String,
}

impl KeyScheme {
    pub fn new(prefix: &str, extension: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };
        Self {
            prefix,
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn generate(&self) -> String {
        let id = Uuid::now_v7();
        if self.extension.is_empty() {
            format!("{}{}", self.prefix, id)
        } else {
            format!("{}{}.{}", self.prefix, id, self.extension)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

pub struct S3BlobStore {
    client: AwsS3SdkClient,
    bucket: String,
    keys: KeyScheme,
    bucket_ready: OnceCell<()>,
}

impl S3BlobStore {
    pub fn new(client: AwsS3SdkClient, bucket: String, keys: KeyScheme) -> Self {
        Self {
            client,
            bucket,
            keys,
            bucket_ready: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ObjectStorageConfig, keys: KeyScheme) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "environment",
        );
        let aws_conf = aws_sdk_s3::config::Builder::new()
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style)
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build();

        Self::new(
            AwsS3SdkClient::from_conf(aws_conf),
            config.bucket.clone(),
            keys,
        )
    }

    /// Checks the bucket once per process, creating it when missing.
    async fn ensure_bucket(&self) -> Result<(), BlobStoreError> {
        self.bucket_ready
            .get_or_try_init(|| async {
                if self
                    .client
                    .head_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .is_ok()
                {
                    return Ok(());
                }

                match self.client.create_bucket().bucket(&self.bucket).send().await {
                    Ok(_) => {
                        info!(bucket = %self.bucket, "created object storage bucket");
                        Ok(())
                    }
                    Err(SdkError::ServiceError(err))
                        if err.err().is_bucket_already_owned_by_you()
                            || err.err().is_bucket_already_exists() =>
                    {
                        Ok(())
                    }
                    Err(err) => Err(BlobStoreError::OperationFailed(format!(
                        "failed to create bucket {}: {}",
                        self.bucket,
                        aws_sdk_s3::Error::from(err)
                    ))),
                }
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn save(&self, data: Vec<u8>) -> Result<String, BlobStoreError> {
        self.ensure_bucket().await?;

        let key = self.keys.generate();
        let start = common_metrics::timing_guard(BLOB_SAVE, &[]);
        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await;

        match res {
            Ok(_) => {
                start.label("outcome", "success").fin();
                Ok(key)
            }
            Err(err) => {
                start.label("outcome", "failure").fin();
                let err = aws_sdk_s3::Error::from(err);
                error!(key = %key, error = %err, "failed to put object");
                Err(BlobStoreError::OperationFailed(err.to_string()))
            }
        }
    }

    async fn load(&self, location: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.ensure_bucket().await?;

        let start = common_metrics::timing_guard(BLOB_LOAD, &[]);
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(location)
            .send()
            .await;

        match res {
            Ok(res) => {
                let data = res.body.collect().await.map_err(|e| {
                    BlobStoreError::OperationFailed(format!("failed to read object body: {e}"))
                })?;
                start.label("outcome", "success").fin();
                Ok(data.to_vec())
            }
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => {
                start.label("outcome", "not_found").fin();
                Err(BlobStoreError::NotFound(location.to_string()))
            }
            Err(err) => {
                start.label("outcome", "failure").fin();
                let err = aws_sdk_s3::Error::from(err);
                error!(key = %location, error = %err, "failed to get object");
                Err(BlobStoreError::OperationFailed(err.to_string()))
            }
        }
    }

    async fn delete(&self, location: &str) -> Result<(), BlobStoreError> {
        let start = common_metrics::timing_guard(BLOB_DELETE, &[]);
        let res = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(location)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BlobStoreError::OperationFailed(aws_sdk_s3::Error::from(e).to_string()));

        start
            .label("outcome", if res.is_ok() { "success" } else { "failure" })
            .fin();
        res
    }

    async fn ping(&self) -> Result<(), BlobStoreError> {
        // A fresh deployment has no bucket until it is created here
        if !self.bucket_ready.initialized() {
            return self.ensure_bucket().await;
        }

        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BlobStoreError::OperationFailed(aws_sdk_s3::Error::from(e).to_string()))
    }
}

/// Liveness probe wrapper around any blob store.
pub struct BlobStoreProbe(pub Arc<dyn BlobStore>);

#[async_trait]
impl health::Probe for BlobStoreProbe {
    async fn probe(&self) -> bool {
        match self.0.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "object storage probe failed");
                false
            }
        }
    }
}
