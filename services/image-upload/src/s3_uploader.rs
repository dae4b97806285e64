use crate::config::S3Config;
use crate::error::UploadError;
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::SdkConfig;
use tracing::{debug, error, info, instrument};

/// Prefix under which uploaded images are stored
pub const UPLOAD_PREFIX: &str = "uploads";

/// Storage key for a photo: `uploads/{photo_id}`
pub fn storage_key(photo_id: i64) -> String {
    format!("{UPLOAD_PREFIX}/{photo_id}")
}

/// Binary object store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `content` to `bucket` under `key`
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UploadError>;

    /// Public URL of an object
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

/// S3 implementation of [`ObjectStore`]
pub struct S3Uploader {
    client: S3Client,
    region: String,
}

impl S3Uploader {
    /// Create a new S3 uploader
    pub fn new(sdk_config: &SdkConfig, config: &S3Config) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(sdk_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());

        info!(
            region = %region,
            default_bucket = ?config.default_bucket,
            "S3 uploader initialized"
        );

        Self { client, region }
    }
}

#[async_trait]
impl ObjectStore for S3Uploader {
    #[instrument(skip(self, content), fields(size_bytes = content.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<(), UploadError> {
        debug!("Uploading object to S3");

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(content))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                error!(error = %message, "Error uploading to S3");
                UploadError::Storage {
                    key: key.to_string(),
                    message,
                }
            })?;

        info!("Object uploaded successfully");
        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        virtual_hosted_url(bucket, &self.region, key)
    }
}

/// Virtual-hosted style S3 URL
fn virtual_hosted_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
}
