use crate::{
    domain::FileStorage,
    errors::StorageError,
    models::StoredFile,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    primitives::ByteStream,
    Client as S3Client,
    error::SdkError,
};
use bytes::Bytes;
use tracing;

/// Folder screenshots are uploaded into. Older ids were recorded without it.
pub const SCREENSHOT_FOLDER: &str = "screenshots";

/// The hosted image store: an S3 bucket whose objects are served back
/// through `/assets/{key}`.
#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String, public_base_url: String) -> Self {
        Self { client, bucket_name, public_base_url }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/assets/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data to S3 using PutObject. Sets Content-Type.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<StoredFile, StorageError> {
        let ct_log = content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, content_type = ?content_type, "S3: Uploading file");

        let body = ByteStream::from(data);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .content_type(ct_log)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?; // Map to specific upload error

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(StoredFile {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }

    /// Downloads file data and its content type from S3 using GetObject.
    async fn download(&self, key: &str) -> Result<(Bytes, Option<String>), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Downloading file");

        let output = self.client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| { // Map SdkError
                // Check specifically for NoSuchKey
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_no_such_key() {
                        tracing::warn!(s3_key = %key, bucket = %self.bucket_name, "S3: NoSuchKey error downloading file");
                        return StorageError::NotFound(key.to_string());
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error downloading file");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to download object with key '{}'", key)))
            })?;

        let content_type = output.content_type().map(|s| s.to_string());

        // Collect the stream into memory; screenshots are bounded by the upload limit.
        let data = output
            .body
            .collect()
            .await
            .context(format!("S3: Failed to read body of object with key '{}'", key))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, ?content_type, "S3: Download successful");
        Ok((data.into_bytes(), content_type))
    }

    /// Deletes an object from S3. DeleteObject succeeds for missing keys, so
    /// existence is checked with HeadObject first.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Deleting object");

        self.client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_not_found() {
                        return StorageError::NotFound(key.to_string());
                    }
                }
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to look up object with key '{}'", key)))
            })?;

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error deleting object");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to delete object with key '{}'", key)))
            })?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Delete request successful");
        Ok(())
    }

    fn folder_prefix(&self) -> Option<&str> {
        Some(SCREENSHOT_FOLDER)
    }
}
