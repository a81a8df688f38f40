use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::object_store::{ObjectStore, RemoteKey};
use crate::error::IoError;

/// S3-backed implementation of [`ObjectStore`].
///
/// Works with AWS S3 and S3-compatible services (MinIO, etc.). Downloads are
/// streamed chunk by chunk to disk rather than buffered in memory, since
/// slide files routinely run to several gigabytes.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Decide whether an SDK failure means "object missing".
///
/// The typed service error is checked first, then the raw status code, then
/// the rendered message for S3-compatible services that answer with
/// non-standard error bodies.
fn classify(
    key: &RemoteKey,
    typed_not_found: bool,
    status: Option<u16>,
    message: String,
) -> IoError {
    if typed_not_found || status == Some(404) {
        return IoError::NotFound(key.to_string());
    }

    if message.contains("NotFound") || message.contains("NoSuchKey") {
        return IoError::NotFound(key.to_string());
    }

    IoError::S3(message)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, key: &RemoteKey) -> Result<bool, IoError> {
        let result = self
            .client
            .head_object()
            .bucket(&key.bucket)
            .key(&key.key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let typed = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                let status = e.raw_response().map(|r| r.status().as_u16());

                match classify(key, typed, status, e.to_string()) {
                    IoError::NotFound(_) => Ok(false),
                    other => Err(other),
                }
            }
        }
    }

    async fn get(&self, key: &RemoteKey) -> Result<Bytes, IoError> {
        let resp = self
            .client
            .get_object()
            .bucket(&key.bucket)
            .key(&key.key)
            .send()
            .await
            .map_err(|e| {
                let typed = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                let status = e.raw_response().map(|r| r.status().as_u16());
                classify(key, typed, status, e.to_string())
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    async fn download(&self, key: &RemoteKey, dest: &Path) -> Result<u64, IoError> {
        let resp = self
            .client
            .get_object()
            .bucket(&key.bucket)
            .key(&key.key)
            .send()
            .await
            .map_err(|e| {
                let typed = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                let status = e.raw_response().map(|r| r.status().as_u16());
                classify(key, typed, status, e.to_string())
            })?;

        let mut body = resp.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!(object = %key, bytes = written, "downloaded object");
        Ok(written)
    }

    async fn delete(&self, key: &RemoteKey) -> Result<(), IoError> {
        self.client
            .delete_object()
            .bucket(&key.bucket)
            .key(&key.key)
            .send()
            .await
            .map_err(|e| IoError::S3(e.to_string()))?;
        Ok(())
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
