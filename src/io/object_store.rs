use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::IoError;

/// Immutable identifier of an object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    pub bucket: String,
    pub key: String,
}

impl RemoteKey {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Whole-object access to a remote object store.
///
/// Implementations must report a missing object as [`IoError::NotFound`],
/// distinct from transport or permission failures.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether the object exists.
    async fn exists(&self, key: &RemoteKey) -> Result<bool, IoError>;

    /// Fetch the whole object into memory.
    async fn get(&self, key: &RemoteKey) -> Result<Bytes, IoError>;

    /// Write the whole object to `dest`, creating or truncating it.
    ///
    /// Returns the number of bytes written. The default implementation
    /// buffers the object via [`get`](Self::get); backends that can stream
    /// should override it.
    async fn download(&self, key: &RemoteKey, dest: &Path) -> Result<u64, IoError> {
        let data = self.get(key).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        Ok(data.len() as u64)
    }

    /// Delete the object. Deleting a missing object is not an error.
    async fn delete(&self, key: &RemoteKey) -> Result<(), IoError>;
}
