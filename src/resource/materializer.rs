//! Remote-to-local resource materialization.
//!
//! [`ResourceMaterializer::ensure_local`] guarantees that a remote object is
//! present on fast local storage before it is handed to a decoder. Requests
//! for the same `(kind, id, variant)` coalesce into one transfer:
//!
//! ```text
//! ensure_local ──► local file exists? ──yes──► path
//!                        │ no
//!                        ▼
//!              SingleFlight[kind_id_variant]
//!                        │ leader only
//!                        ▼
//!     exists(remote)? ──► download → {final}.partial ──► rename → {final}
//! ```
//!
//! A file visible under its final name is always complete: the transfer
//! writes to a `.partial` sibling and is renamed into place only after the
//! data has been flushed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::layout::{coordination_key, is_plain_component, ResourceKind, StorageLayout};
use crate::error::{IoError, MaterializeError};
use crate::io::{ObjectStore, RemoteKey};
use crate::single_flight::{FlightAborted, SingleFlight};

impl From<FlightAborted> for MaterializeError {
    fn from(aborted: FlightAborted) -> Self {
        MaterializeError::TransferFailed {
            key: aborted.key,
            reason: "download task ended before reporting a result".to_string(),
        }
    }
}

/// Makes remote objects available on local storage, one transfer per key.
pub struct ResourceMaterializer {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    flights: SingleFlight<PathBuf, MaterializeError>,
}

impl ResourceMaterializer {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout) -> Self {
        Self {
            store,
            layout,
            flights: SingleFlight::new(),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Number of transfers currently in progress.
    pub fn transfers_in_flight(&self) -> usize {
        self.flights.in_flight_count()
    }

    /// Ensure the resource is present locally and return its path.
    ///
    /// # Errors
    ///
    /// - [`MaterializeError::InvalidName`] if `id` or `variant` is not a plain
    ///   path component
    /// - [`MaterializeError::NotFound`] if the object is missing remotely
    /// - [`MaterializeError::TransferFailed`] if the transfer failed; every
    ///   concurrent caller receives the same error and a later call retries
    pub async fn ensure_local(
        &self,
        kind: ResourceKind,
        id: &str,
        variant: &str,
    ) -> Result<PathBuf, MaterializeError> {
        check_name(id)?;
        check_name(variant)?;

        let local_path = self.layout.local_path(kind, id, variant);
        if path_exists(&local_path).await {
            return Ok(local_path);
        }

        let key = coordination_key(kind, id, variant);
        let remote = self.layout.remote_key(kind, id, variant);
        let store = Arc::clone(&self.store);
        let dest = local_path.clone();

        let path = self
            .flights
            .run(&key, move || fetch(store, remote, dest))
            .await?;

        // Waiters re-check: the leader's file may have been discarded since.
        if path_exists(&path).await {
            Ok(path)
        } else {
            Err(MaterializeError::TransferFailed {
                key,
                reason: "local copy disappeared after download".to_string(),
            })
        }
    }

    /// Remove the local copy of a resource. Returns whether a file was removed.
    ///
    /// A transfer of the same resource still in flight is waited for first,
    /// so its rename cannot recreate the file afterwards.
    pub async fn discard_local(
        &self,
        kind: ResourceKind,
        id: &str,
        variant: &str,
    ) -> Result<bool, MaterializeError> {
        check_name(id)?;
        check_name(variant)?;

        self.flights
            .settle(&coordination_key(kind, id, variant))
            .await;

        let path = self.layout.local_path(kind, id, variant);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "discarded local copy");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MaterializeError::TransferFailed {
                key: coordination_key(kind, id, variant),
                reason: format!("failed to remove {}: {}", path.display(), e),
            }),
        }
    }

    /// Delete the remote object. Returns whether it existed.
    pub async fn delete_remote(
        &self,
        kind: ResourceKind,
        id: &str,
        variant: &str,
    ) -> Result<bool, MaterializeError> {
        check_name(id)?;
        check_name(variant)?;

        let remote = self.layout.remote_key(kind, id, variant);
        let transfer_failed = |e: IoError| MaterializeError::TransferFailed {
            key: remote.to_string(),
            reason: e.to_string(),
        };

        if !self.store.exists(&remote).await.map_err(transfer_failed)? {
            return Ok(false);
        }
        self.store.delete(&remote).await.map_err(transfer_failed)?;

        info!(object = %remote, "deleted remote object");
        Ok(true)
    }
}

fn check_name(value: &str) -> Result<(), MaterializeError> {
    if is_plain_component(value) {
        Ok(())
    } else {
        Err(MaterializeError::InvalidName(value.to_string()))
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// The leader's transfer. Runs detached from any single caller.
async fn fetch(
    store: Arc<dyn ObjectStore>,
    remote: RemoteKey,
    dest: PathBuf,
) -> Result<PathBuf, MaterializeError> {
    // Another process sharing the directory may have finished first
    if path_exists(&dest).await {
        return Ok(dest);
    }

    let failed = |reason: String| MaterializeError::TransferFailed {
        key: remote.to_string(),
        reason,
    };

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| failed(format!("cannot create {}: {}", parent.display(), e)))?;
    }

    match store.exists(&remote).await {
        Ok(true) => {}
        Ok(false) => return Err(MaterializeError::NotFound(remote.to_string())),
        Err(e) => return Err(failed(e.to_string())),
    }

    let partial = partial_path(&dest);
    info!(object = %remote, dest = %dest.display(), "downloading");

    match store.download(&remote, &partial).await {
        Ok(bytes) => {
            if let Err(e) = tokio::fs::rename(&partial, &dest).await {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(failed(format!("cannot publish {}: {}", dest.display(), e)));
            }
            info!(object = %remote, bytes, "download complete");
            Ok(dest)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            warn!(object = %remote, error = %e, "download failed");
            match e {
                IoError::NotFound(key) => Err(MaterializeError::NotFound(key)),
                other => Err(failed(other.to_string())),
            }
        }
    }
}
