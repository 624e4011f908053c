//! Client of an external metadata center (the backing store of `remote` storage).

use async_trait::async_trait;

use crate::error::MetadataServiceError;
use crate::models::MetadataInfo;

#[async_trait]
pub trait MetadataCenterClient: Send + Sync {
    /// Cheap reachability probe.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` when the center cannot be reached.
    async fn ping(&self) -> Result<(), MetadataServiceError>;

    /// Store a snapshot under `(info.app, info.revision)` and mark it latest for the app.
    ///
    /// # Errors
    ///
    /// Returns an error if the center rejects the write or is unreachable.
    async fn publish(&self, info: &MetadataInfo) -> Result<(), MetadataServiceError>;

    /// Fetch a snapshot; `revision == None` means the latest published one.
    ///
    /// # Errors
    ///
    /// Returns an error if the center is unreachable.
    async fn fetch(
        &self,
        app: &str,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError>;
}
