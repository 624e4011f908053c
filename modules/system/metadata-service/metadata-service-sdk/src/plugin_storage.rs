//! Storage strategy plugin API.
//!
//! A strategy decides where exported metadata lives and where queries are
//! answered from. Implementations are produced by factories registered under a
//! storage key (`local`, `remote`, `composite`).

use async_trait::async_trait;

use crate::error::MetadataServiceError;
use crate::models::{MetadataInfo, ServiceQuery, ServiceUrl};

#[async_trait]
pub trait MetadataStorage: Send + Sync {
    /// Storage key this strategy was registered under.
    fn kind(&self) -> &str;

    /// Store the current snapshot before the metadata service goes live.
    ///
    /// Called again whenever the set of exported services changes.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` when a backing store cannot be reached.
    async fn prepare(&self, info: &MetadataInfo) -> Result<(), MetadataServiceError>;

    /// Endpoints matching the query.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn lookup(&self, query: &ServiceQuery) -> Result<Vec<ServiceUrl>, MetadataServiceError>;

    /// Snapshot for the given revision, or the latest one when `revision` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError>;
}
