use async_trait::async_trait;
use metadata_service_sdk::{
    MetadataInfo, MetadataServiceError, MetadataStorage, ServiceQuery, ServiceUrl,
};

use super::{COMPOSITE_STORAGE, LocalMetadataStorage, RemoteMetadataStorage};

/// Writes to both stores; reads local first and falls back to remote on a miss.
pub struct CompositeMetadataStorage {
    local: LocalMetadataStorage,
    remote: RemoteMetadataStorage,
}

impl CompositeMetadataStorage {
    #[must_use]
    pub fn new(local: LocalMetadataStorage, remote: RemoteMetadataStorage) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl MetadataStorage for CompositeMetadataStorage {
    fn kind(&self) -> &str {
        COMPOSITE_STORAGE
    }

    async fn prepare(&self, info: &MetadataInfo) -> Result<(), MetadataServiceError> {
        self.local.prepare(info).await?;
        self.remote.prepare(info).await
    }

    async fn lookup(&self, query: &ServiceQuery) -> Result<Vec<ServiceUrl>, MetadataServiceError> {
        let found = self.local.lookup(query).await?;
        if !found.is_empty() {
            return Ok(found);
        }
        tracing::debug!(interface = %query.interface, "Local metadata miss, querying center");
        self.remote.lookup(query).await
    }

    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError> {
        let local = self.local.metadata_info(revision).await?;
        if let Some(info) = local.filter(|info| !info.is_empty()) {
            return Ok(Some(info));
        }
        self.remote.metadata_info(revision).await
    }
}
