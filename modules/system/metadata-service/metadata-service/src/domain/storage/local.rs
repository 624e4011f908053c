use std::sync::Arc;

use async_trait::async_trait;
use metadata_service_sdk::{
    MetadataInfo, MetadataServiceError, MetadataStorage, ServiceQuery, ServiceUrl,
};
use parking_lot::RwLock;

use super::LOCAL_STORAGE;
use crate::domain::local_metadata::LocalMetadata;

/// Serves metadata straight from the in-process repository.
///
/// The last prepared snapshot is kept so a consumer holding its revision can
/// still fetch it after the live set has moved on.
pub struct LocalMetadataStorage {
    local: Arc<LocalMetadata>,
    prepared: RwLock<Option<MetadataInfo>>,
}

impl LocalMetadataStorage {
    #[must_use]
    pub fn new(local: Arc<LocalMetadata>) -> Self {
        Self {
            local,
            prepared: RwLock::new(None),
        }
    }
}

#[async_trait]
impl MetadataStorage for LocalMetadataStorage {
    fn kind(&self) -> &str {
        LOCAL_STORAGE
    }

    async fn prepare(&self, info: &MetadataInfo) -> Result<(), MetadataServiceError> {
        *self.prepared.write() = Some(info.clone());
        Ok(())
    }

    async fn lookup(&self, query: &ServiceQuery) -> Result<Vec<ServiceUrl>, MetadataServiceError> {
        Ok(self.local.lookup(query))
    }

    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError> {
        let live = self.local.snapshot();
        let Some(revision) = revision else {
            return Ok(Some(live));
        };
        if live.revision == revision {
            return Ok(Some(live));
        }
        Ok(self
            .prepared
            .read()
            .as_ref()
            .filter(|info| info.revision == revision)
            .cloned())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn url(port: u16) -> ServiceUrl {
        ServiceUrl::new("dubbo", "127.0.0.1", port, "demo.DemoService")
    }

    #[tokio::test]
    async fn test_reads_live_repository() {
        let local = Arc::new(LocalMetadata::new("app"));
        let storage = LocalMetadataStorage::new(Arc::clone(&local));

        local.add(url(2002));
        let urls = storage
            .lookup(&ServiceQuery::new("demo.DemoService"))
            .await
            .unwrap();
        assert_eq!(urls, vec![url(2002)]);
    }

    #[tokio::test]
    async fn test_prepared_revision_stays_reachable() {
        let local = Arc::new(LocalMetadata::new("app"));
        let storage = LocalMetadataStorage::new(Arc::clone(&local));

        local.add(url(2002));
        let first = local.snapshot();
        storage.prepare(&first).await.unwrap();
        local.add(url(2003));

        let old = storage.metadata_info(Some(&first.revision)).await.unwrap();
        assert_eq!(old, Some(first));

        let latest = storage.metadata_info(None).await.unwrap().unwrap();
        assert_eq!(latest.all_urls().count(), 2);

        assert!(storage.metadata_info(Some("deadbeef")).await.unwrap().is_none());
    }
}
