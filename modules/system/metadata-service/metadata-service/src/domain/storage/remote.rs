use std::sync::Arc;

use async_trait::async_trait;
use metadata_service_sdk::{
    MetadataCenterClient, MetadataInfo, MetadataServiceError, MetadataStorage, ServiceQuery,
    ServiceUrl,
};

use super::REMOTE_STORAGE;

/// Keeps metadata in an external metadata center.
pub struct RemoteMetadataStorage {
    app: String,
    center: Arc<dyn MetadataCenterClient>,
}

impl RemoteMetadataStorage {
    #[must_use]
    pub fn new(app: impl Into<String>, center: Arc<dyn MetadataCenterClient>) -> Self {
        Self {
            app: app.into(),
            center,
        }
    }
}

#[async_trait]
impl MetadataStorage for RemoteMetadataStorage {
    fn kind(&self) -> &str {
        REMOTE_STORAGE
    }

    async fn prepare(&self, info: &MetadataInfo) -> Result<(), MetadataServiceError> {
        self.center.ping().await?;
        self.center.publish(info).await?;
        tracing::debug!(app = %info.app, revision = %info.revision, "Metadata published to center");
        Ok(())
    }

    async fn lookup(&self, query: &ServiceQuery) -> Result<Vec<ServiceUrl>, MetadataServiceError> {
        Ok(self
            .center
            .fetch(&self.app, None)
            .await?
            .map(|info| info.urls_matching(query))
            .unwrap_or_default())
    }

    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError> {
        self.center.fetch(&self.app, revision).await
    }
}
