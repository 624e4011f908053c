//! Application context shared by the exporter and the deployer.

use std::sync::Arc;

use metadata_service_sdk::{MetadataCenterClient, Transport};
use uuid::Uuid;

use crate::config::ApplicationConfig;
use crate::domain::local_metadata::LocalMetadata;
use crate::domain::storage::{StorageContext, StorageRegistry};
use crate::infra::transport::InMemoryTransport;

/// Everything one application instance needs to export services and metadata.
///
/// Built once and passed around by `Arc`.
pub struct AppContext {
    instance_id: Uuid,
    config: ApplicationConfig,
    transport: Arc<dyn Transport>,
    storages: StorageRegistry,
    metadata_center: Option<Arc<dyn MetadataCenterClient>>,
    local_metadata: Arc<LocalMetadata>,
}

impl AppContext {
    #[must_use]
    pub fn builder(config: ApplicationConfig) -> AppContextBuilder {
        AppContextBuilder {
            config,
            transport: None,
            storages: None,
            metadata_center: None,
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.config.name
    }

    /// Host advertised in exported URLs.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    #[must_use]
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    #[must_use]
    pub fn storage_registry(&self) -> &StorageRegistry {
        &self.storages
    }

    #[must_use]
    pub fn local_metadata(&self) -> &Arc<LocalMetadata> {
        &self.local_metadata
    }

    pub(crate) fn storage_context(&self) -> StorageContext<'_> {
        StorageContext {
            local: &self.local_metadata,
            metadata_center: self.metadata_center.as_ref(),
        }
    }
}

pub struct AppContextBuilder {
    config: ApplicationConfig,
    transport: Option<Arc<dyn Transport>>,
    storages: Option<StorageRegistry>,
    metadata_center: Option<Arc<dyn MetadataCenterClient>>,
}

impl AppContextBuilder {
    /// Defaults to a fresh [`InMemoryTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`StorageRegistry::standard`].
    #[must_use]
    pub fn storage_registry(mut self, registry: StorageRegistry) -> Self {
        self.storages = Some(registry);
        self
    }

    #[must_use]
    pub fn metadata_center(mut self, center: Arc<dyn MetadataCenterClient>) -> Self {
        self.metadata_center = Some(center);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<AppContext> {
        let instance_id = Uuid::new_v4();
        tracing::debug!(app = %self.config.name, %instance_id, "Application context created");
        Arc::new(AppContext {
            instance_id,
            local_metadata: Arc::new(LocalMetadata::new(self.config.name.clone())),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(InMemoryTransport::new())),
            storages: self.storages.unwrap_or_default(),
            metadata_center: self.metadata_center,
            config: self.config,
        })
    }
}
