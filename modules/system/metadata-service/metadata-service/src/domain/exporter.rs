//! Exports this application's metadata service over the transport.
//!
//! `export` and `unexport` are idempotent and single-flight: concurrent callers
//! serialize on one async lock and re-check the state after acquiring it. Readers
//! never take that lock; they load an immutable [`ExportedState`] snapshot that is
//! replaced as a whole, so a partially built endpoint list is never observable.

use std::sync::Arc;

use arc_swap::ArcSwap;
use metadata_service_sdk::{
    APPLICATION_KEY, BindSpec, GROUP_KEY, ListenerHandle, METADATA_SERVICE_NAME,
    METADATA_SERVICE_VERSION, METADATA_TYPE_KEY, MetadataServiceClient, MetadataStorage, SIDE_KEY,
    ServiceUrl, VERSION_KEY,
};
use tokio::sync::Mutex;

use super::error::ExportError;
use super::selector::select_endpoint;
use super::service::{MetadataServiceImpl, MetadataServiceInvoker};
use crate::context::AppContext;

pub(crate) const PROVIDER_SIDE: &str = "provider";

struct ExportedEndpoint {
    url: ServiceUrl,
    handle: ListenerHandle,
}

#[derive(Default)]
struct ExportedState {
    exported: bool,
    /// Index 0 is the primary endpoint.
    endpoints: Vec<ExportedEndpoint>,
    service: Option<Arc<MetadataServiceImpl>>,
}

pub struct MetadataServiceExporter {
    ctx: Arc<AppContext>,
    state: ArcSwap<ExportedState>,
    export_lock: Mutex<()>,
}

impl MetadataServiceExporter {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            state: ArcSwap::from_pointee(ExportedState::default()),
            export_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn is_exported(&self) -> bool {
        self.state.load().exported
    }

    /// Whether a storage strategy is registered under `storage_type`.
    #[must_use]
    pub fn supports(&self, storage_type: &str) -> bool {
        self.ctx.storage_registry().contains(storage_type)
    }

    /// URLs of the last successful export; empty when not exported.
    #[must_use]
    pub fn exported_urls(&self) -> Vec<ServiceUrl> {
        self.state
            .load()
            .endpoints
            .iter()
            .map(|e| e.url.clone())
            .collect()
    }

    /// In-process query surface of the exported metadata service.
    #[must_use]
    pub fn metadata_service(&self) -> Option<Arc<dyn MetadataServiceClient>> {
        self.state
            .load()
            .service
            .clone()
            .map(|s| s as Arc<dyn MetadataServiceClient>)
    }

    /// Export the metadata service. A no-op when already exported.
    ///
    /// # Errors
    ///
    /// Returns `ExportError` if the storage type is unknown, storage preparation
    /// fails, or the endpoint cannot be bound or published. The exporter stays
    /// unexported and holds no listener in that case.
    #[tracing::instrument(skip_all, fields(app = %self.ctx.app_name()))]
    pub async fn export(&self) -> Result<(), ExportError> {
        if self.is_exported() {
            tracing::debug!("Metadata service already exported");
            return Ok(());
        }

        let _export_guard = self.export_lock.lock().await;

        if self.is_exported() {
            tracing::debug!("Metadata service exported by a concurrent caller");
            return Ok(());
        }

        let config = &self.ctx.config().metadata;
        let storage = self
            .ctx
            .storage_registry()
            .create(&config.metadata_type, &self.ctx.storage_context())?;

        let choice = select_endpoint(config, &self.ctx.transport().listeners(), self.ctx.host());
        tracing::debug!(
            protocol = %choice.protocol,
            port = choice.port,
            source = ?choice.source,
            "Metadata service endpoint selected"
        );

        // Bind before prepare: a failed bind must not reach the storage backend.
        let transport = self.ctx.transport();
        let spec = BindSpec::new(&choice.protocol, &choice.host, choice.port).for_metadata();
        let handle = transport.bind(&spec).await?;

        if let Err(err) = storage.prepare(&self.ctx.local_metadata().snapshot()).await {
            transport.unbind(&handle).await;
            return Err(err.into());
        }

        let service = Arc::new(MetadataServiceImpl::new(
            self.ctx.app_name(),
            Arc::clone(&storage),
        ));
        let endpoint = self.publish(handle, storage.as_ref(), &service).await?;

        tracing::info!(
            url = %endpoint.url,
            storage = storage.kind(),
            "Metadata service exported"
        );

        self.state.store(Arc::new(ExportedState {
            exported: true,
            endpoints: vec![endpoint],
            service: Some(service),
        }));
        Ok(())
    }

    /// Publish the metadata service on a bound listener, releasing it on failure.
    async fn publish(
        &self,
        handle: ListenerHandle,
        storage: &dyn MetadataStorage,
        service: &Arc<MetadataServiceImpl>,
    ) -> Result<ExportedEndpoint, ExportError> {
        let transport = self.ctx.transport();
        let url = ServiceUrl::new(
            handle.protocol(),
            handle.host(),
            handle.port(),
            METADATA_SERVICE_NAME,
        )
        .with_param(GROUP_KEY, self.ctx.app_name())
        .with_param(VERSION_KEY, METADATA_SERVICE_VERSION)
        .with_param(SIDE_KEY, PROVIDER_SIDE)
        .with_param(APPLICATION_KEY, self.ctx.app_name())
        .with_param(METADATA_TYPE_KEY, storage.kind());

        let invoker = Arc::new(MetadataServiceInvoker::new(
            Arc::clone(service) as Arc<dyn MetadataServiceClient>
        ));
        if let Err(source) = transport.publish(&handle, &url.service_key(), invoker) {
            transport.unbind(&handle).await;
            return Err(ExportError::Publish {
                address: url.address(),
                source,
            });
        }

        Ok(ExportedEndpoint { url, handle })
    }

    /// Withdraw the metadata service. A no-op when not exported.
    ///
    /// Shared listeners stay open while ordinary services still hold them.
    #[tracing::instrument(skip_all, fields(app = %self.ctx.app_name()))]
    pub async fn unexport(&self) {
        if !self.is_exported() {
            tracing::debug!("Metadata service not exported");
            return;
        }

        let _export_guard = self.export_lock.lock().await;

        let previous = self.state.swap(Arc::new(ExportedState::default()));
        if !previous.exported {
            return;
        }

        let transport = self.ctx.transport();
        for endpoint in &previous.endpoints {
            transport.unpublish(&endpoint.handle, &endpoint.url.service_key());
            transport.unbind(&endpoint.handle).await;
            tracing::info!(url = %endpoint.url, "Metadata service unexported");
        }
    }

    /// Push the current local snapshot to the active storage strategy.
    ///
    /// Called after services exported late; a no-op when not exported.
    ///
    /// # Errors
    ///
    /// Returns `ExportError` if the storage strategy fails to accept the snapshot.
    pub async fn refresh(&self) -> Result<(), ExportError> {
        let _export_guard = self.export_lock.lock().await;
        let Some(service) = self.state.load().service.clone() else {
            return Ok(());
        };
        let snapshot = self.ctx.local_metadata().snapshot();
        tracing::debug!(revision = %snapshot.revision, "Refreshing exported metadata");
        service.storage().prepare(&snapshot).await?;
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ApplicationConfig;
    use crate::infra::transport::InMemoryTransport;
    use async_trait::async_trait;
    use metadata_service_sdk::{Invocation, ServiceInvoker, Transport};
    use tracing_test::traced_test;

    struct Squatter;

    #[async_trait]
    impl ServiceInvoker for Squatter {
        async fn invoke(&self, _invocation: Invocation) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn exporter_with(transport: Arc<InMemoryTransport>) -> MetadataServiceExporter {
        let config = ApplicationConfig {
            name: "unit-app".to_owned(),
            ..ApplicationConfig::default()
        };
        let ctx = AppContext::builder(config)
            .transport(transport as Arc<dyn Transport>)
            .build();
        MetadataServiceExporter::new(ctx)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_export_logs_and_sets_state() {
        let transport = Arc::new(InMemoryTransport::new());
        let exporter = exporter_with(Arc::clone(&transport));

        exporter.export().await.unwrap();

        assert!(exporter.is_exported());
        let urls = exporter.exported_urls();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].path(), METADATA_SERVICE_NAME);
        assert_eq!(urls[0].group(), Some("unit-app"));
        assert_eq!(urls[0].param(METADATA_TYPE_KEY), Some("local"));
        assert_ne!(urls[0].port(), 0);
        assert!(logs_contain("Metadata service exported"));
    }

    #[tokio::test]
    async fn test_publish_failure_releases_listener() {
        let transport = Arc::new(InMemoryTransport::new());
        let exporter = exporter_with(Arc::clone(&transport));

        // Take the metadata service key on the port the exporter will share.
        let handle = transport
            .bind(&BindSpec::new("dubbo", "127.0.0.1", 2002))
            .await
            .unwrap();
        let key = ServiceUrl::new("dubbo", "127.0.0.1", 2002, METADATA_SERVICE_NAME)
            .with_param(GROUP_KEY, "unit-app")
            .with_param(VERSION_KEY, METADATA_SERVICE_VERSION)
            .service_key();
        transport.publish(&handle, &key, Arc::new(Squatter)).unwrap();

        let err = exporter.export().await.unwrap_err();
        assert!(matches!(err, ExportError::Publish { .. }));
        assert!(!exporter.is_exported());
        assert!(exporter.exported_urls().is_empty());

        let listeners = transport.listeners();
        assert_eq!(listeners.len(), 1);
        assert_eq!(transport.ref_count(2002), Some(1));
    }

    #[tokio::test]
    async fn test_refresh_is_noop_when_not_exported() {
        let exporter = exporter_with(Arc::new(InMemoryTransport::new()));
        exporter.refresh().await.unwrap();
        assert!(exporter.metadata_service().is_none());
    }
}
