//! Application lifecycle: exports ordinary services, then the metadata service,
//! then schedules delayed services. Stops in reverse order.

use std::sync::Arc;
use std::time::Duration;

use metadata_service_sdk::{
    APPLICATION_KEY, BindSpec, GROUP_KEY, ListenerHandle, SIDE_KEY, ServiceInvoker, ServiceUrl,
    VERSION_KEY,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{ProtocolConfig, ServiceConfig};
use crate::context::AppContext;
use crate::domain::error::DeployError;
use crate::domain::exporter::{MetadataServiceExporter, PROVIDER_SIDE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Pending,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

/// An ordinary service: its configuration plus the handler serving it.
#[derive(Clone)]
pub struct ServiceDefinition {
    pub config: ServiceConfig,
    pub invoker: Arc<dyn ServiceInvoker>,
}

struct ExportedService {
    url: ServiceUrl,
    handle: ListenerHandle,
}

/// Ordinary services currently exported, shared with delayed-export tasks.
struct ServiceExports {
    ctx: Arc<AppContext>,
    exported: Mutex<Vec<ExportedService>>,
}

impl ServiceExports {
    fn protocols_for(&self, config: &ServiceConfig) -> Vec<ProtocolConfig> {
        let app = self.ctx.config();
        match config.protocol.as_deref() {
            Some(name) => vec![
                app.protocol(name)
                    .cloned()
                    .unwrap_or_else(|| ProtocolConfig::new(name, None)),
            ],
            None if app.protocols.is_empty() => {
                vec![ProtocolConfig::new(&app.metadata.default_protocol, None)]
            }
            None => app.protocols.clone(),
        }
    }

    async fn export(&self, definition: &ServiceDefinition) -> Result<Vec<ServiceUrl>, DeployError> {
        let mut done = Vec::new();
        for protocol in self.protocols_for(&definition.config) {
            match self.export_on(definition, &protocol).await {
                Ok(exported) => done.push(exported),
                Err(err) => {
                    for exported in &done {
                        self.release(exported).await;
                    }
                    return Err(err);
                }
            }
        }

        let urls: Vec<ServiceUrl> = done.iter().map(|e| e.url.clone()).collect();
        for exported in &done {
            self.ctx.local_metadata().add(exported.url.clone());
        }
        self.exported.lock().extend(done);
        Ok(urls)
    }

    async fn export_on(
        &self,
        definition: &ServiceDefinition,
        protocol: &ProtocolConfig,
    ) -> Result<ExportedService, DeployError> {
        let config = &definition.config;
        let transport = self.ctx.transport();
        let host = protocol
            .host
            .clone()
            .unwrap_or_else(|| self.ctx.host().to_owned());
        let spec = BindSpec::new(&protocol.name, host, protocol.port.unwrap_or(0));
        let handle = transport
            .bind(&spec)
            .await
            .map_err(|source| DeployError::ServiceExport {
                service: config.interface.clone(),
                source,
            })?;

        let mut url = ServiceUrl::new(
            handle.protocol(),
            handle.host(),
            handle.port(),
            &config.interface,
        );
        if let Some(group) = &config.group {
            url = url.with_param(GROUP_KEY, group);
        }
        if let Some(version) = &config.version {
            url = url.with_param(VERSION_KEY, version);
        }
        let url = url
            .with_param(SIDE_KEY, PROVIDER_SIDE)
            .with_param(APPLICATION_KEY, self.ctx.app_name());

        if let Err(source) =
            transport.publish(&handle, &url.service_key(), Arc::clone(&definition.invoker))
        {
            transport.unbind(&handle).await;
            return Err(DeployError::ServiceExport {
                service: config.interface.clone(),
                source,
            });
        }

        tracing::info!(%url, "Service exported");
        Ok(ExportedService { url, handle })
    }

    async fn release(&self, exported: &ExportedService) {
        let transport = self.ctx.transport();
        transport.unpublish(&exported.handle, &exported.url.service_key());
        transport.unbind(&exported.handle).await;
    }

    async fn unexport_all(&self) {
        let exported = std::mem::take(&mut *self.exported.lock());
        for service in exported.iter().rev() {
            self.ctx.local_metadata().remove(&service.url);
            self.release(service).await;
            tracing::info!(url = %service.url, "Service unexported");
        }
    }

    fn urls(&self) -> Vec<ServiceUrl> {
        self.exported.lock().iter().map(|e| e.url.clone()).collect()
    }
}

/// Drives one application's start and stop.
pub struct ApplicationDeployer {
    ctx: Arc<AppContext>,
    exporter: Arc<MetadataServiceExporter>,
    services: Mutex<Vec<ServiceDefinition>>,
    exports: Arc<ServiceExports>,
    state: Mutex<DeployState>,
    lifecycle_lock: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
    delayed: TaskTracker,
}

impl ApplicationDeployer {
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let exporter = Arc::new(MetadataServiceExporter::new(Arc::clone(&ctx)));
        Self::with_exporter(ctx, exporter)
    }

    #[must_use]
    pub fn with_exporter(ctx: Arc<AppContext>, exporter: Arc<MetadataServiceExporter>) -> Self {
        let delayed = TaskTracker::new();
        // Nothing is scheduled until `start`, so waiting must not block.
        delayed.close();
        Self {
            exports: Arc::new(ServiceExports {
                ctx: Arc::clone(&ctx),
                exported: Mutex::new(Vec::new()),
            }),
            ctx,
            exporter,
            services: Mutex::new(Vec::new()),
            state: Mutex::new(DeployState::Pending),
            lifecycle_lock: tokio::sync::Mutex::new(()),
            cancel: Mutex::new(CancellationToken::new()),
            delayed,
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    #[must_use]
    pub fn exporter(&self) -> &Arc<MetadataServiceExporter> {
        &self.exporter
    }

    #[must_use]
    pub fn state(&self) -> DeployState {
        *self.state.lock()
    }

    fn set_state(&self, state: DeployState) {
        *self.state.lock() = state;
    }

    /// Register an ordinary service to export on the next `start`.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Invalid` if the interface name is empty or the
    /// deployer is already running.
    pub fn add_service(
        &self,
        config: ServiceConfig,
        invoker: Arc<dyn ServiceInvoker>,
    ) -> Result<(), DeployError> {
        if config.interface.trim().is_empty() {
            return Err(DeployError::Invalid {
                service: config.interface,
                reason: "interface name is empty".to_owned(),
            });
        }
        if matches!(self.state(), DeployState::Starting | DeployState::Started) {
            return Err(DeployError::Invalid {
                service: config.interface,
                reason: "deployer is already running".to_owned(),
            });
        }
        self.services.lock().push(ServiceDefinition { config, invoker });
        Ok(())
    }

    /// URLs of ordinary services exported so far.
    #[must_use]
    pub fn service_urls(&self) -> Vec<ServiceUrl> {
        self.exports.urls()
    }

    /// Start the application. A no-op when already started.
    ///
    /// # Errors
    ///
    /// Returns `DeployError` if an eager service cannot be exported, or the
    /// metadata service cannot be exported and `fail_on_metadata_error` is set.
    /// Services exported before the failure are withdrawn.
    #[tracing::instrument(skip_all, fields(app = %self.ctx.app_name(), instance_id = %self.ctx.instance_id()))]
    pub async fn start(&self) -> Result<(), DeployError> {
        let _lifecycle_guard = self.lifecycle_lock.lock().await;
        if self.state() == DeployState::Started {
            tracing::debug!("Application already started");
            return Ok(());
        }
        self.set_state(DeployState::Starting);

        let (eager, delayed): (Vec<_>, Vec<_>) = self
            .services
            .lock()
            .iter()
            .cloned()
            .partition(|d| d.config.delay_ms == 0);

        tracing::info!(count = eager.len(), "Phase: export services");
        for definition in &eager {
            if let Err(err) = self.exports.export(definition).await {
                self.exports.unexport_all().await;
                self.set_state(DeployState::Failed);
                return Err(err);
            }
        }

        tracing::info!("Phase: export metadata");
        if let Err(err) = self.exporter.export().await {
            if self.ctx.config().deployer.fail_on_metadata_error {
                self.exports.unexport_all().await;
                self.set_state(DeployState::Failed);
                return Err(err.into());
            }
            tracing::warn!(error = %err, "Metadata service not exported; continuing without it");
        }

        tracing::info!(count = delayed.len(), "Phase: schedule delayed services");
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        self.delayed.reopen();
        for definition in delayed {
            self.schedule(definition, cancel.clone());
        }
        self.delayed.close();

        self.set_state(DeployState::Started);
        tracing::info!("Application started");
        Ok(())
    }

    fn schedule(&self, definition: ServiceDefinition, cancel: CancellationToken) {
        let exports = Arc::clone(&self.exports);
        let exporter = Arc::clone(&self.exporter);
        let delay = Duration::from_millis(definition.config.delay_ms);
        self.delayed.spawn(async move {
            let service = definition.config.interface.clone();
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(%service, "Delayed export cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    match exports.export(&definition).await {
                        Ok(urls) => {
                            tracing::info!(%service, count = urls.len(), "Delayed service exported");
                            if let Err(err) = exporter.refresh().await {
                                tracing::warn!(%service, error = %err, "Failed to refresh metadata");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(%service, error = %err, "Delayed service export failed");
                        }
                    }
                }
            }
        });
    }

    /// Wait until every delayed export scheduled by the last `start` has run or
    /// been cancelled.
    pub async fn wait_for_delayed_exports(&self) {
        self.delayed.wait().await;
    }

    /// Stop the application. A no-op unless started.
    ///
    /// When this returns the metadata service is no longer exported.
    #[tracing::instrument(skip_all, fields(app = %self.ctx.app_name(), instance_id = %self.ctx.instance_id()))]
    pub async fn stop(&self) {
        let _lifecycle_guard = self.lifecycle_lock.lock().await;
        if self.state() != DeployState::Started {
            tracing::debug!(state = ?self.state(), "Application not running");
            return;
        }
        self.set_state(DeployState::Stopping);

        tracing::info!("Phase: cancel delayed services");
        let cancel = self.cancel.lock().clone();
        cancel.cancel();
        self.delayed.wait().await;

        tracing::info!("Phase: unexport services");
        self.exports.unexport_all().await;

        tracing::info!("Phase: unexport metadata");
        self.exporter.unexport().await;

        self.set_state(DeployState::Stopped);
        tracing::info!("Application stopped");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::ApplicationConfig;
    use crate::infra::transport::InMemoryTransport;
    use async_trait::async_trait;
    use metadata_service_sdk::{Invocation, Transport};

    struct Noop;

    #[async_trait]
    impl ServiceInvoker for Noop {
        async fn invoke(&self, _invocation: Invocation) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn deployer(config: ApplicationConfig, transport: Arc<InMemoryTransport>) -> ApplicationDeployer {
        let ctx = AppContext::builder(config)
            .transport(transport as Arc<dyn Transport>)
            .build();
        ApplicationDeployer::new(ctx)
    }

    #[tokio::test]
    async fn test_empty_interface_rejected() {
        let d = deployer(ApplicationConfig::default(), Arc::new(InMemoryTransport::new()));
        let err = d
            .add_service(ServiceConfig::new("  "), Arc::new(Noop))
            .unwrap_err();
        assert!(matches!(err, DeployError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_service_export_failure_rolls_back() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.occupy(2003);
        let config = ApplicationConfig {
            protocols: vec![
                ProtocolConfig::new("dubbo", Some(2002)),
                ProtocolConfig::new("tri", Some(2003)),
            ],
            ..ApplicationConfig::default()
        };
        let d = deployer(config, Arc::clone(&transport));
        d.add_service(ServiceConfig::new("demo.DemoService"), Arc::new(Noop))
            .unwrap();

        let err = d.start().await.unwrap_err();
        assert!(matches!(err, DeployError::ServiceExport { .. }));
        assert_eq!(d.state(), DeployState::Failed);
        assert!(transport.listeners().is_empty());
        assert!(d.context().local_metadata().snapshot().is_empty());
        assert!(!d.exporter().is_exported());
    }

    #[tokio::test]
    async fn test_metadata_failure_tolerated_when_configured() {
        let transport = Arc::new(InMemoryTransport::new());
        let mut config = ApplicationConfig::default();
        config.metadata.metadata_type = "redis".to_owned();
        config.deployer.fail_on_metadata_error = false;
        let d = deployer(config, transport);
        d.add_service(ServiceConfig::new("demo.DemoService"), Arc::new(Noop))
            .unwrap();

        d.start().await.unwrap();
        assert_eq!(d.state(), DeployState::Started);
        assert!(!d.exporter().is_exported());
        assert_eq!(d.service_urls().len(), 1);
        d.stop().await;
        assert_eq!(d.state(), DeployState::Stopped);
    }

    #[tokio::test]
    async fn test_wait_before_start_returns() {
        let d = deployer(ApplicationConfig::default(), Arc::new(InMemoryTransport::new()));
        d.wait_for_delayed_exports().await;
        d.stop().await;
        assert_eq!(d.state(), DeployState::Pending);
    }
}
