//! The metadata service itself: an in-process client backed by the active
//! storage strategy, and the invoker that serves it over a transport.

use std::sync::Arc;

use async_trait::async_trait;
use metadata_service_sdk::{
    InvokeError, Invocation, MetadataInfo, MetadataServiceClient, MetadataServiceError,
    MetadataStorage, ServiceInvoker, ServiceQuery, ServiceUrl, methods,
};
use serde::Deserialize;

pub struct MetadataServiceImpl {
    app: String,
    storage: Arc<dyn MetadataStorage>,
}

impl MetadataServiceImpl {
    #[must_use]
    pub fn new(app: impl Into<String>, storage: Arc<dyn MetadataStorage>) -> Self {
        Self {
            app: app.into(),
            storage,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn MetadataStorage> {
        &self.storage
    }
}

#[async_trait]
impl MetadataServiceClient for MetadataServiceImpl {
    async fn service_name(&self) -> Result<String, MetadataServiceError> {
        Ok(self.app.clone())
    }

    #[tracing::instrument(skip_all, fields(interface = %query.interface))]
    async fn exported_urls(
        &self,
        query: &ServiceQuery,
    ) -> Result<Vec<ServiceUrl>, MetadataServiceError> {
        self.storage.lookup(query).await
    }

    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError> {
        self.storage.metadata_info(revision).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct MetadataInfoArgs {
    #[serde(default)]
    revision: Option<String>,
}

/// Dispatches transport invocations to a [`MetadataServiceClient`].
pub struct MetadataServiceInvoker {
    service: Arc<dyn MetadataServiceClient>,
}

impl MetadataServiceInvoker {
    #[must_use]
    pub fn new(service: Arc<dyn MetadataServiceClient>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ServiceInvoker for MetadataServiceInvoker {
    async fn invoke(&self, invocation: Invocation) -> anyhow::Result<serde_json::Value> {
        tracing::trace!(method = %invocation.method, "Metadata service invoked");
        let value = match invocation.method.as_str() {
            methods::SERVICE_NAME => serde_json::to_value(self.service.service_name().await?)?,
            methods::VERSION => serde_json::to_value(self.service.version())?,
            methods::GET_EXPORTED_URLS => {
                let query: ServiceQuery = serde_json::from_value(invocation.args)?;
                serde_json::to_value(self.service.exported_urls(&query).await?)?
            }
            methods::GET_METADATA_INFO => {
                let args: MetadataInfoArgs = if invocation.args.is_null() {
                    MetadataInfoArgs::default()
                } else {
                    serde_json::from_value(invocation.args)?
                };
                serde_json::to_value(
                    self.service
                        .metadata_info(args.revision.as_deref())
                        .await?,
                )?
            }
            other => return Err(InvokeError::UnknownMethod(other.to_owned()).into()),
        };
        Ok(value)
    }
}
