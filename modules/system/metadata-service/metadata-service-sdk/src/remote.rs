//! Metadata query client for a node reached over a [`Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::api::{MetadataServiceClient, methods};
use crate::error::MetadataServiceError;
use crate::models::{MetadataInfo, ServiceQuery, ServiceUrl};
use crate::transport::{Invocation, Transport};

/// Talks to the metadata service published at `url`.
pub struct RemoteMetadataClient {
    transport: Arc<dyn Transport>,
    url: ServiceUrl,
}

impl RemoteMetadataClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, url: ServiceUrl) -> Self {
        Self { transport, url }
    }

    #[must_use]
    pub fn url(&self) -> &ServiceUrl {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        invocation: Invocation,
    ) -> Result<T, MetadataServiceError> {
        let value = self.transport.invoke(&self.url, invocation).await?;
        serde_json::from_value(value)
            .map_err(|e| MetadataServiceError::internal_with_source("malformed metadata reply", e))
    }
}

#[async_trait]
impl MetadataServiceClient for RemoteMetadataClient {
    async fn service_name(&self) -> Result<String, MetadataServiceError> {
        self.call(Invocation::no_args(methods::SERVICE_NAME)).await
    }

    async fn exported_urls(
        &self,
        query: &ServiceQuery,
    ) -> Result<Vec<ServiceUrl>, MetadataServiceError> {
        let args = serde_json::to_value(query)
            .map_err(|e| MetadataServiceError::internal_with_source("cannot encode query", e))?;
        self.call(Invocation::new(methods::GET_EXPORTED_URLS, args))
            .await
    }

    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError> {
        self.call(Invocation::new(
            methods::GET_METADATA_INFO,
            json!({ "revision": revision }),
        ))
        .await
    }
}
