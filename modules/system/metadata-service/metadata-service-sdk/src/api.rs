//! Query API served by every node that exports its metadata.
//!
//! In-process callers get an implementation from the exporter; remote callers use
//! [`crate::RemoteMetadataClient`] pointed at one of the exporter's published URLs.

use async_trait::async_trait;

use crate::error::MetadataServiceError;
use crate::models::{METADATA_SERVICE_VERSION, MetadataInfo, ServiceQuery, ServiceUrl};

/// Wire method names of the metadata service.
pub mod methods {
    pub const SERVICE_NAME: &str = "serviceName";
    pub const VERSION: &str = "version";
    pub const GET_EXPORTED_URLS: &str = "getExportedURLs";
    pub const GET_METADATA_INFO: &str = "getMetadataInfo";
}

/// Metadata query contract.
///
/// Answers "which endpoints does this node export for interface X" without going
/// through a central registry.
#[async_trait]
pub trait MetadataServiceClient: Send + Sync {
    /// Name of the application whose metadata is served.
    ///
    /// # Errors
    ///
    /// Returns an error if the serving node cannot be reached.
    async fn service_name(&self) -> Result<String, MetadataServiceError>;

    /// Contract version of the metadata service.
    fn version(&self) -> &str {
        METADATA_SERVICE_VERSION
    }

    /// Endpoints exported by this node for the queried interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the active storage strategy fails.
    async fn exported_urls(
        &self,
        query: &ServiceQuery,
    ) -> Result<Vec<ServiceUrl>, MetadataServiceError>;

    /// Full metadata snapshot, optionally pinned to a revision.
    ///
    /// Returns `Ok(None)` when no snapshot with that revision is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the active storage strategy fails.
    async fn metadata_info(
        &self,
        revision: Option<&str>,
    ) -> Result<Option<MetadataInfo>, MetadataServiceError>;
}
