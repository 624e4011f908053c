//! Domain errors for the metadata service exporter and deployer.

use metadata_service_sdk::{BindError, MetadataServiceError};
use thiserror::Error;

/// Errors returned by [`crate::MetadataServiceExporter::export`] and `refresh`.
#[derive(Debug, Error)]
pub enum ExportError {
    /// No storage strategy registered under the configured key
    #[error("Unsupported metadata storage type: {0}")]
    UnsupportedStorageType(String),

    /// `remote` storage selected but the metadata center is missing or unreachable
    #[error("Remote metadata storage unavailable: {0}")]
    RemoteStorageUnavailable(#[source] MetadataServiceError),

    /// Transport could not open the chosen listener
    #[error("Cannot bind metadata service endpoint: {0}")]
    Bind(#[from] BindError),

    /// Listener opened but the metadata service could not be published on it
    #[error("Cannot publish metadata service on {address}: {source}")]
    Publish {
        address: String,
        #[source]
        source: BindError,
    },

    /// Storage strategy failed to prepare the metadata snapshot
    #[error("Metadata storage error: {0}")]
    Storage(#[source] MetadataServiceError),
}

impl From<MetadataServiceError> for ExportError {
    fn from(err: MetadataServiceError) -> Self {
        if err.is_unavailable() {
            Self::RemoteStorageUnavailable(err)
        } else {
            Self::Storage(err)
        }
    }
}

/// Errors raised while building a [`crate::StorageRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Storage type '{0}' is registered more than once")]
    DuplicateKey(String),
}

/// Errors returned by [`crate::ApplicationDeployer::start`].
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Failed to export service '{service}': {source}")]
    ServiceExport {
        service: String,
        #[source]
        source: BindError,
    },

    #[error("Failed to export metadata service: {0}")]
    MetadataExport(#[from] ExportError),

    #[error("Invalid service '{service}': {reason}")]
    Invalid { service: String, reason: String },
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_storage_maps_to_remote_unavailable() {
        let err: ExportError = MetadataServiceError::storage_unavailable("center down").into();
        assert!(matches!(err, ExportError::RemoteStorageUnavailable(_)));

        let err: ExportError = MetadataServiceError::storage("rejected").into();
        assert!(matches!(err, ExportError::Storage(_)));
    }

    #[test]
    fn test_deploy_error_keeps_source_message() {
        let err = DeployError::from(ExportError::UnsupportedStorageType("redis".to_owned()));
        assert_eq!(
            err.to_string(),
            "Failed to export metadata service: Unsupported metadata storage type: redis"
        );
    }
}
