//! Domain layer for the metadata service.

pub mod error;
pub mod exporter;
pub mod local_metadata;
pub mod selector;
pub mod service;
pub mod storage;

pub use error::{DeployError, ExportError, RegistryError};
pub use exporter::MetadataServiceExporter;
pub use local_metadata::LocalMetadata;
pub use service::{MetadataServiceImpl, MetadataServiceInvoker};
