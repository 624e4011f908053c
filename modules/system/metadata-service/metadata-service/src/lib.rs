#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Metadata Service Module
//!
//! Publishes an application's own service metadata as a callable service so
//! other nodes can query it directly.
//!
//! ## Architecture
//!
//! - **Exporter**: chooses or shares an endpoint, prepares storage, publishes the
//!   metadata service. Idempotent and single-flight.
//! - **Storage strategies**: `local`, `remote` (metadata center) and `composite`,
//!   selected by `metadata.metadata_type`.
//! - **Deployer**: exports ordinary services, then metadata, then delayed
//!   services; stops in reverse order.
//! - **Transports**: in-memory for tests and single-process use, TCP with
//!   newline-delimited JSON for real sockets.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

// Re-export SDK types
pub use metadata_service_sdk::*;

pub mod config;
pub mod context;
pub mod deployer;
#[doc(hidden)]
pub mod domain;
pub mod infra;

pub use config::{
    ApplicationConfig, ConfigError, DeployerConfig, MetadataExportConfig, ProtocolConfig,
    ServiceConfig,
};
pub use context::{AppContext, AppContextBuilder};
pub use deployer::{ApplicationDeployer, DeployState, ServiceDefinition};
pub use domain::selector::{ChoiceSource, EndpointChoice, select_endpoint};
pub use domain::storage::{
    COMPOSITE_STORAGE, CompositeMetadataStorage, LOCAL_STORAGE, LocalMetadataStorage,
    REMOTE_STORAGE, RemoteMetadataStorage, StorageContext, StorageFactory, StorageRegistry,
    StorageRegistryBuilder,
};
pub use domain::{
    DeployError, ExportError, LocalMetadata, MetadataServiceExporter, MetadataServiceImpl,
    MetadataServiceInvoker, RegistryError,
};
pub use infra::{InMemoryMetadataCenter, InMemoryTransport, TcpTransport};
