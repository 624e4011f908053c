#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Metadata Service SDK
//!
//! This crate provides the public contracts of the `metadata_service` module:
//!
//! - [`MetadataServiceClient`] - query API served by every exporting node
//! - [`MetadataStorage`] - storage strategy plugin API (`local`, `remote`, `composite`)
//! - [`MetadataCenterClient`] - external metadata center used by remote storage
//! - [`Transport`] / [`ServiceInvoker`] - RPC transport boundary (bind, publish, invoke)
//! - [`RemoteMetadataClient`] - query client talking to a published metadata endpoint
//! - Models ([`ServiceUrl`], [`MetadataInfo`], [`ServiceQuery`]) and error types
//!
//! ## Usage
//!
//! ```
//! # use metadata_service_sdk::{ServiceQuery, ServiceUrl};
//! let url = ServiceUrl::new("dubbo", "10.0.0.7", 2002, "demo.DemoService")
//!     .with_param("version", "1.0.0");
//!
//! let query = ServiceQuery::new("demo.DemoService").with_version("1.0.0");
//! assert!(query.matches(&url));
//! assert_eq!(url.to_string(), "dubbo://10.0.0.7:2002/demo.DemoService?version=1.0.0");
//! ```
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod api;
pub mod error;
pub mod metadata_center;
pub mod models;
pub mod plugin_storage;
pub mod remote;
pub mod transport;

pub use api::{MetadataServiceClient, methods};
pub use error::{BindError, InvokeError, MetadataServiceError, UrlParseError};
pub use metadata_center::MetadataCenterClient;
pub use models::{
    APPLICATION_KEY, GROUP_KEY, METADATA_SERVICE_NAME, METADATA_SERVICE_VERSION,
    METADATA_TYPE_KEY, MetadataInfo, SIDE_KEY, ServiceInfo, ServiceQuery, ServiceUrl, VERSION_KEY,
    socket_address,
};
pub use plugin_storage::MetadataStorage;
pub use remote::RemoteMetadataClient;
pub use transport::{BindSpec, Invocation, ListenerHandle, ListenerInfo, ServiceInvoker, Transport};
