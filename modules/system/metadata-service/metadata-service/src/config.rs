//! Application configuration consumed by the metadata service exporter and the deployer.
//!
//! The core only needs an already-built [`ApplicationConfig`]. [`ApplicationConfig::load`]
//! is a convenience loader layering defaults, a YAML file and `APP__` environment
//! variables (for example `APP__METADATA__METADATA_TYPE=remote`).

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::domain::storage::LOCAL_STORAGE;

/// Configuration error for application config loading
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid application config: {0}")]
    Invalid(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Invalid(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplicationConfig {
    /// Application name; used as the metadata service group.
    #[serde(default = "default_name")]
    pub name: String,

    /// Host advertised in exported URLs when a protocol does not set its own.
    #[serde(default = "default_host")]
    pub host: String,

    pub metadata: MetadataExportConfig,

    /// Protocols ordinary services are exported on.
    pub protocols: Vec<ProtocolConfig>,

    pub deployer: DeployerConfig,
}

fn default_name() -> String {
    "application".to_owned()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: default_host(),
            metadata: MetadataExportConfig::default(),
            protocols: Vec::new(),
            deployer: DeployerConfig::default(),
        }
    }
}

impl ApplicationConfig {
    /// Extract the configuration from an already layered figment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value has the wrong shape or an unknown key is present.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    /// Defaults, then the YAML file at `path`, then `APP__`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file_exact(path))
            // Example: APP__METADATA__METADATA_SERVICE_PORT=8089 maps to metadata.metadata_service_port
            .merge(Env::prefixed("APP__").split("__"));
        Self::from_figment(&figment)
    }

    /// Protocol configuration by name.
    #[must_use]
    pub fn protocol(&self, name: &str) -> Option<&ProtocolConfig> {
        self.protocols.iter().find(|p| p.name == name)
    }
}

/// How the metadata service itself is exported.
///
/// When both `metadata_service_protocol` and `metadata_service_port` are set they
/// are used as-is; otherwise the endpoint is derived from the listeners already
/// opened by ordinary services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataExportConfig {
    /// Storage strategy key (`local`, `remote`, `composite`).
    #[serde(default = "default_metadata_type")]
    pub metadata_type: String,
    pub metadata_service_protocol: Option<String>,
    pub metadata_service_port: Option<u16>,
    pub metadata_service_host: Option<String>,
    #[serde(default = "default_protocol")]
    pub default_protocol: String,
    /// Protocols whose listeners the metadata service may share.
    #[serde(default = "default_reusable_protocols")]
    pub reusable_protocols: Vec<String>,
}

fn default_metadata_type() -> String {
    LOCAL_STORAGE.to_owned()
}

fn default_protocol() -> String {
    "dubbo".to_owned()
}

fn default_reusable_protocols() -> Vec<String> {
    vec!["dubbo".to_owned(), "tri".to_owned()]
}

impl Default for MetadataExportConfig {
    fn default() -> Self {
        Self {
            metadata_type: default_metadata_type(),
            metadata_service_protocol: None,
            metadata_service_port: None,
            metadata_service_host: None,
            default_protocol: default_protocol(),
            reusable_protocols: default_reusable_protocols(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    pub name: String,
    /// `None` binds an ephemeral port.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub host: Option<String>,
}

impl ProtocolConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            name: name.into(),
            port,
            host: None,
        }
    }
}

/// One ordinary service exported by the deployer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub interface: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Export on this protocol only; `None` exports on every configured protocol.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Export this long after the deployer starts; `0` exports eagerly.
    #[serde(default)]
    pub delay_ms: u64,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
            protocol: None,
            delay_ms: 0,
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployerConfig {
    /// Abort `start()` and roll back ordinary exports when the metadata service
    /// cannot be exported. When `false` the failure is logged and startup continues.
    #[serde(default = "default_fail_on_metadata_error")]
    pub fail_on_metadata_error: bool,
}

fn default_fail_on_metadata_error() -> bool {
    true
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            fail_on_metadata_error: default_fail_on_metadata_error(),
        }
    }
}
