//! Models shared by the metadata service, its storage strategies and transports.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UrlParseError;

/// Interface name the metadata service is published under.
pub const METADATA_SERVICE_NAME: &str = "modkit.metadata.MetadataService";

/// Version of the metadata service contract.
pub const METADATA_SERVICE_VERSION: &str = "1.0.0";

pub const GROUP_KEY: &str = "group";
pub const VERSION_KEY: &str = "version";
pub const SIDE_KEY: &str = "side";
pub const APPLICATION_KEY: &str = "application";
pub const METADATA_TYPE_KEY: &str = "metadata-type";

/// One published network address of one service.
///
/// Immutable once built: `with_param` consumes the value and returns a new one.
/// Renders as `protocol://host:port/path?k=v` with parameters in key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceUrl {
    protocol: String,
    host: String,
    port: u16,
    path: String,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

impl ServiceUrl {
    #[must_use]
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Interface name of the published service.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.param(GROUP_KEY)
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.param(VERSION_KEY)
    }

    /// `host:port` of the listener this URL is published on.
    #[must_use]
    pub fn address(&self) -> String {
        socket_address(&self.host, self.port)
    }

    /// Key identifying the service regardless of where it is published:
    /// `group/interface:version`, absent parts omitted.
    #[must_use]
    pub fn service_key(&self) -> String {
        service_key(&self.path, self.group(), self.version())
    }

    /// Parse the textual form produced by `Display`.
    ///
    /// # Errors
    ///
    /// Returns `UrlParseError` if the text is not a URL or lacks a host or port.
    pub fn parse(raw: &str) -> Result<Self, UrlParseError> {
        let parsed = url::Url::parse(raw)?;
        let host = match parsed.host() {
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        };
        if host.is_empty() {
            return Err(UrlParseError::MissingHost(raw.to_owned()));
        }
        let port = parsed
            .port()
            .ok_or_else(|| UrlParseError::MissingPort(raw.to_owned()))?;
        let path = parsed.path().trim_start_matches('/').to_owned();
        let params = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            protocol: parsed.scheme().to_owned(),
            host,
            port,
            path,
            params,
        })
    }
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.protocol, self.address(), self.path)?;
        if !self.params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// `host:port`, with IPv6 hosts bracketed.
#[must_use]
pub fn socket_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn service_key(interface: &str, group: Option<&str>, version: Option<&str>) -> String {
    let mut key = String::with_capacity(interface.len() + 16);
    if let Some(group) = group.filter(|g| !g.is_empty()) {
        key.push_str(group);
        key.push('/');
    }
    key.push_str(interface);
    if let Some(version) = version.filter(|v| !v.is_empty()) {
        key.push(':');
        key.push_str(version);
    }
    key
}

/// Query against the metadata of one node: interface name plus optional group/version.
///
/// An absent group or version matches any value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceQuery {
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ServiceQuery {
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            group: None,
            version: None,
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
    pub fn matches(&self, url: &ServiceUrl) -> bool {
        url.path() == self.interface
            && self.group.as_deref().is_none_or(|g| url.group() == Some(g))
            && self
                .version
                .as_deref()
                .is_none_or(|v| url.version() == Some(v))
    }
}

/// Everything one application exports, grouped by service key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub urls: Vec<ServiceUrl>,
}

/// Snapshot of an application's service metadata.
///
/// `revision` is derived from the contained URLs so two snapshots with the same
/// services always carry the same revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataInfo {
    pub app: String,
    pub revision: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceInfo>,
}

impl MetadataInfo {
    /// Build a snapshot from exported URLs, computing its revision.
    #[must_use]
    pub fn new(app: impl Into<String>, urls: impl IntoIterator<Item = ServiceUrl>) -> Self {
        let mut services: BTreeMap<String, ServiceInfo> = BTreeMap::new();
        for url in urls {
            let entry = services
                .entry(url.service_key())
                .or_insert_with(|| ServiceInfo {
                    name: url.path().to_owned(),
                    group: url.group().map(str::to_owned),
                    version: url.version().map(str::to_owned),
                    urls: Vec::new(),
                });
            if !entry.urls.contains(&url) {
                entry.urls.push(url);
            }
        }
        for info in services.values_mut() {
            info.urls.sort();
        }

        let revision = compute_revision(&services);
        Self {
            app: app.into(),
            revision,
            services,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// All URLs matching the query, in service-key then URL order.
    #[must_use]
    pub fn urls_matching(&self, query: &ServiceQuery) -> Vec<ServiceUrl> {
        self.services
            .values()
            .flat_map(|info| info.urls.iter())
            .filter(|url| query.matches(url))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn all_urls(&self) -> impl Iterator<Item = &ServiceUrl> {
        self.services.values().flat_map(|info| info.urls.iter())
    }
}

fn compute_revision(services: &BTreeMap<String, ServiceInfo>) -> String {
    if services.is_empty() {
        return "0".to_owned();
    }
    let mut text = String::new();
    for url in services.values().flat_map(|info| info.urls.iter()) {
        text.push_str(&url.to_string());
        text.push('\n');
    }
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(text.as_bytes()))
}
