//! RPC transport boundary.
//!
//! The metadata service does not own a codec or server loop. It asks a
//! [`Transport`] to open (or share) a listener, publishes a [`ServiceInvoker`]
//! under its service key on it, and releases the listener on shutdown.
//!
//! Listeners are shared per port: binding a port the transport already listens
//! on with the same protocol returns a handle to the same listener and bumps a
//! reference count. The listener closes when the last handle is released.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BindError, InvokeError};
use crate::models::ServiceUrl;

/// Request to open a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    pub protocol: String,
    pub host: String,
    /// `0` asks the transport for an ephemeral port.
    pub port: u16,
    /// The listener is opened for the metadata service only. Such listeners are
    /// never offered for port reuse.
    pub metadata_only: bool,
}

impl BindSpec {
    #[must_use]
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            metadata_only: false,
        }
    }

    #[must_use]
    pub fn for_metadata(mut self) -> Self {
        self.metadata_only = true;
        self
    }
}

/// One reference to an open listener, returned by [`Transport::bind`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: u64,
    protocol: String,
    host: String,
    port: u16,
    metadata_only: bool,
}

impl ListenerHandle {
    #[must_use]
    pub fn new(
        id: u64,
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        metadata_only: bool,
    ) -> Self {
        Self {
            id,
            protocol: protocol.into(),
            host: host.into(),
            port,
            metadata_only,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Actual bound port (never `0`).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn is_metadata_only(&self) -> bool {
        self.metadata_only
    }
}

/// Snapshot of one open listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// No ordinary service holds a reference to this listener.
    pub metadata_only: bool,
    /// Published service keys.
    pub services: Vec<String>,
}

/// Single call sent to a published service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub method: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl Invocation {
    #[must_use]
    pub fn new(method: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    #[must_use]
    pub fn no_args(method: impl Into<String>) -> Self {
        Self::new(method, serde_json::Value::Null)
    }
}

/// Server-side handler of a published service.
#[async_trait]
pub trait ServiceInvoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> anyhow::Result<serde_json::Value>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether this transport can open listeners for `protocol`.
    fn supports_protocol(&self, protocol: &str) -> bool;

    /// Open a listener, or share the one already open on that port.
    ///
    /// # Errors
    ///
    /// Returns `BindError` if the port is taken by something else, is bound for
    /// another protocol, or the protocol is unsupported.
    async fn bind(&self, spec: &BindSpec) -> Result<ListenerHandle, BindError>;

    /// Release one reference; the listener closes with its last reference.
    async fn unbind(&self, handle: &ListenerHandle);

    /// Make `invoker` callable under `service_key` (see [`ServiceUrl::service_key`]).
    ///
    /// # Errors
    ///
    /// Returns `BindError` if the listener is unknown or the key is already taken.
    fn publish(
        &self,
        handle: &ListenerHandle,
        service_key: &str,
        invoker: Arc<dyn ServiceInvoker>,
    ) -> Result<(), BindError>;

    fn unpublish(&self, handle: &ListenerHandle, service_key: &str);

    /// Snapshot of open listeners, in bind order.
    fn listeners(&self) -> Vec<ListenerInfo>;

    /// Client side: call a service published at `url`.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError` if nothing listens at the address, the service is not
    /// published there, or the remote handler fails.
    async fn invoke(
        &self,
        url: &ServiceUrl,
        invocation: Invocation,
    ) -> Result<serde_json::Value, InvokeError>;
}
