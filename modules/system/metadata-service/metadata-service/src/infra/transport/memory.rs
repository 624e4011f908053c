//! Process-local transport: listeners are table entries and invocations are
//! direct calls. Used by tests and single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metadata_service_sdk::{
    BindError, BindSpec, InvokeError, Invocation, ListenerHandle, ListenerInfo, ServiceInvoker,
    ServiceUrl, Transport, socket_address,
};
use parking_lot::Mutex;

use super::{EPHEMERAL_PORT_START, ListenerRefs};

struct MemoryListener {
    id: u64,
    protocol: String,
    host: String,
    refs: ListenerRefs,
    services: HashMap<String, Arc<dyn ServiceInvoker>>,
}

/// Transport whose listeners live in a table keyed by port.
pub struct InMemoryTransport {
    protocols: Option<Vec<String>>,
    listeners: DashMap<u16, MemoryListener>,
    /// Ports held by something outside this transport.
    foreign: Mutex<HashSet<u16>>,
    next_ephemeral: Mutex<u16>,
    next_id: AtomicU64,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    /// Transport accepting any protocol name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocols: None,
            listeners: DashMap::new(),
            foreign: Mutex::new(HashSet::new()),
            next_ephemeral: Mutex::new(EPHEMERAL_PORT_START),
            next_id: AtomicU64::new(1),
        }
    }

    /// Transport accepting only the given protocols.
    #[must_use]
    pub fn with_protocols<I, S>(protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protocols: Some(protocols.into_iter().map(Into::into).collect()),
            ..Self::new()
        }
    }

    /// Mark `port` as taken by another process; binding it fails with `AddressInUse`.
    pub fn occupy(&self, port: u16) {
        self.foreign.lock().insert(port);
    }

    pub fn release(&self, port: u16) {
        self.foreign.lock().remove(&port);
    }

    /// Number of live references to the listener on `port`.
    #[must_use]
    pub fn ref_count(&self, port: u16) -> Option<usize> {
        self.listeners.get(&port).map(|l| l.refs.total)
    }

    fn allocate_port(&self) -> Option<u16> {
        let foreign = self.foreign.lock();
        let mut next = self.next_ephemeral.lock();
        for _ in EPHEMERAL_PORT_START..=u16::MAX {
            let candidate = *next;
            *next = if candidate == u16::MAX {
                EPHEMERAL_PORT_START
            } else {
                candidate + 1
            };
            if !foreign.contains(&candidate) && !self.listeners.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols
            .as_ref()
            .is_none_or(|p| p.iter().any(|name| name == protocol))
    }

    async fn bind(&self, spec: &BindSpec) -> Result<ListenerHandle, BindError> {
        if !self.supports_protocol(&spec.protocol) {
            return Err(BindError::UnsupportedProtocol(spec.protocol.clone()));
        }

        let port = if spec.port == 0 {
            self.allocate_port().ok_or_else(|| BindError::AddressInUse {
                host: spec.host.clone(),
                port: 0,
            })?
        } else {
            spec.port
        };

        if self.foreign.lock().contains(&port) {
            return Err(BindError::AddressInUse {
                host: spec.host.clone(),
                port,
            });
        }

        match self.listeners.entry(port) {
            Entry::Occupied(mut entry) => {
                let listener = entry.get_mut();
                if listener.protocol != spec.protocol {
                    return Err(BindError::ProtocolConflict {
                        port,
                        bound: listener.protocol.clone(),
                        requested: spec.protocol.clone(),
                    });
                }
                listener.refs.acquire(spec.metadata_only);
                tracing::debug!(port, refs = listener.refs.total, "Sharing in-memory listener");
                Ok(ListenerHandle::new(
                    listener.id,
                    &listener.protocol,
                    &listener.host,
                    port,
                    spec.metadata_only,
                ))
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let mut refs = ListenerRefs::default();
                refs.acquire(spec.metadata_only);
                entry.insert(MemoryListener {
                    id,
                    protocol: spec.protocol.clone(),
                    host: spec.host.clone(),
                    refs,
                    services: HashMap::new(),
                });
                tracing::debug!(protocol = %spec.protocol, port, "In-memory listener bound");
                Ok(ListenerHandle::new(
                    id,
                    &spec.protocol,
                    &spec.host,
                    port,
                    spec.metadata_only,
                ))
            }
        }
    }

    async fn unbind(&self, handle: &ListenerHandle) {
        let Entry::Occupied(mut entry) = self.listeners.entry(handle.port()) else {
            tracing::warn!(port = handle.port(), "Unbind of unknown listener");
            return;
        };
        if entry.get().id != handle.id() {
            tracing::warn!(port = handle.port(), "Unbind with stale listener handle");
            return;
        }
        if entry.get_mut().refs.release(handle.is_metadata_only()) {
            entry.remove();
            tracing::debug!(port = handle.port(), "In-memory listener closed");
        }
    }

    fn publish(
        &self,
        handle: &ListenerHandle,
        service_key: &str,
        invoker: Arc<dyn ServiceInvoker>,
    ) -> Result<(), BindError> {
        let mut listener = self
            .listeners
            .get_mut(&handle.port())
            .filter(|l| l.id == handle.id())
            .ok_or(BindError::UnknownListener(handle.id()))?;
        if listener.services.contains_key(service_key) {
            return Err(BindError::ServiceInUse {
                address: socket_address(&listener.host, handle.port()),
                service: service_key.to_owned(),
            });
        }
        listener.services.insert(service_key.to_owned(), invoker);
        Ok(())
    }

    fn unpublish(&self, handle: &ListenerHandle, service_key: &str) {
        if let Some(mut listener) = self.listeners.get_mut(&handle.port())
            && listener.id == handle.id()
        {
            listener.services.remove(service_key);
        }
    }

    fn listeners(&self) -> Vec<ListenerInfo> {
        // Ids grow monotonically, so they double as bind order.
        let mut found: Vec<(u64, ListenerInfo)> = self
            .listeners
            .iter()
            .map(|entry| {
                let l = entry.value();
                let mut services: Vec<String> = l.services.keys().cloned().collect();
                services.sort();
                (
                    l.id,
                    ListenerInfo {
                        protocol: l.protocol.clone(),
                        host: l.host.clone(),
                        port: *entry.key(),
                        metadata_only: l.refs.is_metadata_only(),
                        services,
                    },
                )
            })
            .collect();
        found.sort_by_key(|(id, _)| *id);
        found.into_iter().map(|(_, info)| info).collect()
    }

    async fn invoke(
        &self,
        url: &ServiceUrl,
        invocation: Invocation,
    ) -> Result<serde_json::Value, InvokeError> {
        let invoker = {
            let listener = self
                .listeners
                .get(&url.port())
                .filter(|l| l.protocol == url.protocol())
                .ok_or_else(|| InvokeError::NoListener(url.address()))?;
            let key = url.service_key();
            listener
                .services
                .get(&key)
                .cloned()
                .ok_or(InvokeError::NoService(key))?
        };
        invoker
            .invoke(invocation)
            .await
            .map_err(|e| InvokeError::Remote(format!("{e:#}")))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_ports_are_distinct() {
        let transport = InMemoryTransport::new();
        let a = transport
            .bind(&BindSpec::new("dubbo", "127.0.0.1", 0))
            .await
            .unwrap();
        let b = transport
            .bind(&BindSpec::new("dubbo", "127.0.0.1", 0))
            .await
            .unwrap();
        assert_ne!(a.port(), b.port());
        assert!(a.port() >= EPHEMERAL_PORT_START);
    }

    #[tokio::test]
    async fn test_shared_listener_is_ref_counted() {
        let transport = InMemoryTransport::new();
        let ordinary = transport
            .bind(&BindSpec::new("dubbo", "127.0.0.1", 2002))
            .await
            .unwrap();
        let metadata = transport
            .bind(&BindSpec::new("dubbo", "127.0.0.1", 2002).for_metadata())
            .await
            .unwrap();
        assert_eq!(ordinary.id(), metadata.id());
        assert_eq!(transport.ref_count(2002), Some(2));
        assert!(!transport.listeners()[0].metadata_only);

        transport.unbind(&metadata).await;
        assert_eq!(transport.ref_count(2002), Some(1));
        transport.unbind(&ordinary).await;
        assert!(transport.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_protocol_conflict_and_foreign_port() {
        let transport = InMemoryTransport::new();
        transport
            .bind(&BindSpec::new("dubbo", "127.0.0.1", 2002))
            .await
            .unwrap();
        let err = transport
            .bind(&BindSpec::new("tri", "127.0.0.1", 2002))
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::ProtocolConflict { port: 2002, .. }));

        transport.occupy(8089);
        let err = transport
            .bind(&BindSpec::new("tri", "127.0.0.1", 8089))
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::AddressInUse { port: 8089, .. }));
    }

    #[tokio::test]
    async fn test_unsupported_protocol() {
        let transport = InMemoryTransport::with_protocols(["dubbo"]);
        assert!(transport.supports_protocol("dubbo"));
        let err = transport
            .bind(&BindSpec::new("rest", "127.0.0.1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::UnsupportedProtocol(p) if p == "rest"));
    }

    #[tokio::test]
    async fn test_invoke_without_listener() {
        let transport = InMemoryTransport::new();
        let url = ServiceUrl::new("dubbo", "127.0.0.1", 4444, "demo.DemoService");
        let err = transport
            .invoke(&url, Invocation::no_args("sayHello"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::NoListener(_)));
    }
}
