//! TCP transport speaking newline-delimited JSON.
//!
//! Each request line is a [`WireRequest`]; the server answers with one
//! [`WireResponse`] line. Clients open a connection per call.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metadata_service_sdk::{
    BindError, BindSpec, InvokeError, Invocation, ListenerHandle, ListenerInfo, ServiceInvoker,
    ServiceUrl, Transport, socket_address,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::ListenerRefs;

type ServiceTable = Arc<RwLock<HashMap<String, Arc<dyn ServiceInvoker>>>>;

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    service: String,
    #[serde(flatten)]
    invocation: Invocation,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WireResponse {
    Ok { result: serde_json::Value },
    NoService { service: String },
    Error { message: String },
}

struct TcpListenerEntry {
    id: u64,
    protocol: String,
    host: String,
    refs: ListenerRefs,
    services: ServiceTable,
    cancel: CancellationToken,
}

/// Transport backed by real sockets.
pub struct TcpTransport {
    protocols: Vec<String>,
    listeners: Mutex<HashMap<u16, TcpListenerEntry>>,
    next_id: AtomicU64,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(["dubbo", "tri"])
    }
}

impl TcpTransport {
    #[must_use]
    pub fn new<I, S>(protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protocols: protocols.into_iter().map(Into::into).collect(),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Share an already open listener on `spec.port`, if any.
    fn share(&self, spec: &BindSpec) -> Option<Result<ListenerHandle, BindError>> {
        let mut listeners = self.listeners.lock();
        let entry = listeners.get_mut(&spec.port)?;
        if entry.protocol != spec.protocol {
            return Some(Err(BindError::ProtocolConflict {
                port: spec.port,
                bound: entry.protocol.clone(),
                requested: spec.protocol.clone(),
            }));
        }
        entry.refs.acquire(spec.metadata_only);
        Some(Ok(ListenerHandle::new(
            entry.id,
            &entry.protocol,
            &entry.host,
            spec.port,
            spec.metadata_only,
        )))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|p| p == protocol)
    }

    async fn bind(&self, spec: &BindSpec) -> Result<ListenerHandle, BindError> {
        if !self.supports_protocol(&spec.protocol) {
            return Err(BindError::UnsupportedProtocol(spec.protocol.clone()));
        }
        if spec.port != 0
            && let Some(shared) = self.share(spec)
        {
            return shared;
        }

        let address = socket_address(&spec.host, spec.port);
        let listener = TcpListener::bind(address.as_str())
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::AddrInUse => BindError::AddressInUse {
                    host: spec.host.clone(),
                    port: spec.port,
                },
                _ => BindError::Io {
                    address: address.clone(),
                    source,
                },
            })?;
        let port = listener
            .local_addr()
            .map_err(|source| BindError::Io {
                address: address.clone(),
                source,
            })?
            .port();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let services: ServiceTable = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let mut refs = ListenerRefs::default();
        refs.acquire(spec.metadata_only);

        tokio::spawn(serve(listener, Arc::clone(&services), cancel.clone()));
        tracing::info!(protocol = %spec.protocol, host = %spec.host, port, "TCP listener bound");

        self.listeners.lock().insert(
            port,
            TcpListenerEntry {
                id,
                protocol: spec.protocol.clone(),
                host: spec.host.clone(),
                refs,
                services,
                cancel,
            },
        );
        Ok(ListenerHandle::new(
            id,
            &spec.protocol,
            &spec.host,
            port,
            spec.metadata_only,
        ))
    }

    async fn unbind(&self, handle: &ListenerHandle) {
        let mut listeners = self.listeners.lock();
        let Some(entry) = listeners.get_mut(&handle.port()).filter(|e| e.id == handle.id()) else {
            tracing::warn!(port = handle.port(), "Unbind of unknown TCP listener");
            return;
        };
        if entry.refs.release(handle.is_metadata_only())
            && let Some(entry) = listeners.remove(&handle.port())
        {
            entry.cancel.cancel();
            tracing::info!(port = handle.port(), "TCP listener closed");
        }
    }

    fn publish(
        &self,
        handle: &ListenerHandle,
        service_key: &str,
        invoker: Arc<dyn ServiceInvoker>,
    ) -> Result<(), BindError> {
        let listeners = self.listeners.lock();
        let entry = listeners
            .get(&handle.port())
            .filter(|e| e.id == handle.id())
            .ok_or(BindError::UnknownListener(handle.id()))?;
        let mut services = entry.services.write();
        if services.contains_key(service_key) {
            return Err(BindError::ServiceInUse {
                address: socket_address(&entry.host, handle.port()),
                service: service_key.to_owned(),
            });
        }
        services.insert(service_key.to_owned(), invoker);
        Ok(())
    }

    fn unpublish(&self, handle: &ListenerHandle, service_key: &str) {
        let listeners = self.listeners.lock();
        if let Some(entry) = listeners.get(&handle.port()).filter(|e| e.id == handle.id()) {
            entry.services.write().remove(service_key);
        }
    }

    fn listeners(&self) -> Vec<ListenerInfo> {
        let listeners = self.listeners.lock();
        let mut found: Vec<(u64, ListenerInfo)> = listeners
            .iter()
            .map(|(port, e)| {
                let mut services: Vec<String> = e.services.read().keys().cloned().collect();
                services.sort();
                (
                    e.id,
                    ListenerInfo {
                        protocol: e.protocol.clone(),
                        host: e.host.clone(),
                        port: *port,
                        metadata_only: e.refs.is_metadata_only(),
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
        let address = url.address();
        let stream = TcpStream::connect(address.as_str())
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::ConnectionRefused => InvokeError::NoListener(address.clone()),
                _ => InvokeError::Io(e),
            })?;
        let (read, mut write) = stream.into_split();

        let mut line = serde_json::to_string(&WireRequest {
            service: url.service_key(),
            invocation,
        })?;
        line.push('\n');
        write.write_all(line.as_bytes()).await?;
        write.flush().await?;

        let mut lines = BufReader::new(read).lines();
        let reply = lines.next_line().await?.ok_or_else(|| {
            InvokeError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection to {address} closed without a reply"),
            ))
        })?;

        match serde_json::from_str::<WireResponse>(&reply)? {
            WireResponse::Ok { result } => Ok(result),
            WireResponse::NoService { service } => Err(InvokeError::NoService(service)),
            WireResponse::Error { message } => Err(InvokeError::Remote(message)),
        }
    }
}

async fn serve(listener: TcpListener, services: ServiceTable, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(%peer, "Connection accepted");
                    tokio::spawn(handle_connection(
                        stream,
                        Arc::clone(&services),
                        cancel.child_token(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, "Accept failed"),
            },
        }
    }
}

async fn handle_connection(stream: TcpStream, services: ServiceTable, cancel: CancellationToken) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Connection read failed");
                break;
            }
        };

        let response = dispatch(&services, &line).await;
        let mut out = match serde_json::to_string(&response) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot encode response");
                break;
            }
        };
        out.push('\n');
        if write.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }
}

async fn dispatch(services: &ServiceTable, line: &str) -> WireResponse {
    let request: WireRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return WireResponse::Error {
                message: format!("malformed request: {e}"),
            };
        }
    };
    let Some(invoker) = services.read().get(&request.service).cloned() else {
        return WireResponse::NoService {
            service: request.service,
        };
    };
    match invoker.invoke(request.invocation).await {
        Ok(result) => WireResponse::Ok { result },
        Err(e) => WireResponse::Error {
            message: format!("{e:#}"),
        },
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_wire_request_flattens_invocation() {
        let request = WireRequest {
            service: "g/demo.DemoService:1.0.0".to_owned(),
            invocation: Invocation::new("sayHello", serde_json::json!(["world"])),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({
                "service": "g/demo.DemoService:1.0.0",
                "method": "sayHello",
                "args": ["world"],
            })
        );
    }

    #[test]
    fn test_wire_response_is_tagged() {
        let encoded = serde_json::to_string(&WireResponse::NoService {
            service: "x".to_owned(),
        })
        .unwrap();
        assert_eq!(encoded, r#"{"status":"no_service","service":"x"}"#);
    }

    #[tokio::test]
    async fn test_unsupported_protocol_is_rejected() {
        let transport = TcpTransport::new(["dubbo"]);
        let err = transport
            .bind(&BindSpec::new("tri", "127.0.0.1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, BindError::UnsupportedProtocol(_)));
    }
}
