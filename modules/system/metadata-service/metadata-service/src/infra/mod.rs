//! Infrastructure adapters: transports and the in-memory metadata center.

pub mod metadata_center;
pub mod transport;

pub use metadata_center::InMemoryMetadataCenter;
pub use transport::{InMemoryTransport, TcpTransport};
