//! Transport implementations.

mod memory;
mod tcp;

pub use memory::InMemoryTransport;
pub use tcp::TcpTransport;

/// First port handed out for ephemeral binds by [`InMemoryTransport`].
pub const EPHEMERAL_PORT_START: u16 = 49152;

/// Reference counts of one shared listener.
#[derive(Debug, Default)]
struct ListenerRefs {
    total: usize,
    ordinary: usize,
}

impl ListenerRefs {
    fn acquire(&mut self, metadata_only: bool) {
        self.total += 1;
        if !metadata_only {
            self.ordinary += 1;
        }
    }

    /// Returns `true` when the last reference is gone.
    fn release(&mut self, metadata_only: bool) -> bool {
        self.total = self.total.saturating_sub(1);
        if !metadata_only {
            self.ordinary = self.ordinary.saturating_sub(1);
        }
        self.total == 0
    }

    fn is_metadata_only(&self) -> bool {
        self.ordinary == 0
    }
}
