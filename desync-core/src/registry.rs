//! Connection registry used only to support shutdown.
//!
//! Handlers never look each other up through this map; it exists purely so
//! that a shutdown sweep can force-close every client socket still open.
//! The registry can't hold the client `TcpStream` itself (or an
//! `Arc<TcpStream>`) once the relay owns it, because the relay needs
//! [`TcpStream::into_split`]'s owned halves, one per direction, and
//! nothing is left over to track centrally. Instead, each accepted socket
//! is duplicated at the OS level (`socket2::Socket::try_clone`, a `dup()`
//! under the hood) before it is handed to its handler; the duplicate is a
//! distinct file descriptor over the *same* underlying socket, so
//! `shutdown(Both)` on it forces the original descriptor's pending reads
//! and writes to fail or return EOF no matter which half currently owns
//! them.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use socket2::Socket;

/// Monotonically increasing connection identifiers, unique for the
/// lifetime of the process.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// A registry of accepted client sockets, keyed by connection id.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<u64, Socket>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Record a newly accepted socket's shutdown duplicate under `id`.
    pub fn insert(&self, id: u64, shutdown_handle: Socket) {
        self.inner.lock().unwrap().insert(id, shutdown_handle);
    }

    /// Remove `id`'s entry, e.g. on handler exit. A scoped guard
    /// ([`RegistryGuard`]) is the usual way this gets called.
    pub fn remove(&self, id: u64) {
        self.inner.lock().unwrap().remove(&id);
    }

    /// Number of sockets currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-close every tracked socket and empty the registry. Used only
    /// at shutdown.
    pub fn close_all(&self) {
        let sockets: Vec<Socket> = {
            let mut map = self.inner.lock().unwrap();
            map.drain().map(|(_, socket)| socket).collect()
        };
        for socket in sockets {
            let _ = socket.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// RAII guard that removes a connection's registry entry when dropped,
/// so every handler exit path (success, error, panic-unwind) releases it.
pub struct RegistryGuard {
    registry: Registry,
    id: u64,
}

impl RegistryGuard {
    pub fn new(registry: Registry, id: u64) -> Self {
        RegistryGuard { registry, id }
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
