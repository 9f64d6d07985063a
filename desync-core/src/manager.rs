//! Connection manager: accept loop, registry bookkeeping, and dispatch.
//!
//! Generalizes a plain `AtomicBool` shutdown flag to a
//! [`tokio::sync::Notify`] pair, since tokio's `accept()` has no
//! `WouldBlock` case to poll between checks the way a non-blocking accept
//! loop does — the accept future and the shutdown notification are raced
//! directly with `select!` instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use crate::classifier::{self, Protocol};
use crate::config::Config;
use crate::error::Result;
use crate::registry::{self, Registry, RegistryGuard};
use crate::{http, https};

/// Shared handle used to request shutdown from outside the accept loop
/// (e.g. a Ctrl-C handler).
#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Shutdown {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Signal shutdown: the accept loop will stop taking new connections
    /// and the registry will force-close every socket already accepted.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the accept loop against an already-bound listener until `shutdown`
/// is triggered. Each accepted connection is registered, spawned onto its
/// own task, and deregistered on exit via [`RegistryGuard`].
pub async fn run(listener: TcpListener, config: Arc<Config>, shutdown: Shutdown) {
    let registry = Registry::new();
    log::info!("accepting connections on {}", config.listen_addr());

    loop {
        if shutdown.is_triggered() {
            break;
        }

        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        if registry.len() >= config.max_connections {
                            log::warn!("rejecting {addr}: at max_connections ({})", config.max_connections);
                            continue;
                        }
                        log::debug!("accepted connection from {addr}");
                        spawn_connection(socket, addr, Arc::clone(&config), registry.clone());
                    }
                    Err(e) => {
                        log::error!("accept failed: {e}");
                    }
                }
            }
            _ = shutdown.wait() => {
                break;
            }
        }
    }

    log::info!("shutting down: closing {} tracked connection(s)", registry.len());
    registry.close_all();
}

fn spawn_connection(socket: TcpStream, addr: std::net::SocketAddr, config: Arc<Config>, registry: Registry) {
    let id = registry::next_connection_id();

    // The relay needs to split this stream into owned halves, one per
    // direction, so the registry can't hold the stream (or an `Arc`
    // around it) and still expect to find it there later. A duplicated
    // descriptor over the same underlying socket lets shutdown force both
    // halves closed regardless of which task currently owns them.
    match socket2::SockRef::from(&socket).try_clone() {
        Ok(shutdown_handle) => registry.insert(id, shutdown_handle),
        Err(e) => log::warn!("failed to duplicate socket for {addr}, shutdown won't force-close it: {e}"),
    }

    tokio::spawn(async move {
        let _guard = RegistryGuard::new(registry, id);
        if let Err(e) = handle_connection(socket, &config).await {
            log::debug!("connection {addr} ended: {e}");
        }
    });
}

/// Classify and dispatch a single accepted connection to its handler.
async fn handle_connection(mut socket: TcpStream, config: &Config) -> Result<()> {
    let (protocol, initial) = classifier::read_and_classify(&mut socket).await?;
    log::debug!("classified connection as {protocol:?}");

    match protocol {
        Protocol::Http => http::handle_request(socket, &initial, config).await,
        Protocol::Https => https::handle_connect(socket, &initial, config).await,
        Protocol::Raw => {
            log::debug!("closing unrecognized-protocol connection");
            Err(crate::error::ProxyError::UnrecognizedProtocol)
        }
    }
}
