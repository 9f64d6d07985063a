//! Core library for the local desync forwarding proxy.
//!
//! Accepts plaintext HTTP and CONNECT-tunneled HTTPS connections on a single
//! listening socket, classifies each by its leading bytes, and relays it to
//! the dialed target after applying the configured desynchronization
//! transform on the client→server direction. Nothing here terminates TLS or
//! inspects a request body past the classifier's initial read.

pub mod acceptor;
pub mod classifier;
pub mod config;
pub mod error;
pub mod http;
pub mod https;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod relay;
pub mod splitter;
pub mod tls;

use std::sync::Arc;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use manager::Shutdown;

/// Bind and run the proxy until `shutdown` is triggered.
///
/// This is the single entry point a binary needs: bind the listener under
/// `config`, then hand it to the connection manager's accept loop.
pub async fn run(config: Config, shutdown: Shutdown) -> Result<()> {
    let listener = acceptor::bind(&config).await?;
    manager::run(listener, Arc::new(config), shutdown).await;
    Ok(())
}
