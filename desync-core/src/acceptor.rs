//! Listener bind and accept loop.
//!
//! The acceptor's only job is turning `Config::listen_addr()` into a bound
//! [`TcpListener`] and handing accepted sockets off one at a time; all
//! per-connection policy (classification, registry bookkeeping, dispatch)
//! lives in [`crate::manager`].

use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::error::{ProxyError, Result};

/// Bind the listener to the configured `listen_address`/`listen_port`.
pub async fn bind(config: &Config) -> Result<TcpListener> {
    let addr = config.listen_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ProxyError::Bind { addr, source })
}

/// Accept a single connection, logging and swallowing per-connection accept
/// errors rather than treating them as fatal to the listener itself.
pub async fn accept_one(listener: &TcpListener) -> Result<(TcpStream, std::net::SocketAddr)> {
    listener.accept().await.map_err(ProxyError::Accept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_to_configured_address_and_port() {
        let config = Config {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 0,
            ..Config::default()
        };
        let listener = bind(&config).await.unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn bind_failure_reports_the_attempted_address() {
        let first = bind(&Config {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 0,
            ..Config::default()
        })
        .await
        .unwrap();
        let bound_port = first.local_addr().unwrap().port();

        let config = Config {
            listen_address: "127.0.0.1".to_string(),
            listen_port: bound_port,
            ..Config::default()
        };
        let result = bind(&config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accept_one_returns_the_peer_address() {
        let listener = bind(&Config {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 0,
            ..Config::default()
        })
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (_, peer) = accept_one(&listener).await.unwrap();
        let _client = client_task.await.unwrap();
        assert!(peer.port() > 0);
    }
}
