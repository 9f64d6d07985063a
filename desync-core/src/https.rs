//! CONNECT tunnel handling and the client→server desync decision tree.
//!
//! The HTTPS path dials the CONNECT target, responds `200`/`502`, then
//! runs two relay directions concurrently: a TLS-aware client→server copy
//! (this module) and a plain server→client copy
//! ([`crate::relay::copy_opaque`]), each driven off its own owned half of
//! the client and upstream streams (`TcpStream::into_split`).

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::relay;
use crate::splitter::{self, SplitContext};
use crate::tls;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse the `CONNECT <host:port> HTTP/1.1` request line, returning the
/// dial target.
pub fn parse_connect_target(initial: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(initial);
    let first_line = text.split("\r\n").next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    if method != "CONNECT" {
        return None;
    }
    let target = parts.next()?;
    Some(target.to_string())
}

/// Handle a connection the classifier routed to the HTTPS (CONNECT)
/// branch: dial the target, answer with `200`/`502`, then relay with the
/// TLS-aware desync path on client→server.
pub async fn handle_connect(mut client: TcpStream, initial: &[u8], config: &Config) -> Result<()> {
    let target = match parse_connect_target(initial) {
        Some(t) => t,
        None => return Err(ProxyError::MalformedRequest("CONNECT line missing target".into())),
    };

    log::debug!("dialing CONNECT target {target}");
    let upstream = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            log::warn!("{}", ProxyError::Dial { addr: target.clone(), source: e });
            let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            return Ok(());
        }
        Err(_) => {
            log::warn!(
                "{}",
                ProxyError::Dial {
                    addr: target.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::TimedOut),
                }
            );
            let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            return Ok(());
        }
    };
    let _ = upstream.set_nodelay(true);

    client
        .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
        .await
        .map_err(ProxyError::Relay)?;

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let client_to_server = desync_copy(upstream_write, client_read, config);
    let buffer_size = config.buffer_size;
    let server_to_client = relay::copy_opaque(upstream_read, client_write, buffer_size);

    tokio::select! {
        _ = client_to_server => {}
        _ = server_to_client => {}
    }

    Ok(())
}

/// Client→server copy loop with the TLS-aware per-chunk transform applied.
/// This is re-evaluated on every chunk read, per spec: only the first
/// chunk is ever an actual TLS handshake record, but the same test runs
/// every time regardless.
async fn desync_copy(mut dst: OwnedWriteHalf, mut src: OwnedReadHalf, config: &Config) -> Result<()> {
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; config.buffer_size];
    loop {
        let n = src.read(&mut buf).await.map_err(ProxyError::Relay)?;
        if n == 0 {
            return Ok(());
        }
        let chunk = &buf[..n];

        if !config.desync_https {
            dst.write_all(chunk).await.map_err(ProxyError::Relay)?;
            continue;
        }

        if config.tls_record_split && tls::looks_like_client_hello(chunk) {
            match tls::reframe(chunk, config) {
                Some(reframed) => {
                    log::debug!(
                        "re-framed TLS record into {} + {} byte payloads",
                        reframed.first.len(),
                        reframed.second.len()
                    );
                    write_reframed(&mut dst, &reframed).await?;
                    continue;
                }
                None => log::debug!("TLS record too short or split offset out of range, falling back to generic split"),
            }
        }

        if config.desync_method == "split" {
            splitter::split_and_write(&mut dst, chunk, SplitContext::Tls, config).await?;
        } else {
            dst.write_all(chunk).await.map_err(ProxyError::Relay)?;
        }
    }
}

async fn write_reframed(dst: &mut OwnedWriteHalf, reframed: &tls::ReframedRecord) -> Result<()> {
    dst.write_all(&reframed.first).await.map_err(ProxyError::Relay)?;
    tokio::time::sleep(Duration::from_millis(1)).await;
    dst.write_all(&reframed.second).await.map_err(ProxyError::Relay)?;
    if !reframed.trailing.is_empty() {
        dst.write_all(&reframed.trailing).await.map_err(ProxyError::Relay)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_target() {
        let req = b"CONNECT www.example.com:443 HTTP/1.1\r\n\r\n";
        assert_eq!(parse_connect_target(req).unwrap(), "www.example.com:443");
    }

    #[test]
    fn rejects_non_connect_requests() {
        let req = b"GET / HTTP/1.1\r\n\r\n";
        assert!(parse_connect_target(req).is_none());
    }

    #[test]
    fn rejects_malformed_connect_line() {
        assert!(parse_connect_target(b"CONNECT\r\n\r\n").is_none());
    }
}
