//! Bidirectional byte relay.
//!
//! tokio's `TcpStream` does not implement `AsyncRead`/`AsyncWrite` for
//! `&TcpStream` the way std's does, so a shared reference can't drive both
//! directions concurrently. Each direction instead runs off an owned half
//! from [`TcpStream::into_split`] (`OwnedReadHalf`/`OwnedWriteHalf`, each
//! backed by its own internal `Arc`), moved into its own side of the
//! relay. Forced shutdown at proxy teardown is handled separately, by the
//! connection registry holding a duplicated `socket2::Socket` obtained
//! before the stream was ever split (see `crate::registry`).

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{ProxyError, Result};

/// Plain copy from `src` to `dst` until EOF or error. Used for the
/// server→client direction, which is never transformed, and for the
/// HTTP path's upstream→client response copy.
pub async fn copy_opaque(mut src: OwnedReadHalf, mut dst: OwnedWriteHalf, buffer_size: usize) -> Result<()> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = src.read(&mut buf).await.map_err(ProxyError::Relay)?;
        if n == 0 {
            return Ok(());
        }
        dst.write_all(&buf[..n]).await.map_err(ProxyError::Relay)?;
    }
}

/// Run `copy_opaque` in both directions concurrently, returning once
/// either side ends (error or EOF). The other direction's read will then
/// either hit EOF on its own or get force-closed by the registry at
/// shutdown; nothing further needs doing here.
pub async fn relay_bidirectional(
    client_read: OwnedReadHalf,
    client_write: OwnedWriteHalf,
    upstream_read: OwnedReadHalf,
    upstream_write: OwnedWriteHalf,
    buffer_size: usize,
) {
    let client_to_server = copy_opaque(client_read, upstream_write, buffer_size);
    let server_to_client = copy_opaque(upstream_read, client_write, buffer_size);

    tokio::select! {
        _ = client_to_server => {}
        _ = server_to_client => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn copy_opaque_forwards_bytes_until_eof() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (server_side, _) = listener.accept().await.unwrap();
            server_side
        });
        let mut client_side = TcpStream::connect(addr).await.unwrap();
        let server_side = server_task.await.unwrap();

        client_side.write_all(b"hello relay").await.unwrap();
        client_side.shutdown().await.unwrap();

        let listener2 = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr2 = listener2.local_addr().unwrap();
        let sink_task = tokio::spawn(async move {
            let (sink, _) = listener2.accept().await.unwrap();
            sink
        });
        let dst = TcpStream::connect(addr2).await.unwrap();
        let sink = sink_task.await.unwrap();

        let (server_read, _server_write) = server_side.into_split();
        let (_dst_read, dst_write) = dst.into_split();

        copy_opaque(server_read, dst_write, 4096).await.unwrap();

        let (mut sink_read, _sink_write) = sink.into_split();
        let mut received = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut sink_read, &mut received)
            .await
            .unwrap();
        assert_eq!(received, b"hello relay");
    }
}
