//! End-to-end accept→classify→relay coverage against an in-process
//! loopback listener standing in for "the destination".

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use desync_core::{Config, Shutdown};

async fn spawn_echo_destination() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, handle)
}

async fn spawn_proxy(config: Config) -> (std::net::SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind(config.listen_addr()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let run_shutdown = shutdown.clone();
    let config = Arc::new(config);

    let handle = tokio::spawn(async move {
        desync_core::manager::run(listener, config, run_shutdown).await;
    });

    (addr, shutdown, handle)
}

#[tokio::test]
async fn http_request_is_rewritten_and_relayed_to_the_dialed_host() {
    let (dest_addr, _dest_handle) = spawn_echo_destination().await;

    let config = Config {
        listen_address: "127.0.0.1".to_string(),
        listen_port: 0,
        desync_http: true,
        split_position: 4,
        host_remove_spaces: false,
        host_mixed_case: false,
        domain_mixed_case: false,
        ..Config::default()
    };
    let (proxy_addr, shutdown, proxy_handle) = spawn_proxy(config).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!("GET / HTTP/1.1\r\nHost: {dest_addr}\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    let mut received = vec![0u8; request.len()];
    client.read_exact(&mut received).await.unwrap();
    assert_eq!(received, request.as_bytes());

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(2), proxy_handle).await;
}

#[tokio::test]
async fn https_connect_tunnels_bytes_after_200_response() {
    let (dest_addr, _dest_handle) = spawn_echo_destination().await;

    let config = Config {
        listen_address: "127.0.0.1".to_string(),
        listen_port: 0,
        desync_https: true,
        tls_record_split: false,
        ..Config::default()
    };
    let (proxy_addr, shutdown, proxy_handle) = spawn_proxy(config).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let connect_line = format!("CONNECT {dest_addr} HTTP/1.1\r\n\r\n");
    client.write_all(connect_line.as_bytes()).await.unwrap();

    let mut response = vec![0u8; b"HTTP/1.1 200 Connection established\r\n\r\n".len()];
    client.read_exact(&mut response).await.unwrap();
    assert_eq!(response, b"HTTP/1.1 200 Connection established\r\n\r\n");

    client.write_all(b"plain tunneled bytes").await.unwrap();
    let mut echoed = vec![0u8; b"plain tunneled bytes".len()];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, b"plain tunneled bytes");

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(2), proxy_handle).await;
}

#[tokio::test]
async fn unrecognized_protocol_is_closed_without_dialing_anything() {
    let config = Config {
        listen_address: "127.0.0.1".to_string(),
        listen_port: 0,
        ..Config::default()
    };
    let (proxy_addr, shutdown, proxy_handle) = spawn_proxy(config).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "raw connections get no response, just a close");

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(2), proxy_handle).await;
}
