//! Per-connection protocol classifier.
//!
//! Reads the initial bytes of a freshly accepted connection and decides, by
//! text prefix, which of the three handler branches should take it. The
//! initial read buffer is handed to whichever handler is chosen verbatim;
//! no further reads are needed to complete classification.

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Duration;

use crate::error::{ProxyError, Result};

pub const CLASSIFIER_READ_SIZE: usize = 4096;
pub const CLASSIFIER_READ_TIMEOUT: Duration = Duration::from_secs(30);

const HTTP_METHOD_PREFIXES: &[&str] = &["GET ", "POST ", "PUT ", "DELETE ", "HEAD ", "OPTIONS "];

/// Which handler branch a connection's initial bytes route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
    Raw,
}

/// Classify `buf`'s leading bytes by prefix.
pub fn classify(buf: &[u8]) -> Protocol {
    let text = String::from_utf8_lossy(buf);
    if text.starts_with("CONNECT ") {
        Protocol::Https
    } else if HTTP_METHOD_PREFIXES.iter().any(|p| text.starts_with(p)) {
        Protocol::Http
    } else {
        Protocol::Raw
    }
}

/// Read the classifier's initial chunk from `socket` with the
/// deadline, and classify it. A read error (including the deadline firing)
/// is reported so the caller can close silently.
pub async fn read_and_classify(socket: &mut TcpStream) -> Result<(Protocol, Vec<u8>)> {
    let mut buf = vec![0u8; CLASSIFIER_READ_SIZE];
    let n = tokio::time::timeout(CLASSIFIER_READ_TIMEOUT, socket.read(&mut buf))
        .await
        .map_err(|_| ProxyError::ClassifierRead(std::io::Error::from(std::io::ErrorKind::TimedOut)))?
        .map_err(ProxyError::ClassifierRead)?;

    if n == 0 {
        return Err(ProxyError::ClassifierRead(std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof,
        )));
    }

    buf.truncate(n);
    let protocol = classify(&buf);
    Ok((protocol, buf))
}
