//! Error types shared across the proxy core.
//!
//! Every error here is terminal for the connection it concerns; the core
//! never retries. Handlers log a variant and unwind rather than matching on
//! raw `io::Error` kinds at every call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    #[error("classifier read failed: {0}")]
    ClassifierRead(std::io::Error),

    #[error("no recognizable protocol in initial bytes")]
    UnrecognizedProtocol,

    #[error("missing Host header")]
    MissingHost,

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("relay I/O error: {0}")]
    Relay(std::io::Error),

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
