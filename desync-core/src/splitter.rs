//! Generic byte-stream splitter.
//!
//! Emits a logically single write as two physical writes separated by a
//! short sleep, so that typical TCP stacks place them in distinct segments.
//! This is the desync primitive both the HTTP path and the TLS path (as a
//! fallback) build on.

use tokio::io::AsyncWriteExt;
use tokio::time::Duration;

use crate::config::Config;
use crate::error::{ProxyError, Result};

/// Context a buffer is being split in, used only to decide whether
/// `split_at_host` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitContext {
    Http,
    Tls,
}

const INTER_WRITE_PAUSE: Duration = Duration::from_millis(1);

/// Case-insensitive search for `host:` in `buf`, returning its byte offset.
pub fn find_host_position(buf: &[u8]) -> Option<usize> {
    if buf.len() < 5 {
        return None;
    }
    buf.windows(5).position(|w| w.eq_ignore_ascii_case(b"host:"))
}

/// Compute the offset this split should occur at, given the configured
/// default and the context-specific override.
pub fn resolve_offset(config: &Config, buf: &[u8], context: SplitContext) -> usize {
    if context == SplitContext::Http && config.split_at_host {
        if let Some(host_pos) = find_host_position(buf) {
            if host_pos > 0 {
                return host_pos;
            }
        }
    }
    config.split_position
}

/// Write `buf` to `dst` as a single write, or as two writes separated by a
/// short sleep if `0 < offset < buf.len()`.
pub async fn write_split<W: AsyncWriteExt + Unpin>(
    dst: &mut W,
    buf: &[u8],
    offset: usize,
) -> Result<()> {
    if offset > 0 && offset < buf.len() {
        dst.write_all(&buf[..offset]).await.map_err(ProxyError::Relay)?;
        tokio::time::sleep(INTER_WRITE_PAUSE).await;
        dst.write_all(&buf[offset..]).await.map_err(ProxyError::Relay)?;
    } else {
        dst.write_all(buf).await.map_err(ProxyError::Relay)?;
    }
    Ok(())
}

/// Resolve the split offset for `buf` under `context` and perform the split
/// write against `dst`.
pub async fn split_and_write<W: AsyncWriteExt + Unpin>(
    dst: &mut W,
    buf: &[u8],
    context: SplitContext,
    config: &Config,
) -> Result<()> {
    let offset = resolve_offset(config, buf, context);
    write_split(dst, buf, offset).await
}
