//! HTTP request parsing and Host-header rewriting.
//!
//! Header parsing here is deliberately line-oriented text, not a full HTTP
//! parser: the request buffer is split on CRLF, the first line whose
//! lowercased prefix is `host:` is located and edited, and the lines are
//! rejoined. No support for obsolete line folding; only the first Host line
//! is ever inspected.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::relay;
use crate::splitter::{self, SplitContext};

const CRLF: &str = "\r\n";
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of locating and rewriting the Host line in an HTTP request.
pub struct RewrittenRequest {
    /// The request buffer with Host-line edits applied, ready to send.
    pub buffer: Vec<u8>,
    /// `host:port` to dial, taken from the (pre-edit) Host value.
    pub dial_target: String,
}

/// Find the first line whose lowercased prefix is `host:` and return its
/// index plus the trimmed value after the colon.
fn find_host_line(lines: &[&str]) -> Option<(usize, String)> {
    for (idx, line) in lines.iter().enumerate() {
        if line.len() >= 5 && line[..5].eq_ignore_ascii_case("host:") {
            let value = line[5..].trim_start().to_string();
            return Some((idx, value));
        }
    }
    None
}

/// Alternate-case a domain value: even byte indices upper, odd lower.
/// Non-letter bytes pass through unchanged at their index.
fn mixed_case(value: &str) -> String {
    value
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let c = b as char;
            if i % 2 == 0 {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// Apply the configured Host-line edits, in order: remove-spaces,
/// mixed-case key, mixed-case domain.
fn rewrite_host_line(line: &str, config: &Config) -> String {
    let mut rewritten = line.to_string();

    // The two token-level edits below match against the literal `Host:`
    // token, not any-case variant: a line already using an unusual casing
    // (e.g. from a previous run through this same proxy) is left alone
    // rather than re-rewritten, matching the literal-string replace the
    // token.
    if config.host_remove_spaces {
        if let Some(rest) = strip_after_host_colon(&rewritten) {
            rewritten = format!("Host:{rest}");
        }
    }

    if config.host_mixed_case {
        if let Some(pos) = rewritten.find("Host:") {
            rewritten = format!(
                "{}hOsT:{}",
                &rewritten[..pos],
                &rewritten[pos + "Host:".len()..]
            );
        }
    }

    if config.domain_mixed_case {
        if let Some(colon) = rewritten.find(':') {
            let domain = rewritten[colon + 1..].trim();
            let mixed = mixed_case(domain);
            rewritten = format!("{} {}", &rewritten[..=colon], mixed);
        }
    }

    rewritten
}

/// Strip a run of whitespace immediately following the literal `Host:`
/// token, returning the remainder of the line after the token if found.
fn strip_after_host_colon(line: &str) -> Option<String> {
    let colon = line.find("Host:")? + "Host:".len();
    let rest = &line[colon..];
    Some(rest.trim_start_matches([' ', '\t']).to_string())
}

/// Parse the Host header from `buf` and, if present, apply the configured
/// rewrites. Returns `None` if no Host header exists (edge policy: close
/// silently, no upstream dial).
pub fn rewrite_request(buf: &[u8], config: &Config) -> Option<RewrittenRequest> {
    let text = String::from_utf8_lossy(buf);
    let mut lines: Vec<&str> = text.split(CRLF).collect();

    let (host_idx, host_value) = find_host_line(&lines)?;
    if host_value.is_empty() {
        return None;
    }

    let mut dial_target = host_value;
    if !dial_target.contains(':') {
        dial_target.push_str(":80");
    }

    let rewritten_line = rewrite_host_line(lines[host_idx], config);
    let owned_line = rewritten_line;
    lines[host_idx] = owned_line.as_str();

    Some(RewrittenRequest {
        buffer: lines.join(CRLF).into_bytes(),
        dial_target,
    })
}

/// Handle a connection the classifier routed to the HTTP branch: rewrite
/// the Host header, dial the target, write the (possibly split) request,
/// then relay both directions to completion.
///
/// Returns `Ok(())` once the flow has run its course (including the cases
/// where it never dialed upstream, e.g. no Host header). Errors here are
/// always terminal for this connection; the caller just logs and moves on.
pub async fn handle_request(mut client: TcpStream, initial: &[u8], config: &Config) -> Result<()> {
    let rewritten = match rewrite_request(initial, config) {
        Some(r) => r,
        None => {
            log::debug!("HTTP request carries no Host header, closing silently");
            return Err(ProxyError::MissingHost);
        }
    };

    log::debug!("dialing HTTP target {}", rewritten.dial_target);
    let upstream = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&rewritten.dial_target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            log::warn!("{}", ProxyError::Dial { addr: rewritten.dial_target.clone(), source: e });
            let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            return Ok(());
        }
        Err(_) => {
            log::warn!(
                "{}",
                ProxyError::Dial {
                    addr: rewritten.dial_target.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::TimedOut),
                }
            );
            let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            return Ok(());
        }
    };
    let _ = upstream.set_nodelay(true);

    let (client_read, client_write) = client.into_split();
    let (upstream_read, mut upstream_write) = upstream.into_split();

    if config.desync_http {
        splitter::split_and_write(&mut upstream_write, &rewritten.buffer, SplitContext::Http, config).await?;
    } else {
        upstream_write.write_all(&rewritten.buffer).await.map_err(ProxyError::Relay)?;
    }

    // Only the first 4096 bytes of the request are ever read by the
    // classifier; anything the client sends afterward (a large or
    // pipelined body) is relayed unmodified rather than dropped.
    relay::relay_bidirectional(client_read, client_write, upstream_read, upstream_write, config.buffer_size).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(host_line: &str) -> Vec<u8> {
        format!("GET / HTTP/1.1\r\n{host_line}\r\n\r\n").into_bytes()
    }

    #[test]
    fn extracts_dial_target_and_appends_default_port() {
        let config = Config::default();
        let req = base_request("Host: example.com");
        let result = rewrite_request(&req, &config).unwrap();
        assert_eq!(result.dial_target, "example.com:80");
    }

    #[test]
    fn preserves_explicit_port() {
        let config = Config::default();
        let req = base_request("Host: example.com:8443");
        let result = rewrite_request(&req, &config).unwrap();
        assert_eq!(result.dial_target, "example.com:8443");
    }

    #[test]
    fn missing_host_returns_none() {
        let config = Config::default();
        let req = b"GET / HTTP/1.1\r\n\r\n".to_vec();
        assert!(rewrite_request(&req, &config).is_none());
    }

    #[test]
    fn host_remove_spaces_collapses_run_of_whitespace() {
        let mut config = Config::default();
        config.host_remove_spaces = true;
        config.host_mixed_case = false;
        config.domain_mixed_case = false;
        let req = base_request("Host:   example.com");
        let result = rewrite_request(&req, &config).unwrap();
        let text = String::from_utf8(result.buffer).unwrap();
        assert!(text.contains("Host:example.com"));
    }

    #[test]
    fn host_mixed_case_replaces_the_key_token() {
        let mut config = Config::default();
        config.host_remove_spaces = false;
        config.host_mixed_case = true;
        config.domain_mixed_case = false;
        let req = base_request("Host: example.com");
        let result = rewrite_request(&req, &config).unwrap();
        let text = String::from_utf8(result.buffer).unwrap();
        assert!(text.contains("hOsT:"));
    }

    #[test]
    fn domain_mixed_case_alternates_by_index() {
        let mut config = Config::default();
        config.host_remove_spaces = false;
        config.host_mixed_case = false;
        config.domain_mixed_case = true;
        let req = base_request("Host: example.com");
        let result = rewrite_request(&req, &config).unwrap();
        let text = String::from_utf8(result.buffer).unwrap();
        let line = text.lines().find(|l| l.to_ascii_lowercase().starts_with("host:")).unwrap();
        let value = line.split_once(':').unwrap().1.trim();
        for (i, c) in value.chars().enumerate() {
            if c.is_ascii_alphabetic() {
                if i % 2 == 0 {
                    assert!(c.is_ascii_uppercase(), "index {i} should be upper in {value}");
                } else {
                    assert!(c.is_ascii_lowercase(), "index {i} should be lower in {value}");
                }
            }
        }
    }

    #[test]
    fn only_first_host_line_is_inspected() {
        let config = Config::default();
        let req = b"GET / HTTP/1.1\r\nHost: first.example\r\nHost: second.example\r\n\r\n".to_vec();
        let result = rewrite_request(&req, &config).unwrap();
        assert_eq!(result.dial_target, "first.example:80");
    }
}
