//! TLS record detection, SNI location, and record re-framing.
//!
//! The proxy never terminates TLS; it only looks far enough into the first
//! record of a CONNECT tunnel to split it in two without breaking the
//! handshake. `locate_sni_heuristic` is the tolerant `0x00 0x00` scan the
//! spec calls for; `locate_sni_strict` is a structurally-correct ClientHello
//! walk used to sanity-check
//! it when the buffer is well-formed enough to parse exactly.

use crate::config::Config;

const RECORD_HEADER_LEN: usize = 5;
const HANDSHAKE_CONTENT_TYPE: u8 = 0x16;

/// Two re-framed TLS records plus any bytes that trailed the original
/// record in the source buffer.
pub struct ReframedRecord {
    pub first: Vec<u8>,
    pub second: Vec<u8>,
    pub trailing: Vec<u8>,
}

/// Does `buf` begin with a TLS handshake record header (content type
/// `0x16`, version one of the four TLS/SSL3 wire versions)?
pub fn looks_like_client_hello(buf: &[u8]) -> bool {
    if buf.len() < 6 {
        return false;
    }
    if buf[0] != HANDSHAKE_CONTENT_TYPE {
        return false;
    }
    matches!((buf[1], buf[2]), (0x03, 0x01) | (0x03, 0x02) | (0x03, 0x03) | (0x03, 0x04))
}

/// Tolerant SNI-offset scan: look for the wire encoding of the
/// `server_name` extension type (`0x00 0x00`) within the record payload.
/// Deliberately non-rigorous — the offset is only a split preference, never
/// a correctness requirement, since any in-payload split yields two legal
/// records.
pub fn locate_sni_heuristic(payload: &[u8], fallback: usize) -> usize {
    if let Some(pos) = payload.windows(2).position(|w| w == [0x00, 0x00]) {
        return pos;
    }
    if payload.len() > 100 {
        return 50;
    }
    fallback
}

/// Structurally walk a ClientHello payload (the bytes after the 5-byte
/// record header) looking for the `server_name` extension, returning the
/// byte offset (within the payload) where its extension header begins.
/// Returns `None` if the payload doesn't parse as a well-formed ClientHello
/// far enough to reach the extensions block.
pub fn locate_sni_strict(payload: &[u8]) -> Option<usize> {
    let mut pos = 0usize;

    // Handshake type (1) + length (3).
    if pos + 4 > payload.len() {
        return None;
    }
    pos += 4;

    // Client version (2).
    if pos + 2 > payload.len() {
        return None;
    }
    pos += 2;

    // Random (32).
    if pos + 32 > payload.len() {
        return None;
    }
    pos += 32;

    // Session ID.
    if pos + 1 > payload.len() {
        return None;
    }
    let session_id_len = payload[pos] as usize;
    pos += 1;
    if pos + session_id_len > payload.len() {
        return None;
    }
    pos += session_id_len;

    // Cipher suites.
    if pos + 2 > payload.len() {
        return None;
    }
    let cipher_suites_len = ((payload[pos] as usize) << 8) | payload[pos + 1] as usize;
    pos += 2;
    if pos + cipher_suites_len > payload.len() {
        return None;
    }
    pos += cipher_suites_len;

    // Compression methods.
    if pos + 1 > payload.len() {
        return None;
    }
    let compression_len = payload[pos] as usize;
    pos += 1;
    if pos + compression_len > payload.len() {
        return None;
    }
    pos += compression_len;

    // Extensions.
    if pos + 2 > payload.len() {
        return None;
    }
    let extensions_len = ((payload[pos] as usize) << 8) | payload[pos + 1] as usize;
    let extensions_start = pos + 2;
    if extensions_start + extensions_len > payload.len() {
        return None;
    }
    let extensions_end = extensions_start + extensions_len;

    let mut cursor = extensions_start;
    while cursor + 4 <= extensions_end {
        let ext_type = ((payload[cursor] as u16) << 8) | payload[cursor + 1] as u16;
        let ext_len = ((payload[cursor + 2] as usize) << 8) | payload[cursor + 3] as usize;
        if cursor + 4 + ext_len > extensions_end {
            return None;
        }
        if ext_type == 0 {
            return Some(cursor);
        }
        cursor += 4 + ext_len;
    }

    None
}

/// Choose the split offset (within the record payload) the framer should
/// use, preferring a strict SNI parse over the heuristic scan when both are
/// attempted and disagree.
fn choose_split_offset(payload: &[u8], config: &Config) -> usize {
    let mut offset = config.tls_record_split_pos;

    if config.tls_record_split_at_sni {
        let strict = locate_sni_strict(payload);
        let heuristic = locate_sni_heuristic(payload, config.tls_record_split_pos);
        offset = strict.unwrap_or(heuristic);
    }

    if offset == 0 {
        offset = 1;
    }

    offset
}

/// Attempt to re-frame the first TLS record in `buf` as two records split
/// within the handshake payload. Returns `None` if `buf` doesn't carry a
/// complete first record, or the resolved split offset doesn't lie strictly
/// inside the payload — callers should fall back to the generic splitter in
/// either case.
pub fn reframe(buf: &[u8], config: &Config) -> Option<ReframedRecord> {
    if buf.len() < RECORD_HEADER_LEN {
        return None;
    }

    let record_length = ((buf[3] as usize) << 8) | buf[4] as usize;
    let record_end = RECORD_HEADER_LEN + record_length;
    if record_end > buf.len() || record_length == 0 {
        return None;
    }

    let payload = &buf[RECORD_HEADER_LEN..record_end];
    let split_pos = choose_split_offset(payload, config);
    if split_pos == 0 || split_pos >= record_length {
        return None;
    }

    let header = &buf[..RECORD_HEADER_LEN];
    let first_len = split_pos;
    let second_len = record_length - split_pos;

    let mut first = Vec::with_capacity(RECORD_HEADER_LEN + first_len);
    first.extend_from_slice(&header[..3]);
    first.push((first_len >> 8) as u8);
    first.push((first_len & 0xff) as u8);
    first.extend_from_slice(&payload[..split_pos]);

    let mut second = Vec::with_capacity(RECORD_HEADER_LEN + second_len);
    second.extend_from_slice(&header[..3]);
    second.push((second_len >> 8) as u8);
    second.push((second_len & 0xff) as u8);
    second.extend_from_slice(&payload[split_pos..]);

    let trailing = buf[record_end..].to_vec();

    Some(ReframedRecord { first, second, trailing })
}
