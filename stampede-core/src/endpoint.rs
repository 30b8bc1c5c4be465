//! Endpoint identity for per-endpoint metric series.

use std::fmt::Write as _;

/// Path of `url` without query string or fragment. Relative inputs are accepted.
pub fn endpoint_path(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url)
        && parsed.has_host()
    {
        return parsed.path().to_string();
    }

    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Injective encoding of an endpoint into a metric-name-safe key: ASCII letters and
/// digits pass through, every other byte becomes `_XX` (uppercase hex), `_` included.
pub fn endpoint_key(endpoint: &str) -> String {
    let mut out = String::with_capacity(endpoint.len() * 2);
    for b in endpoint.bytes() {
        if b.is_ascii_alphanumeric() {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "_{b:02X}");
        }
    }
    out
}

/// Inverse of [`endpoint_key`]. Returns `None` for strings `endpoint_key` never produces.
pub fn decode_endpoint_key(key: &str) -> Option<String> {
    let bytes = key.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() {
            out.push(b);
            i += 1;
        } else if b == b'_' {
            let hex = key.get(i + 1..i + 3)?;
            if hex.bytes().any(|c| c.is_ascii_lowercase()) {
                return None;
            }
            let decoded = u8::from_str_radix(hex, 16).ok()?;
            if decoded.is_ascii_alphanumeric() {
                return None;
            }
            out.push(decoded);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf8(out).ok()
}

pub const ENDPOINT_REQS_PREFIX: &str = "endpoint_reqs_";
pub const ENDPOINT_DURATION_PREFIX: &str = "endpoint_duration_";
pub const ENDPOINT_ERRORS_PREFIX: &str = "endpoint_errors_";
