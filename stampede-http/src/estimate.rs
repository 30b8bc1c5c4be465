//! Best-effort HTTP/1.1 wire size estimates used for `data_sent` / `data_received`.

use super::{Error, HttpRequest, Result};

pub(crate) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

pub(crate) fn host_header_value(parsed: &url::Url) -> Option<String> {
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(Error::UnsupportedScheme(raw.to_string())),
    }
}

/// Request line + headers + CRLF + body. Host and Content-Length are counted when the
/// client will add them implicitly.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    let parsed = parse_url(&req.url)?;
    Ok(estimate_request_bytes(req, &parsed))
}

pub(crate) fn estimate_request_bytes(req: &HttpRequest, parsed: &url::Url) -> u64 {
    let path_len = parsed.path().len() + parsed.query().map_or(0, |q| q.len() + 1);
    // "METHOD SP path SP HTTP/1.1 CRLF"
    let mut bytes = (req.method.as_str().len() + 1 + path_len + 1 + "HTTP/1.1".len() + 2) as u64;

    for (k, v) in &req.headers {
        bytes = bytes.saturating_add(header_bytes(k.as_bytes(), v.as_bytes()));
    }
    if !has_header(&req.headers, "host")
        && let Some(host) = host_header_value(parsed)
    {
        bytes = bytes.saturating_add(header_bytes(b"host", host.as_bytes()));
    }

    let body_len = req.body.len() as u64;
    if body_len != 0 && !has_header(&req.headers, "content-length") {
        let v = body_len.to_string();
        bytes = bytes.saturating_add(header_bytes(b"content-length", v.as_bytes()));
    }

    bytes.saturating_add(2).saturating_add(body_len)
}

pub(crate) fn estimate_response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_10 => "HTTP/1.0".len(),
        http::Version::HTTP_2 => "HTTP/2".len(),
        http::Version::HTTP_3 => "HTTP/3".len(),
        _ => "HTTP/1.1".len(),
    } as u64;

    // "HTTP/1.1 SP 200 CRLF" (reason phrase ignored)
    let mut bytes = version_len
        .saturating_add(1)
        .saturating_add(status.as_str().len() as u64)
        .saturating_add(2);
    for (name, value) in headers {
        bytes = bytes.saturating_add(header_bytes(name.as_str().as_bytes(), value.as_bytes()));
    }
    bytes.saturating_add(2)
}

fn header_bytes(name: &[u8], value: &[u8]) -> u64 {
    // "name: value\r\n"
    (name.len() + 2 + value.len() + 2) as u64
}
