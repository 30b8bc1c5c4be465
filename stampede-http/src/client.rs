use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use super::connect::{ConnectTiming, TimedConnector};
use super::estimate::{
    estimate_request_bytes, estimate_response_head_bytes, has_header, host_header_value,
    parse_url,
};
use super::{Error, HttpRequest, HttpResponse, HttpTimings, Result};

/// Pooled HTTP/1.1 client (plain and TLS) shared by all virtual users of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<TimedConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // OS-level connect timeouts can run for tens of seconds against unreachable hosts.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(TimedConnector::new(http_connector));

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Sends `req`. The optional request timeout covers the whole exchange, body included.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        match req.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.send(req))
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => self.send(req).await,
        }
    }

    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = parse_url(&req.url)?;
        let bytes_sent = estimate_request_bytes(&req, &parsed);

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        // Implicit headers are made explicit so byte accounting matches the wire.
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| Error::invalid_header(&k, e))?;
            let value =
                http::header::HeaderValue::from_str(&v).map_err(|e| Error::invalid_header(&k, e))?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let started = Instant::now();
        let res: hyper::Response<Incoming> = self.inner.request(req).await?;
        let head_at = Instant::now();

        let connecting = res
            .extensions()
            .get::<ConnectTiming>()
            .and_then(ConnectTiming::claim)
            .unwrap_or_default();

        let (parts, body) = res.into_parts();
        let body = body.collect().await?.to_bytes();
        let done_at = Instant::now();

        let head_bytes = estimate_response_head_bytes(parts.version, parts.status, &parts.headers);

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            headers: merge_headers(&parts.headers),
            bytes_sent,
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
            timings: HttpTimings {
                connecting,
                waiting: head_at.duration_since(started).saturating_sub(connecting),
                receiving: done_at.duration_since(head_at),
                duration: done_at.duration_since(started),
            },
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let v = String::from_utf8_lossy(value.as_bytes()).to_string();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                if !cur.is_empty() {
                    cur.push_str(", ");
                }
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}
