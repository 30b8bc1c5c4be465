use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_SEARCH_DESTINATIONS: &str = "/v1/search/destinations";
pub const PATH_PRODUCTS: &str = "/v1/products";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_HTML: &str = "/html";

/// Mock API behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct TestServerOptions {
    /// Every `n`-th search request answers 500. `None` disables injected failures.
    pub fail_every: Option<u64>,
    /// Reject search requests without a bearer token with 401.
    pub require_token: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            fail_every: Some(20),
            require_token: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    search_total: Arc<AtomicU64>,
    search_failed: Arc<AtomicU64>,
    saw_bearer_token: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn search_total(&self) -> u64 {
        self.search_total.load(Ordering::Relaxed)
    }

    pub fn search_failed(&self) -> u64 {
        self.search_failed.load(Ordering::Relaxed)
    }

    pub fn saw_bearer_token(&self) -> u64 {
        self.saw_bearer_token.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub search: String,
    pub products: String,
    pub slow: String,
    pub echo: String,
    pub html: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            search: format!("{base_url}{PATH_SEARCH_DESTINATIONS}"),
            products: format!("{base_url}{PATH_PRODUCTS}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            html: format!("{base_url}{PATH_HTML}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

#[derive(Clone)]
struct AppState {
    stats: TestServerStats,
    options: TestServerOptions,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct Destination {
    id: u32,
    name: String,
    country: &'static str,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Response {
    state.stats.inc_requests_total();

    let has_token = bearer_token(&headers).is_some();
    if has_token {
        state.stats.saw_bearer_token.fetch_add(1, Ordering::Relaxed);
    } else if state.options.require_token {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing bearer token"})),
        )
            .into_response();
    }

    let n = state.stats.search_total.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(every) = state.options.fail_every
        && every != 0
        && n % every == 0
    {
        state.stats.search_failed.fetch_add(1, Ordering::Relaxed);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "upstream unavailable"})),
        )
            .into_response();
    }

    let Some(location) = query.location.filter(|l| !l.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "`location` is required"})),
        )
            .into_response();
    };

    let destinations: Vec<Destination> = (1..=3)
        .map(|id| Destination {
            id,
            name: format!("{location} #{id}"),
            country: "MX",
        })
        .collect();

    Json(json!({
        "location": location,
        "count": destinations.len(),
        "destinations": destinations,
    }))
    .into_response()
}

async fn handle_products(State(state): State<AppState>) -> Response {
    state.stats.inc_requests_total();
    Json(json!({
        "products": [
            {"id": 1, "name": "Hotel", "price_cents": 12_000},
            {"id": 2, "name": "Tour", "price_cents": 4_500},
        ]
    }))
    .into_response()
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> Response {
    state.stats.inc_requests_total();
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({"status": status.as_u16()}))).into_response()
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

async fn handle_slow(State(state): State<AppState>, Query(query): Query<SlowQuery>) -> Response {
    state.stats.inc_requests_total();
    let ms = query.ms.unwrap_or(50);
    sleep(Duration::from_millis(ms)).await;
    Json(json!({"slept_ms": ms})).into_response()
}

async fn handle_echo(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    state.stats.inc_requests_total();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    if content_type
        .to_ascii_lowercase()
        .starts_with("application/json")
    {
        state
            .stats
            .saw_json_content_type
            .fetch_add(1, Ordering::Relaxed);
    }

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn handle_html(State(state): State<AppState>) -> Response {
    state.stats.inc_requests_total();
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html><body>maintenance</body></html>",
    )
        .into_response()
}

pub fn router(stats: TestServerStats, options: TestServerOptions) -> Router {
    Router::new()
        .route(PATH_SEARCH_DESTINATIONS, get(handle_search))
        .route(PATH_PRODUCTS, get(handle_products))
        .route(PATH_STATUS, get(handle_status))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_ECHO, post(handle_echo).put(handle_echo))
        .route(PATH_HTML, get(handle_html))
        .with_state(AppState { stats, options })
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone(), options);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
