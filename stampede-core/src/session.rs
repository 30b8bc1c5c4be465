use std::time::Duration;

use rand::Rng as _;
use stampede_http::{HttpRequest, Method};

use crate::checks::Check;
use crate::endpoint::endpoint_path;
use crate::error::{Error, Result};

/// Inclusive range of whole seconds slept after each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThinkTime {
    pub min: u64,
    pub max: u64,
}

impl ThinkTime {
    pub const NONE: ThinkTime = ThinkTime { min: 0, max: 0 };

    pub const fn fixed(secs: u64) -> Self {
        Self {
            min: secs,
            max: secs,
        }
    }

    pub const fn between(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(Error::InvalidThinkTime {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Uniform draw from `min..=max` seconds.
    pub fn sample(&self) -> Duration {
        if self.min >= self.max {
            return Duration::from_secs(self.min);
        }
        Duration::from_secs(rand::thread_rng().gen_range(self.min..=self.max))
    }
}

#[derive(Debug, Clone)]
pub struct RequestSpec {
    /// Label used in logs and the `step` of each result. Defaults to `METHOD /path`.
    pub name: Option<String>,
    pub method: Method,
    /// Absolute URL, or a path joined to the session base URL.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub checks: Vec<Check>,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            name: None,
            method,
            path: path.into(),
            headers: Vec::new(),
            json: None,
            checks: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    #[must_use]
    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.method, endpoint_path(&self.path)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Request(RequestSpec),
    /// Requests issued concurrently; the step ends when all of them have finished.
    Batch {
        name: String,
        requests: Vec<RequestSpec>,
    },
}

impl Step {
    pub fn label(&self) -> String {
        match self {
            Step::Request(req) => req.label(),
            Step::Batch { name, .. } => name.clone(),
        }
    }
}

/// Ordered steps one virtual user runs per iteration.
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub base_url: String,
    pub steps: Vec<Step>,
    pub think_time: ThinkTime,
    /// Sent with every request unless the request sets the same header.
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Session {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            steps: Vec::new(),
            think_time: ThinkTime::NONE,
            headers: Vec::new(),
            timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Single destination search with the status and content-type checks, pacing 10s
    /// between iterations.
    pub fn destination_search(base_url: impl Into<String>) -> Self {
        let mut session = Self::new("destination-search", base_url)
            .with_header("Content-Type", "application/json");
        session.think_time = ThinkTime::fixed(10);
        session.steps.push(Step::Request(
            RequestSpec::get("/v1/search/destinations?location=Cancun")
                .named("search destinations")
                .with_check(Check::status("status is 200", 200))
                .with_check(Check::is_json("response is JSON")),
        ));
        session
    }

    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn with_think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Adds `Authorization: Bearer <token>` unless the session already sets one.
    #[must_use]
    pub fn with_bearer_token(self, token: &str) -> Self {
        if self
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("authorization"))
        {
            return self;
        }
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::EmptySession(self.name.clone()));
        }
        self.think_time.validate()?;

        let parsed =
            url::Url::parse(&self.base_url).map_err(|_| Error::InvalidBaseUrl(self.base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidBaseUrl(self.base_url.clone()));
        }

        for step in &self.steps {
            if let Step::Batch { name, requests } = step
                && requests.is_empty()
            {
                return Err(Error::EmptyBatch(name.clone()));
            }
        }
        Ok(())
    }

    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Builds the wire request: session headers, then request headers (which win), then
    /// the JSON body.
    pub fn build_request(&self, spec: &RequestSpec) -> std::result::Result<HttpRequest, serde_json::Error> {
        let mut req = HttpRequest::new(spec.method.clone(), self.resolve_url(&spec.path));

        for (k, v) in &self.headers {
            if !spec.headers.iter().any(|(rk, _)| rk.eq_ignore_ascii_case(k)) {
                req = req.with_header(k.clone(), v.clone());
            }
        }
        for (k, v) in &spec.headers {
            req = req.with_header(k.clone(), v.clone());
        }
        if let Some(json) = &spec.json {
            req = req.with_json(json)?;
        }
        if let Some(timeout) = spec.timeout.or(self.timeout) {
            req = req.with_timeout(timeout);
        }
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_time_sample_stays_in_range() {
        let tt = ThinkTime::between(1, 3);
        for _ in 0..200 {
            let s = tt.sample().as_secs();
            assert!((1..=3).contains(&s), "sample {s} out of range");
        }
        assert_eq!(ThinkTime::fixed(10).sample(), Duration::from_secs(10));
        assert_eq!(ThinkTime::NONE.sample(), Duration::ZERO);
        assert!(ThinkTime::between(5, 1).validate().is_err());
    }

    #[test]
    fn url_resolution_joins_paths() {
        let s = Session::new("s", "https://api.example.com/");
        assert_eq!(
            s.resolve_url("/v1/products"),
            "https://api.example.com/v1/products"
        );
        assert_eq!(s.resolve_url("v1/products"), "https://api.example.com/v1/products");
        assert_eq!(s.resolve_url("http://other/x"), "http://other/x");
    }

    #[test]
    fn build_request_applies_token_json_and_overrides() {
        let session = Session::new("s", "http://localhost:8080")
            .with_header("X-Client", "stampede")
            .with_bearer_token("abc");
        let spec = RequestSpec::new(Method::POST, "/v1/bookings")
            .with_header("x-client", "override")
            .with_json(serde_json::json!({"destination": "Cancun"}));

        let req = session
            .build_request(&spec)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(req.url, "http://localhost:8080/v1/bookings");
        assert!(
            req.headers
                .contains(&("Authorization".to_string(), "Bearer abc".to_string()))
        );
        assert!(
            req.headers
                .contains(&("x-client".to_string(), "override".to_string()))
        );
        assert!(!req.headers.iter().any(|(_, v)| v == "stampede"));
        assert!(
            req.headers
                .contains(&("content-type".to_string(), "application/json".to_string()))
        );
        assert_eq!(req.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn destination_search_sends_json_content_type_and_token() {
        let session = Session::destination_search("http://localhost:8080").with_bearer_token("abc");
        let Step::Request(spec) = &session.steps[0] else {
            panic!("expected a request step");
        };
        let req = session
            .build_request(spec)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            req.url,
            "http://localhost:8080/v1/search/destinations?location=Cancun"
        );
        assert_eq!(
            req.headers,
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), "Bearer abc".to_string()),
            ]
        );
        assert!(req.body.is_empty());
    }

    #[test]
    fn explicit_authorization_is_not_replaced_by_token() {
        let session = Session::new("s", "http://localhost")
            .with_header("authorization", "Basic xyz")
            .with_bearer_token("abc");
        assert_eq!(session.headers.len(), 1);
        assert_eq!(session.headers[0].1, "Basic xyz");
    }

    #[test]
    fn validate_rejects_bad_sessions() {
        let empty = Session::new("empty", "http://localhost");
        assert!(matches!(empty.validate(), Err(Error::EmptySession(_))));

        let bad_url = Session::destination_search("localhost:8080");
        assert!(matches!(bad_url.validate(), Err(Error::InvalidBaseUrl(_))));

        let empty_batch = Session::new("b", "http://localhost").with_step(Step::Batch {
            name: "nothing".to_string(),
            requests: Vec::new(),
        });
        assert!(matches!(empty_batch.validate(), Err(Error::EmptyBatch(_))));

        assert!(Session::destination_search("http://localhost").validate().is_ok());
    }
}
