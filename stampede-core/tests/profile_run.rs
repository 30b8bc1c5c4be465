use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stampede_core::{
    HttpRequest, HttpResponse, LoadProfile, LoadShape, MetricValue, ProfileRegistry, RequestSpec,
    RunConfig, RunOptions, Session, Step, ThinkTime, Transport, TransportError, names,
    run_profile, select,
};
use stampede_http::HttpTimings;

/// Answers every `fail_every`-th call with a 500, everything else with a JSON 200.
struct FlakyApi {
    fail_every: u64,
    delay: Duration,
    calls: AtomicU64,
}

impl FlakyApi {
    fn new(fail_every: u64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail_every,
            delay,
            calls: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl Transport for FlakyApi {
    async fn send(&self, _req: HttpRequest) -> Result<HttpResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        tokio::time::sleep(self.delay).await;

        let (status, body) = if n % self.fail_every == 0 {
            (500, r#"{"error":"upstream"}"#)
        } else {
            (200, r#"{"results":[]}"#)
        };
        Ok(HttpResponse {
            status,
            body: Bytes::from_static(body.as_bytes()),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            timings: HttpTimings {
                duration: self.delay,
                ..HttpTimings::default()
            },
            bytes_sent: 120,
            bytes_received: 200,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn stress_profile_against_flaky_api_meets_its_thresholds() {
    let registry = ProfileRegistry::builtin();
    let profile = select("stress", &registry).unwrap_or_else(|e| panic!("{e}"));
    let api = FlakyApi::new(20, Duration::from_millis(50));

    let report = run_profile(
        &profile,
        Session::destination_search("http://api.test").with_bearer_token("t0ken"),
        api.clone(),
        RunOptions::default(),
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    let summary = &report.summary;
    let requests = summary.counter(names::HTTP_REQS);
    assert_eq!(requests, api.calls.load(Ordering::Relaxed));
    assert!(requests > 100, "requests={requests}");

    let success_rate = summary
        .rate(names::SUCCESS_RATE)
        .unwrap_or_else(|| panic!("success_rate missing"));
    assert!(success_rate >= 0.90, "success_rate={success_rate}");
    assert_eq!(summary.counter(names::SERVER_ERRORS), requests / 20);
    assert_eq!(summary.counter(names::ERRORS), requests / 20);

    let rt = summary
        .trend(names::RESPONSE_TIME)
        .unwrap_or_else(|| panic!("response_time missing"));
    assert_eq!(rt.count, requests);
    let p95 = rt.percentile(95).unwrap_or_else(|| panic!("p(95) missing"));
    assert!((p95 - 50.0).abs() < 1.0, "p95={p95}");

    let rate_check = report
        .thresholds
        .iter()
        .find(|r| r.metric == names::SUCCESS_RATE)
        .unwrap_or_else(|| panic!("success_rate threshold missing"));
    assert_eq!(rate_check.expression, "rate>0.90");
    assert!(rate_check.passed);
    assert!(report.passed);

    match summary.metric(names::VUS_MAX).map(|m| &m.values) {
        Some(MetricValue::Gauge { value, .. }) => assert_eq!(*value, 100),
        other => panic!("unexpected vus_max: {other:?}"),
    }
    assert_eq!(summary.scenarios.len(), 1);
    assert_eq!(summary.scenarios[0].iterations_interrupted, 0);
    assert!(summary.endpoint("/v1/search/destinations").is_some());
}

#[tokio::test(start_paused = true)]
async fn failing_threshold_is_reported_with_observed_value() {
    let profile = LoadProfile::new(
        "strict",
        LoadShape::Constant {
            vus: 2,
            duration: Duration::from_secs(5),
        },
    )
    .with_threshold(names::SUCCESS_RATE, ["rate>0.99"])
    .with_threshold(names::HTTP_REQS, ["count>0"])
    .with_threshold("no_such_metric", ["count>0"]);

    let session = Session::new("s", "http://api.test")
        .with_think_time(ThinkTime::fixed(1))
        .with_step(Step::Request(RequestSpec::get("/v1/items")));

    let report = run_profile(
        &profile,
        session,
        FlakyApi::new(2, Duration::from_millis(10)),
        RunOptions::default(),
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    assert!(!report.passed);
    let failed: Vec<_> = report.failed_thresholds().map(|r| r.metric.as_str()).collect();
    assert_eq!(failed, vec![names::SUCCESS_RATE, "no_such_metric"]);

    let rate = &report.thresholds[0];
    let observed = rate.observed.unwrap_or_else(|| panic!("no observed rate"));
    assert!((observed - 0.5).abs() < 0.1, "observed={observed}");
    assert_eq!(report.thresholds[2].observed, None);
}

#[tokio::test(start_paused = true)]
async fn expired_grace_period_interrupts_in_flight_iterations() {
    let profile = LoadProfile::new(
        "short",
        LoadShape::Constant {
            vus: 3,
            duration: Duration::from_secs(1),
        },
    );
    let session = Session::new("s", "http://api.test")
        .with_step(Step::Request(RequestSpec::get("/v1/slow")));

    let report = run_profile(
        &profile,
        session,
        FlakyApi::new(1000, Duration::from_secs(10)),
        RunOptions {
            config: RunConfig {
                graceful_stop: Duration::from_secs(1),
            },
            ..RunOptions::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("{e}"));

    let summary = &report.summary;
    // The aborted step is never recorded.
    assert_eq!(summary.counter(names::HTTP_REQS), 0);
    assert_eq!(summary.counter(names::ITERATIONS), 0);
    assert_eq!(summary.counter(names::ITERATIONS_INTERRUPTED), 3);
    assert!(summary.elapsed >= Duration::from_secs(2));
    assert!(summary.elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn invalid_profile_fails_before_any_request() {
    let profile = LoadProfile::new(
        "broken",
        LoadShape::Constant {
            vus: 1,
            duration: Duration::from_secs(1),
        },
    )
    .with_threshold(names::RESPONSE_TIME, ["p(95)<<800"]);
    let api = FlakyApi::new(20, Duration::ZERO);

    let res = run_profile(
        &profile,
        Session::destination_search("http://api.test"),
        api.clone(),
        RunOptions::default(),
    )
    .await;

    assert!(matches!(res, Err(stampede_core::Error::InvalidThreshold { .. })));
    assert_eq!(api.calls.load(Ordering::Relaxed), 0);
}
