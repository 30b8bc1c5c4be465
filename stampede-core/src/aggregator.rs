use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use ahash::AHashMap;
use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use stampede_http::{HttpTransportErrorKind, Method};
use stampede_metrics::{
    MetricHandle, MetricId, MetricKind, MetricSeriesSummary, MetricValue, Registry, TagSet,
};
use tokio::time::Instant;

use crate::checks::CheckReport;
use crate::endpoint::{
    ENDPOINT_DURATION_PREFIX, ENDPOINT_ERRORS_PREFIX, ENDPOINT_REQS_PREFIX, decode_endpoint_key,
    endpoint_key,
};
use crate::error::{Error, Result};
use crate::summary::{CheckSummary, EndpointSummary, RunSummary, ScenarioSummary};

/// Names of the built-in series.
pub mod names {
    pub const RESPONSE_TIME: &str = "response_time";
    pub const HTTP_REQ_CONNECTING: &str = "http_req_connecting";
    pub const HTTP_REQ_WAITING: &str = "http_req_waiting";
    pub const SUCCESS_RATE: &str = "success_rate";
    pub const ERRORS: &str = "errors";
    pub const HTTP_REQS: &str = "http_reqs";
    pub const CLIENT_ERRORS: &str = "client_errors";
    pub const SERVER_ERRORS: &str = "server_errors";
    pub const CONNECTION_ERRORS: &str = "connection_errors";
    pub const DATA_SENT: &str = "data_sent";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const CHECKS: &str = "checks";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const VALIDATION_ERRORS: &str = "validation_errors";
    pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
    pub const ITERATIONS_INTERRUPTED: &str = "iterations_interrupted";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";

    pub const TAG_SCENARIO: &str = "scenario";
    pub const TAG_CHECK: &str = "check";
    pub const TAG_TRANSPORT_ERROR_KIND: &str = "transport_error_kind";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// At least one check failed.
    CheckFailed,
    /// The step had no checks and the status was not a success status.
    Status,
    /// No response at all (status is the `0` sentinel).
    Transport(HttpTransportErrorKind),
}

/// Outcome of one HTTP call. Consumed by [`Aggregator::record`] and dropped.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub scenario: Arc<str>,
    pub step: String,
    pub method: Method,
    /// Request path without query string.
    pub endpoint: String,
    /// `0` when the transport failed.
    pub status: u16,
    pub duration: Duration,
    /// Connection setup. Zero on a reused connection or when no response arrived.
    pub connecting: Duration,
    /// Time to first byte, excluding `connecting`.
    pub waiting: Duration,
    pub body_size: u64,
    /// Estimated wire bytes of the request.
    pub request_size: u64,
    /// Estimated wire bytes of the response.
    pub bytes_received: u64,
    pub is_success: bool,
    pub failure: Option<FailureKind>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    ClientError,
    ServerError,
    ConnectionError,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            0 => Self::ConnectionError,
            400..=499 => Self::ClientError,
            500.. => Self::ServerError,
            _ => Self::Ok,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MetricIds {
    response_time: MetricId,
    http_req_connecting: MetricId,
    http_req_waiting: MetricId,
    success_rate: MetricId,
    errors: MetricId,
    http_reqs: MetricId,
    client_errors: MetricId,
    server_errors: MetricId,
    connection_errors: MetricId,
    data_sent: MetricId,
    data_received: MetricId,
    checks: MetricId,
    iterations: MetricId,
    iteration_duration: MetricId,
    validation_errors: MetricId,
    dropped_iterations: MetricId,
    iterations_interrupted: MetricId,
    vus: MetricId,
    vus_max: MetricId,
}

impl MetricIds {
    fn register(registry: &Registry) -> Result<Self> {
        use self::names::*;
        Ok(Self {
            response_time: registry.register(RESPONSE_TIME, MetricKind::Trend)?,
            http_req_connecting: registry.register(HTTP_REQ_CONNECTING, MetricKind::Trend)?,
            http_req_waiting: registry.register(HTTP_REQ_WAITING, MetricKind::Trend)?,
            success_rate: registry.register(SUCCESS_RATE, MetricKind::Rate)?,
            errors: registry.register(ERRORS, MetricKind::Counter)?,
            http_reqs: registry.register(HTTP_REQS, MetricKind::Counter)?,
            client_errors: registry.register(CLIENT_ERRORS, MetricKind::Counter)?,
            server_errors: registry.register(SERVER_ERRORS, MetricKind::Counter)?,
            connection_errors: registry.register(CONNECTION_ERRORS, MetricKind::Counter)?,
            data_sent: registry.register(DATA_SENT, MetricKind::Counter)?,
            data_received: registry.register(DATA_RECEIVED, MetricKind::Counter)?,
            checks: registry.register(CHECKS, MetricKind::Rate)?,
            iterations: registry.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: registry.register(ITERATION_DURATION, MetricKind::Trend)?,
            validation_errors: registry.register(VALIDATION_ERRORS, MetricKind::Counter)?,
            dropped_iterations: registry.register(DROPPED_ITERATIONS, MetricKind::Counter)?,
            iterations_interrupted: registry
                .register(ITERATIONS_INTERRUPTED, MetricKind::Counter)?,
            vus: registry.register(VUS, MetricKind::Gauge)?,
            vus_max: registry.register(VUS_MAX, MetricKind::Gauge)?,
        })
    }
}

/// Handles for one tag set (untagged, or `scenario=<name>`).
#[derive(Debug)]
struct SeriesHandles {
    response_time: MetricHandle,
    http_req_connecting: MetricHandle,
    http_req_waiting: MetricHandle,
    success_rate: MetricHandle,
    errors: MetricHandle,
    http_reqs: MetricHandle,
    client_errors: MetricHandle,
    server_errors: MetricHandle,
    connection_errors: MetricHandle,
    data_sent: MetricHandle,
    data_received: MetricHandle,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    validation_errors: MetricHandle,
    dropped_iterations: MetricHandle,
    iterations_interrupted: MetricHandle,
    vus: MetricHandle,
}

impl SeriesHandles {
    fn new(registry: &Registry, ids: &MetricIds, tags: &[(&str, &str)]) -> Option<Self> {
        let tags = registry.resolve_tags(tags);
        let h = |id: MetricId| registry.get_handle(id, tags.clone());
        Some(Self {
            response_time: h(ids.response_time)?,
            http_req_connecting: h(ids.http_req_connecting)?,
            http_req_waiting: h(ids.http_req_waiting)?,
            success_rate: h(ids.success_rate)?,
            errors: h(ids.errors)?,
            http_reqs: h(ids.http_reqs)?,
            client_errors: h(ids.client_errors)?,
            server_errors: h(ids.server_errors)?,
            connection_errors: h(ids.connection_errors)?,
            data_sent: h(ids.data_sent)?,
            data_received: h(ids.data_received)?,
            iterations: h(ids.iterations)?,
            iteration_duration: h(ids.iteration_duration)?,
            validation_errors: h(ids.validation_errors)?,
            dropped_iterations: h(ids.dropped_iterations)?,
            iterations_interrupted: h(ids.iterations_interrupted)?,
            vus: h(ids.vus)?,
        })
    }

    fn record(&self, step: &StepResult, ms: f64) {
        self.response_time.observe(ms);
        if step.status != 0 {
            self.http_req_connecting.observe(duration_ms(step.connecting));
            self.http_req_waiting.observe(duration_ms(step.waiting));
        }
        self.success_rate.add_bool(step.is_success);
        self.http_reqs.increment(1);
        self.data_sent.increment(step.request_size);
        self.data_received.increment(step.bytes_received);
        if !step.is_success {
            self.errors.increment(1);
        }
        match StatusClass::of(step.status) {
            StatusClass::ClientError => self.client_errors.increment(1),
            StatusClass::ServerError => self.server_errors.increment(1),
            StatusClass::ConnectionError => self.connection_errors.increment(1),
            StatusClass::Ok => {}
        }
    }
}

fn new_latency_window() -> Histogram<u64> {
    // Up to 60s in microseconds, 3 significant figures.
    Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}

#[derive(Debug)]
struct ScenarioMetrics {
    series: SeriesHandles,
    /// Response times since the last progress tick. Approximate, progress only.
    window: Mutex<Histogram<u64>>,
}

#[derive(Debug)]
struct EndpointMetrics {
    reqs: MetricHandle,
    duration: MetricHandle,
    errors: OnceLock<MetricHandle>,
    key: String,
}

/// Running totals for one scenario, read by the progress reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScenarioTotals {
    pub requests: u64,
    pub failed_requests: u64,
    pub iterations: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Owns every metric series of a run and turns step results into metric updates.
#[derive(Debug)]
pub struct Aggregator {
    registry: Arc<Registry>,
    ids: MetricIds,
    global: SeriesHandles,
    vus_max: MetricHandle,
    scenarios: RwLock<AHashMap<Arc<str>, Arc<ScenarioMetrics>>>,
    endpoints: RwLock<AHashMap<String, Arc<EndpointMetrics>>>,
    started: OnceLock<Instant>,
    finished: OnceLock<Duration>,
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl Aggregator {
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let ids = MetricIds::register(&registry)?;
        let missing = || Error::Metrics(stampede_metrics::Error::UnknownMetric("builtin".into()));
        let global = SeriesHandles::new(&registry, &ids, &[]).ok_or_else(missing)?;
        let vus_max = registry
            .get_handle(ids.vus_max, TagSet::default())
            .ok_or_else(missing)?;
        // Present in every summary, even when nothing was checked.
        let _ = registry.get_handle(ids.checks, TagSet::default());

        Ok(Self {
            registry,
            ids,
            global,
            vus_max,
            scenarios: RwLock::new(AHashMap::new()),
            endpoints: RwLock::new(AHashMap::new()),
            started: OnceLock::new(),
            finished: OnceLock::new(),
        })
    }

    pub fn mark_started(&self, at: Instant) {
        let _ = self.started.set(at);
    }

    /// Freezes the run duration reported by [`Aggregator::snapshot`].
    pub fn mark_finished(&self) {
        let elapsed = self
            .started
            .get()
            .map(|s| s.elapsed())
            .unwrap_or_default();
        let _ = self.finished.set(elapsed);
    }

    pub fn elapsed(&self) -> Duration {
        if let Some(d) = self.finished.get() {
            return *d;
        }
        self.started.get().map(|s| s.elapsed()).unwrap_or_default()
    }

    fn scenario(&self, name: &str) -> Option<Arc<ScenarioMetrics>> {
        if let Some(s) = self.scenarios.read().get(name) {
            return Some(s.clone());
        }

        let mut scenarios = self.scenarios.write();
        if let Some(s) = scenarios.get(name) {
            return Some(s.clone());
        }
        let series = SeriesHandles::new(
            &self.registry,
            &self.ids,
            &[(names::TAG_SCENARIO, name)],
        )?;
        let metrics = Arc::new(ScenarioMetrics {
            series,
            window: Mutex::new(new_latency_window()),
        });
        scenarios.insert(Arc::from(name), metrics.clone());
        Some(metrics)
    }

    /// Creates the scenario's series up front so they show up even if it never runs.
    pub fn register_scenario(&self, name: &str) {
        let _ = self.scenario(name);
    }

    fn endpoint(&self, endpoint: &str) -> Option<Arc<EndpointMetrics>> {
        if let Some(e) = self.endpoints.read().get(endpoint) {
            return Some(e.clone());
        }

        let key = endpoint_key(endpoint);
        let reqs = self.endpoint_series(ENDPOINT_REQS_PREFIX, &key, MetricKind::Counter)?;
        let duration = self.endpoint_series(ENDPOINT_DURATION_PREFIX, &key, MetricKind::Trend)?;

        let mut endpoints = self.endpoints.write();
        let metrics = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(EndpointMetrics {
                    reqs,
                    duration,
                    errors: OnceLock::new(),
                    key,
                })
            })
            .clone();
        Some(metrics)
    }

    fn endpoint_series(&self, prefix: &str, key: &str, kind: MetricKind) -> Option<MetricHandle> {
        let name = format!("{prefix}{key}");
        match self.registry.handle(&name, kind, &[]) {
            Ok(h) => Some(h),
            Err(err) => {
                tracing::warn!(metric = %name, error = %err, "endpoint series unavailable");
                None
            }
        }
    }

    /// Applies one step result to the global, scenario and endpoint series.
    pub fn record(&self, step: &StepResult) {
        let ms = duration_ms(step.duration);

        self.global.record(step, ms);
        if let Some(s) = self.scenario(&step.scenario) {
            s.series.record(step, ms);
            let us = step.duration.as_micros().min(u128::from(u64::MAX)) as u64;
            s.window.lock().saturating_record(us.max(1));
        }

        if let Some(FailureKind::Transport(kind)) = step.failure {
            let kind = kind.to_string();
            if let Ok(h) = self.registry.handle(
                names::CONNECTION_ERRORS,
                MetricKind::Counter,
                &[(names::TAG_TRANSPORT_ERROR_KIND, &kind)],
            ) {
                h.increment(1);
            }
        }

        if let Some(ep) = self.endpoint(&step.endpoint) {
            ep.reqs.increment(1);
            ep.duration.observe(ms);
            if !step.is_success {
                let errors = match ep.errors.get() {
                    Some(h) => Some(h.clone()),
                    None => self
                        .endpoint_series(ENDPOINT_ERRORS_PREFIX, &ep.key, MetricKind::Counter)
                        .map(|h| ep.errors.get_or_init(|| h).clone()),
                };
                if let Some(errors) = errors {
                    errors.increment(1);
                }
            }
        }
    }

    /// Per-check pass/fail, untagged and tagged with the check name.
    pub fn record_checks(&self, report: &CheckReport) {
        let checks = self.registry.get_handle(self.ids.checks, TagSet::default());
        for outcome in &report.outcomes {
            if let Some(h) = &checks {
                h.add_bool(outcome.passed);
            }
            let tags = self.registry.resolve_tags(&[(names::TAG_CHECK, &outcome.name)]);
            if let Some(h) = self.registry.get_handle(self.ids.checks, tags) {
                h.add_bool(outcome.passed);
            }
        }
    }

    pub fn record_validation_error(&self, scenario: &str) {
        self.global.validation_errors.increment(1);
        if let Some(s) = self.scenario(scenario) {
            s.series.validation_errors.increment(1);
        }
    }

    pub fn record_iteration(&self, scenario: &str, duration: Duration) {
        let ms = duration_ms(duration);
        self.global.iterations.increment(1);
        self.global.iteration_duration.observe(ms);
        if let Some(s) = self.scenario(scenario) {
            s.series.iterations.increment(1);
            s.series.iteration_duration.observe(ms);
        }
    }

    pub fn record_interrupted(&self, scenario: &str) {
        self.global.iterations_interrupted.increment(1);
        if let Some(s) = self.scenario(scenario) {
            s.series.iterations_interrupted.increment(1);
        }
    }

    pub fn record_dropped(&self, scenario: &str, count: u64) {
        if count == 0 {
            return;
        }
        self.global.dropped_iterations.increment(count);
        if let Some(s) = self.scenario(scenario) {
            s.series.dropped_iterations.increment(count);
        }
    }

    pub fn set_vus_max(&self, vus: u64) {
        self.vus_max.set_gauge(i64::try_from(vus).unwrap_or(i64::MAX));
    }

    /// Counts a VU as active until the guard is dropped.
    pub fn enter_active_vu(&self, scenario: &str) -> ActiveVuGuard {
        let scenario = self.scenario(scenario);
        self.global.vus.add_gauge(1);
        if let Some(s) = &scenario {
            s.series.vus.add_gauge(1);
        }
        ActiveVuGuard {
            global: self.global.vus.clone(),
            scenario: scenario.map(|s| s.series.vus.clone()),
        }
    }

    pub fn scenario_totals(&self, scenario: &str) -> ScenarioTotals {
        let sum = |id: MetricId| {
            self.registry
                .query(id)
                .where_eq(names::TAG_SCENARIO, scenario)
                .sum_counter_total()
        };
        ScenarioTotals {
            requests: sum(self.ids.http_reqs),
            failed_requests: sum(self.ids.errors),
            iterations: sum(self.ids.iterations),
            bytes_received: sum(self.ids.data_received),
            bytes_sent: sum(self.ids.data_sent),
        }
    }

    /// `(p50, p95)` in milliseconds of the responses seen since the previous call.
    pub fn take_latency_window(&self, scenario: &str) -> (Option<f64>, Option<f64>) {
        let Some(s) = self.scenario(scenario) else {
            return (None, None);
        };
        let mut h = s.window.lock();
        #[allow(clippy::len_zero)]
        let out = if h.len() == 0 {
            (None, None)
        } else {
            (
                Some(h.value_at_quantile(0.50) as f64 / 1000.0),
                Some(h.value_at_quantile(0.95) as f64 / 1000.0),
            )
        };
        h.reset();
        out
    }

    /// Read-only view of every series. Calling it again without new observations yields
    /// the same values.
    pub fn snapshot(&self) -> RunSummary {
        let metrics = self.registry.summarize();
        let endpoints = endpoint_summaries(&metrics);
        let checks = check_summaries(&metrics);
        let scenarios = self.scenario_summaries();

        RunSummary {
            elapsed: self.elapsed(),
            metrics,
            endpoints,
            checks,
            scenarios,
        }
    }

    fn scenario_summaries(&self) -> Vec<ScenarioSummary> {
        let mut scenario_names: Vec<Arc<str>> = self.scenarios.read().keys().cloned().collect();
        scenario_names.sort();

        scenario_names
            .into_iter()
            .map(|name| {
                let totals = self.scenario_totals(&name);
                let (total, hits) = self
                    .registry
                    .query(self.ids.success_rate)
                    .where_eq(names::TAG_SCENARIO, &name)
                    .sum_rate();
                let iterations_interrupted = self
                    .registry
                    .query(self.ids.iterations_interrupted)
                    .where_eq(names::TAG_SCENARIO, &name)
                    .sum_counter_total();

                ScenarioSummary {
                    name: name.to_string(),
                    requests: totals.requests,
                    failed_requests: totals.failed_requests,
                    iterations: totals.iterations,
                    iterations_interrupted,
                    success_rate: (total > 0).then(|| hits as f64 / total as f64),
                }
            })
            .collect()
    }
}

pub struct ActiveVuGuard {
    global: MetricHandle,
    scenario: Option<MetricHandle>,
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.global.add_gauge(-1);
        if let Some(s) = &self.scenario {
            s.add_gauge(-1);
        }
    }
}

fn untagged<'a>(metrics: &'a [MetricSeriesSummary], name: &str) -> Option<&'a MetricValue> {
    metrics
        .iter()
        .find(|m| m.name == name && m.tags.is_empty())
        .map(|m| &m.values)
}

fn endpoint_summaries(metrics: &[MetricSeriesSummary]) -> Vec<EndpointSummary> {
    let mut out: Vec<EndpointSummary> = metrics
        .iter()
        .filter(|m| m.tags.is_empty())
        .filter_map(|m| {
            let key = m.name.strip_prefix(ENDPOINT_REQS_PREFIX)?;
            let endpoint = decode_endpoint_key(key)?;
            let MetricValue::Counter(requests) = m.values else {
                return None;
            };

            let errors = match untagged(metrics, &format!("{ENDPOINT_ERRORS_PREFIX}{key}")) {
                Some(MetricValue::Counter(v)) => *v,
                _ => 0,
            };
            let duration = match untagged(metrics, &format!("{ENDPOINT_DURATION_PREFIX}{key}")) {
                Some(MetricValue::Trend(t)) => t.clone(),
                _ => Default::default(),
            };

            Some(EndpointSummary {
                endpoint,
                key: key.to_string(),
                requests,
                errors,
                duration,
            })
        })
        .collect();
    out.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
    out
}

fn check_summaries(metrics: &[MetricSeriesSummary]) -> Vec<CheckSummary> {
    let mut out: Vec<CheckSummary> = metrics
        .iter()
        .filter(|m| m.name == names::CHECKS)
        .filter_map(|m| {
            let name = m.tag(names::TAG_CHECK)?;
            let MetricValue::Rate { total, hits, .. } = m.values else {
                return None;
            };
            Some(CheckSummary {
                name: name.to_string(),
                passes: hits,
                fails: total.saturating_sub(hits),
            })
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckOutcome;

    fn aggregator() -> Aggregator {
        Aggregator::new(Arc::new(Registry::new())).unwrap_or_else(|e| panic!("{e}"))
    }

    fn step(endpoint: &str, status: u16, ms: u64, is_success: bool) -> StepResult {
        let failure = match (is_success, status) {
            (true, _) => None,
            (false, 0) => Some(FailureKind::Transport(HttpTransportErrorKind::Connect)),
            (false, _) => Some(FailureKind::CheckFailed),
        };
        StepResult {
            scenario: Arc::from("default"),
            step: format!("GET {endpoint}"),
            method: Method::GET,
            endpoint: endpoint.to_string(),
            status,
            duration: Duration::from_millis(ms),
            connecting: Duration::ZERO,
            waiting: Duration::from_millis(ms),
            body_size: 10,
            request_size: 50,
            bytes_received: 120,
            is_success,
            failure,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn success_rate_is_exact_fraction() {
        let agg = aggregator();
        for i in 0..20 {
            agg.record(&step("/v1/search/destinations", 200, 10, i % 4 != 0));
        }

        let summary = agg.snapshot();
        assert_eq!(summary.rate(names::SUCCESS_RATE), Some(15.0 / 20.0));
        assert_eq!(summary.counter(names::ERRORS), 5);
        assert_eq!(summary.counter(names::HTTP_REQS), 20);
        assert_eq!(summary.counter(names::DATA_SENT), 20 * 50);
        assert_eq!(summary.counter(names::DATA_RECEIVED), 20 * 120);
    }

    #[test]
    fn response_time_percentiles_use_nearest_rank() {
        let agg = aggregator();
        for ms in [300, 100, 500, 200, 400] {
            agg.record(&step("/a", 200, ms, true));
        }
        let summary = agg.snapshot();
        let trend = summary
            .trend(names::RESPONSE_TIME)
            .unwrap_or_else(|| panic!("missing response_time"));
        assert_eq!(trend.percentile(95), Some(500.0));
        assert_eq!(trend.percentile(50), Some(300.0));
        assert_eq!(trend.percentile(90), Some(500.0));
        assert_eq!(trend.percentile(20), Some(100.0));
        assert_eq!(trend.med, Some(300.0));
    }

    #[test]
    fn phase_timings_skip_transport_failures() {
        let agg = aggregator();
        let mut fresh = step("/a", 200, 30, true);
        fresh.connecting = Duration::from_millis(4);
        fresh.waiting = Duration::from_millis(20);
        agg.record(&fresh);
        agg.record(&step("/a", 200, 10, true));
        agg.record(&step("/a", 0, 3_000, false));

        let summary = agg.snapshot();
        let connecting = summary
            .trend(names::HTTP_REQ_CONNECTING)
            .unwrap_or_else(|| panic!("missing http_req_connecting"));
        assert_eq!(connecting.count, 2);
        assert_eq!(connecting.max, Some(4.0));
        assert_eq!(connecting.min, Some(0.0));
        let waiting = summary
            .trend(names::HTTP_REQ_WAITING)
            .unwrap_or_else(|| panic!("missing http_req_waiting"));
        assert_eq!(waiting.count, 2);
        assert_eq!(waiting.max, Some(20.0));
        assert_eq!(
            summary
                .trend(names::RESPONSE_TIME)
                .map(|t| t.count),
            Some(3)
        );
    }

    #[test]
    fn statuses_are_classified() {
        let agg = aggregator();
        agg.record(&step("/a", 404, 5, false));
        agg.record(&step("/a", 503, 5, false));
        agg.record(&step("/a", 0, 5, false));
        agg.record(&step("/a", 200, 5, true));

        let summary = agg.snapshot();
        assert_eq!(summary.counter(names::CLIENT_ERRORS), 1);
        assert_eq!(summary.counter(names::SERVER_ERRORS), 1);
        assert_eq!(summary.counter(names::CONNECTION_ERRORS), 1);
        assert_eq!(summary.counter(names::ERRORS), 3);

        let by_kind = summary
            .series(names::CONNECTION_ERRORS, &[(names::TAG_TRANSPORT_ERROR_KIND, "connect")])
            .unwrap_or_else(|| panic!("missing tagged connection_errors"));
        assert!(matches!(by_kind.values, MetricValue::Counter(1)));
    }

    #[test]
    fn endpoints_strip_query_and_stay_distinct() {
        let agg = aggregator();
        agg.record(&step("/v1/search/destinations", 200, 10, true));
        agg.record(&step("/v1/search/destinations", 500, 30, false));
        agg.record(&step("/a-b", 200, 10, true));
        agg.record(&step("/a_b", 200, 10, true));

        let summary = agg.snapshot();
        let search = summary
            .endpoint("/v1/search/destinations")
            .unwrap_or_else(|| panic!("missing endpoint"));
        assert_eq!(search.requests, 2);
        assert_eq!(search.errors, 1);
        assert_eq!(search.duration.max, Some(30.0));
        assert_eq!(search.key, "_2Fv1_2Fsearch_2Fdestinations");

        assert_eq!(summary.endpoint("/a-b").map(|e| e.requests), Some(1));
        assert_eq!(summary.endpoint("/a_b").map(|e| e.requests), Some(1));
        assert!(summary.metric("endpoint_errors__2Fa_2Db").is_none());
    }

    #[test]
    fn snapshot_is_idempotent() {
        let agg = aggregator();
        agg.mark_started(Instant::now());
        agg.record(&step("/a", 200, 10, true));
        agg.record(&step("/a", 500, 20, false));
        agg.record_iteration("default", Duration::from_millis(40));
        agg.mark_finished();

        let a = agg.snapshot();
        let b = agg.snapshot();
        assert_eq!(a.elapsed, b.elapsed);
        assert_eq!(a.metrics.len(), b.metrics.len());
        for (x, y) in a.metrics.iter().zip(b.metrics.iter()) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.tags, y.tags);
            assert_eq!(format!("{:?}", x.values), format!("{:?}", y.values));
        }
        assert_eq!(a.scenarios, b.scenarios);
    }

    #[test]
    fn checks_and_scenarios_are_summarized() {
        let agg = aggregator();
        let report = |passed: bool| CheckReport {
            outcomes: vec![
                CheckOutcome {
                    name: "status is 200".to_string(),
                    passed,
                },
                CheckOutcome {
                    name: "response is JSON".to_string(),
                    passed: true,
                },
            ],
            json_error: None,
        };
        agg.record_checks(&report(true));
        agg.record_checks(&report(false));
        agg.record(&step("/a", 200, 10, true));
        agg.record(&step("/a", 500, 10, false));
        agg.record_iteration("default", Duration::from_millis(20));
        agg.record_interrupted("default");

        let summary = agg.snapshot();
        assert_eq!(
            summary.checks,
            vec![
                CheckSummary {
                    name: "response is JSON".to_string(),
                    passes: 2,
                    fails: 0
                },
                CheckSummary {
                    name: "status is 200".to_string(),
                    passes: 1,
                    fails: 1
                },
            ]
        );
        assert_eq!(summary.rate(names::CHECKS), Some(0.75));

        assert_eq!(
            summary.scenarios,
            vec![ScenarioSummary {
                name: "default".to_string(),
                requests: 2,
                failed_requests: 1,
                iterations: 1,
                iterations_interrupted: 1,
                success_rate: Some(0.5),
            }]
        );
    }

    #[test]
    fn active_vu_guard_tracks_current_and_peak() {
        let agg = aggregator();
        let a = agg.enter_active_vu("default");
        let b = agg.enter_active_vu("default");
        drop(a);
        let summary = agg.snapshot();
        assert!(matches!(
            summary.metric(names::VUS).map(|m| &m.values),
            Some(MetricValue::Gauge { value: 1, peak: 2 })
        ));
        drop(b);
    }

    #[test]
    fn latency_window_resets_after_take() {
        let agg = aggregator();
        agg.record(&step("/a", 200, 100, true));
        let (p50, p95) = agg.take_latency_window("default");
        let p50 = p50.unwrap_or_else(|| panic!("missing p50"));
        assert!((p50 - 100.0).abs() < 1.0);
        assert!(p95.is_some());
        assert_eq!(agg.take_latency_window("default"), (None, None));
    }
}
