use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use stampede_http::{HttpRequest, HttpResponse, HttpTransportErrorKind, estimate_http_request_bytes};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::aggregator::{Aggregator, FailureKind, StepResult};
use crate::checks::{CheckReport, evaluate_checks};
use crate::endpoint::endpoint_path;
use crate::runner::StopSignal;
use crate::session::{RequestSpec, Session, Step};
use crate::transport::{Transport, TransportError};

const BODY_EXCERPT_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed,
    /// The stop signal fired between steps; the iteration counts as interrupted.
    Stopped,
}

/// Everything about a request that is known before it is sent.
struct Prepared<'a> {
    spec: &'a RequestSpec,
    label: String,
    endpoint: String,
    request_size: u64,
}

struct Sent {
    result: Result<HttpResponse, TransportError>,
    elapsed: Duration,
}

async fn send(transport: Arc<dyn Transport>, request: Result<HttpRequest, TransportError>) -> Sent {
    let started = Instant::now();
    let result = match request {
        Ok(req) => transport.send(req).await,
        Err(err) => Err(err),
    };
    Sent {
        result,
        elapsed: started.elapsed(),
    }
}

fn body_excerpt(body: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(&body[..body.len().min(BODY_EXCERPT_BYTES)])
}

/// Counts the iteration as interrupted unless it is disarmed. Dropping the iteration
/// future (grace period expired) also lands here.
struct InterruptGuard<'a> {
    aggregator: &'a Aggregator,
    scenario: &'a str,
    armed: bool,
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.aggregator.record_interrupted(self.scenario);
            tracing::debug!(scenario = self.scenario, "iteration interrupted");
        }
    }
}

/// Runs a session's steps for one virtual user and reports every call to the aggregator.
pub struct SessionExecutor {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    aggregator: Arc<Aggregator>,
}

impl SessionExecutor {
    pub fn new(
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        aggregator: Arc<Aggregator>,
    ) -> Self {
        Self {
            session,
            transport,
            aggregator,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub async fn run_iteration(&self, scenario: &Arc<str>, stop: &StopSignal) -> IterationOutcome {
        let started = Instant::now();
        let mut guard = InterruptGuard {
            aggregator: &self.aggregator,
            scenario: scenario.as_ref(),
            armed: true,
        };

        let last = self.session.steps.len().saturating_sub(1);
        for (idx, step) in self.session.steps.iter().enumerate() {
            match step {
                Step::Request(spec) => self.run_request(scenario, spec).await,
                Step::Batch { requests, .. } => self.run_batch(scenario, requests).await,
            }

            let is_last = idx == last;
            if stop.is_stopped() {
                if is_last {
                    break;
                }
                return IterationOutcome::Stopped;
            }

            let think = self.session.think_time.sample();
            if think.is_zero() {
                continue;
            }
            tokio::select! {
                () = tokio::time::sleep(think) => {}
                () = stop.cancelled() => {
                    if !is_last {
                        return IterationOutcome::Stopped;
                    }
                }
            }
        }

        guard.armed = false;
        self.aggregator
            .record_iteration(scenario, started.elapsed());
        IterationOutcome::Completed
    }

    fn prepare<'a>(&self, spec: &'a RequestSpec) -> (Prepared<'a>, Result<HttpRequest, TransportError>) {
        let request = self.session.build_request(spec).map_err(|err| {
            TransportError::new(HttpTransportErrorKind::RequestBuild, err.to_string())
        });
        let request_size = request
            .as_ref()
            .ok()
            .and_then(|req| estimate_http_request_bytes(req).ok())
            .unwrap_or(0);

        let prepared = Prepared {
            spec,
            label: spec.label(),
            endpoint: endpoint_path(&self.session.resolve_url(&spec.path)),
            request_size,
        };
        (prepared, request)
    }

    async fn run_request(&self, scenario: &Arc<str>, spec: &RequestSpec) {
        let (prepared, request) = self.prepare(spec);
        let sent = send(self.transport.clone(), request).await;
        self.complete(scenario, &prepared, sent);
    }

    /// Sends every request at once and records the results, in declaration order, after
    /// the last one finished.
    async fn run_batch(&self, scenario: &Arc<str>, specs: &[RequestSpec]) {
        let mut prepared = Vec::with_capacity(specs.len());
        let mut set = JoinSet::new();
        for (idx, spec) in specs.iter().enumerate() {
            let (p, request) = self.prepare(spec);
            prepared.push(p);
            let transport = self.transport.clone();
            set.spawn(async move { (idx, send(transport, request).await) });
        }

        let mut results: Vec<Option<Sent>> = specs.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, sent)) => results[idx] = Some(sent),
                Err(err) => tracing::error!(error = %err, "batch request task failed"),
            }
        }

        for (p, sent) in prepared.iter().zip(results) {
            let sent = sent.unwrap_or_else(|| Sent {
                result: Err(TransportError::new(
                    HttpTransportErrorKind::Request,
                    "request task did not complete",
                )),
                elapsed: Duration::ZERO,
            });
            self.complete(scenario, p, sent);
        }
    }

    fn complete(&self, scenario: &Arc<str>, p: &Prepared<'_>, sent: Sent) {
        let checks = &p.spec.checks;
        let step = match sent.result {
            Ok(res) => {
                let report = evaluate_checks(checks, &res);
                let is_success = if checks.is_empty() {
                    (1..400).contains(&res.status)
                } else {
                    report.all_passed()
                };
                let failure = match (is_success, checks.is_empty()) {
                    (true, _) => None,
                    (false, true) => Some(FailureKind::Status),
                    (false, false) => Some(FailureKind::CheckFailed),
                };

                if let Some(err) = &report.json_error {
                    self.aggregator.record_validation_error(scenario);
                    tracing::warn!(
                        scenario = %scenario,
                        step = %p.label,
                        status = res.status,
                        error = %err,
                        body = %body_excerpt(&res.body),
                        "response body is not valid JSON"
                    );
                }
                if !is_success {
                    let failed: Vec<&str> = report
                        .outcomes
                        .iter()
                        .filter(|o| !o.passed)
                        .map(|o| o.name.as_str())
                        .collect();
                    tracing::warn!(
                        scenario = %scenario,
                        step = %p.label,
                        status = res.status,
                        failed_checks = ?failed,
                        body = %body_excerpt(&res.body),
                        "request failed"
                    );
                }
                self.aggregator.record_checks(&report);

                StepResult {
                    scenario: scenario.clone(),
                    step: p.label.clone(),
                    method: p.spec.method.clone(),
                    endpoint: p.endpoint.clone(),
                    status: res.status,
                    duration: res.timings.duration,
                    connecting: res.timings.connecting,
                    waiting: res.timings.waiting,
                    body_size: res.body.len() as u64,
                    request_size: res.bytes_sent,
                    bytes_received: res.bytes_received,
                    is_success,
                    failure,
                    timestamp: SystemTime::now(),
                }
            }
            Err(err) => {
                tracing::warn!(
                    scenario = %scenario,
                    step = %p.label,
                    status = 0,
                    kind = %err.kind,
                    error = %err.message,
                    "request failed"
                );
                self.aggregator
                    .record_checks(&CheckReport::all_failed(checks));

                StepResult {
                    scenario: scenario.clone(),
                    step: p.label.clone(),
                    method: p.spec.method.clone(),
                    endpoint: p.endpoint.clone(),
                    status: 0,
                    duration: sent.elapsed,
                    connecting: Duration::ZERO,
                    waiting: Duration::ZERO,
                    body_size: 0,
                    request_size: p.request_size,
                    bytes_received: 0,
                    is_success: false,
                    failure: Some(FailureKind::Transport(err.kind)),
                    timestamp: SystemTime::now(),
                }
            }
        };

        self.aggregator.record(&step);
    }
}
