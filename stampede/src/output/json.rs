use std::io::Write as _;
use std::sync::Arc;

use serde::Serialize;
use stampede_core::runner::{ProgressFn, ProgressUpdate, ScenarioProgress};
use stampede_core::{LoadProfile, RunReport, Session};

use super::OutputFormatter;
use crate::report::ReportJson;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _profile: &LoadProfile, _session: &Session) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u: ProgressUpdate| {
            emit_json_line(&build_progress_line(&u));
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&JsonSummaryLine {
            kind: "summary",
            report: ReportJson::from_report(report),
        });
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub scenario: String,
    pub elapsed_secs: f64,

    pub vus: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_iterations_total: Option<u64>,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub error_rate: f64,
    pub bytes_received_per_sec: u64,
    pub bytes_sent_per_sec: u64,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,

    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    let (vus, max_vus, stage, dropped) = match &u.progress {
        ScenarioProgress::ConstantVus { vus, .. } => (*vus, Some(*vus), None, None),
        ScenarioProgress::RampingVus { stage, .. } => (
            stage.as_ref().map(|s| s.current_target).unwrap_or_default(),
            None,
            stage.as_ref().map(|s| s.stage),
            None,
        ),
        ScenarioProgress::RampingArrivalRate {
            stage,
            active_vus,
            max_vus,
            dropped_iterations_total,
            ..
        } => (
            *active_vus,
            Some(*max_vus),
            stage.as_ref().map(|s| s.stage),
            Some(*dropped_iterations_total),
        ),
    };

    let m = &u.metrics;
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        scenario: u.scenario.clone(),
        elapsed_secs: u.elapsed.as_secs_f64(),
        vus,
        max_vus,
        stage,
        dropped_iterations_total: dropped,
        requests_per_sec: m.rps_now,
        iterations_per_sec: m.iterations_per_sec_now,
        error_rate: m.error_rate_now,
        bytes_received_per_sec: m.bytes_received_per_sec_now,
        bytes_sent_per_sec: m.bytes_sent_per_sec_now,
        requests_total: m.requests_total,
        failed_requests_total: m.failed_requests_total,
        iterations_total: m.iterations_total,
        latency_p50_ms: m.latency_p50_ms_now,
        latency_p95_ms: m.latency_p95_ms_now,
    }
}

#[derive(Debug, Serialize)]
struct JsonSummaryLine {
    kind: &'static str,
    #[serde(flatten)]
    report: ReportJson,
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        writeln!(out).ok();
    }
}
