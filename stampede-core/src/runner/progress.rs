use std::time::Duration;

use super::schedule::StageSnapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec over the last progress interval.
    pub rps_now: f64,
    /// Failed requests / requests over the last progress interval (0..=1).
    pub error_rate_now: f64,
    pub iterations_per_sec_now: f64,
    pub bytes_received_per_sec_now: u64,
    pub bytes_sent_per_sec_now: u64,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,

    /// Response time percentiles (ms) over the last interval, from an HDR histogram.
    pub latency_p50_ms_now: Option<f64>,
    pub latency_p95_ms_now: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(st: StageSnapshot) -> Self {
        Self {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioProgress {
    ConstantVus {
        vus: u64,
        duration: Option<Duration>,
    },
    RampingVus {
        total_duration: Duration,
        stage: Option<StageProgress>,
    },
    RampingArrivalRate {
        time_unit: Duration,
        total_duration: Duration,
        stage: Option<StageProgress>,
        active_vus: u64,
        max_vus: u64,
        dropped_iterations_total: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// 1-based tick counter.
    pub tick: u64,
    pub elapsed: Duration,
    pub scenario: String,
    pub metrics: LiveMetrics,
    pub progress: ScenarioProgress,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;
