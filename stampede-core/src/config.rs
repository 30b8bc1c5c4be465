use std::time::Duration;

use crate::thresholds::ThresholdSet;

/// Default time in-flight iterations get to finish once their scenario has ended.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

pub(crate) fn total_stage_duration(stages: &[Stage]) -> Duration {
    stages
        .iter()
        .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration))
}

/// Scenario executor kind (the string form used in profile files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(to_string = "constant-vus", serialize = "constant")]
    ConstantVus,

    #[strum(to_string = "ramping-vus", serialize = "stages")]
    RampingVus,

    #[strum(to_string = "ramping-arrival-rate")]
    RampingArrivalRate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioExecutor {
    ConstantVus {
        vus: u64,
    },

    /// Ramp the number of active VUs up/down over time.
    RampingVus {
        start_vus: u64,
        stages: Vec<Stage>,
    },

    /// Open-model arrival rate (iterations started per `time_unit`), with ramping stages.
    RampingArrivalRate {
        start_rate: u64,
        time_unit: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
        stages: Vec<Stage>,
    },
}

impl ScenarioExecutor {
    pub fn kind(&self) -> ScenarioExecutorKind {
        match self {
            Self::ConstantVus { .. } => ScenarioExecutorKind::ConstantVus,
            Self::RampingVus { .. } => ScenarioExecutorKind::RampingVus,
            Self::RampingArrivalRate { .. } => ScenarioExecutorKind::RampingArrivalRate,
        }
    }

    /// Number of VU tasks the scenario needs at its peak.
    pub fn max_vus(&self) -> u64 {
        match self {
            Self::ConstantVus { vus } => *vus,
            Self::RampingVus { start_vus, stages } => stages
                .iter()
                .map(|st| st.target)
                .max()
                .unwrap_or(0)
                .max(*start_vus),
            Self::RampingArrivalRate { max_vus, .. } => *max_vus,
        }
    }
}

/// Raw scenario definition as written in a profile. Validated by
/// [`crate::scenarios_from_profile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOptions {
    pub name: String,

    /// Executor name. Defaults to `constant-vus`.
    pub executor: Option<String>,

    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,

    // Ramping VUs
    pub start_vus: Option<u64>,
    pub stages: Vec<Stage>,

    // Ramping arrival rate
    pub start_rate: Option<u64>,
    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,

    pub graceful_stop: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadShape {
    /// Fixed number of VUs for a fixed duration.
    Constant { vus: u64, duration: Duration },

    /// VU count ramps from 0 through each stage target.
    Staged { stages: Vec<Stage> },

    /// Named scenarios, run concurrently.
    Scenarios(Vec<ScenarioOptions>),
}

/// A named, immutable load test configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pub key: String,
    pub shape: LoadShape,
    /// Metric name -> predicates, in declaration order.
    pub thresholds: Vec<ThresholdSet>,
}

impl LoadProfile {
    pub fn new(key: impl Into<String>, shape: LoadShape) -> Self {
        Self {
            key: key.into(),
            shape,
            thresholds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold<I, S>(mut self, metric: &str, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.thresholds.push(ThresholdSet {
            metric: metric.to_string(),
            expressions: expressions.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// Run-level settings that apply to every scenario.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub graceful_stop: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }
}

/// A validated scenario ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub name: String,
    pub executor: ScenarioExecutor,
    pub iterations: Option<u64>,
    /// When the scenario stops admitting iterations. `None` means iteration-bounded only.
    pub duration: Option<Duration>,
    pub graceful_stop: Duration,
}
