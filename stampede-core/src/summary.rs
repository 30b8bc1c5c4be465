use std::time::Duration;

use stampede_metrics::{MetricSeriesSummary, MetricValue, TrendSummary};

#[derive(Debug, Clone)]
pub struct EndpointSummary {
    /// Request path with query and fragment removed.
    pub endpoint: String,
    /// Escaped form used in `endpoint_*_<key>` series names.
    pub key: String,
    pub requests: u64,
    pub errors: u64,
    pub duration: TrendSummary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    pub name: String,
    pub requests: u64,
    pub failed_requests: u64,
    pub iterations: u64,
    pub iterations_interrupted: u64,
    pub success_rate: Option<f64>,
}

/// Read-only view of a run's metrics, produced by [`crate::Aggregator::snapshot`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub elapsed: Duration,
    /// Every series, sorted by name then tags.
    pub metrics: Vec<MetricSeriesSummary>,
    pub endpoints: Vec<EndpointSummary>,
    pub checks: Vec<CheckSummary>,
    pub scenarios: Vec<ScenarioSummary>,
}

impl RunSummary {
    /// The untagged series for `name`.
    pub fn metric(&self, name: &str) -> Option<&MetricSeriesSummary> {
        self.metrics
            .iter()
            .find(|m| m.name == name && m.tags.is_empty())
    }

    pub fn series(&self, name: &str, tags: &[(&str, &str)]) -> Option<&MetricSeriesSummary> {
        self.metrics.iter().find(|m| {
            m.name == name
                && m.tags.len() == tags.len()
                && tags.iter().all(|(k, v)| m.tag(k) == Some(*v))
        })
    }

    pub fn counter(&self, name: &str) -> u64 {
        match self.metric(name).map(|m| &m.values) {
            Some(MetricValue::Counter(v)) => *v,
            _ => 0,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        match self.metric(name).map(|m| &m.values) {
            Some(MetricValue::Rate { rate, .. }) => *rate,
            _ => None,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.metric(name).map(|m| &m.values) {
            Some(MetricValue::Trend(t)) => Some(t),
            _ => None,
        }
    }

    pub fn endpoint(&self, endpoint: &str) -> Option<&EndpointSummary> {
        self.endpoints.iter().find(|e| e.endpoint == endpoint)
    }
}
