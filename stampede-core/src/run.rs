use std::sync::Arc;

use stampede_metrics::Registry;

use crate::aggregator::Aggregator;
use crate::config::{LoadProfile, RunConfig};
use crate::error::Result;
use crate::executor::SessionExecutor;
use crate::runner::{ProgressFn, StopSignal, run_scenarios, scenarios_from_profile};
use crate::session::Session;
use crate::summary::RunSummary;
use crate::thresholds::{ThresholdResult, evaluate_thresholds, thresholds_passed};
use crate::transport::Transport;

/// State owned by a single run. Created at run start and dropped with it.
#[derive(Debug)]
pub struct RunContext {
    aggregator: Arc<Aggregator>,
}

impl RunContext {
    pub fn new() -> Result<Self> {
        let aggregator = Arc::new(Aggregator::new(Arc::new(Registry::new()))?);
        Ok(Self { aggregator })
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }
}

#[derive(Default, Clone)]
pub struct RunOptions {
    pub config: RunConfig,
    /// Ends every scenario early when fired.
    pub stop: Option<Arc<StopSignal>>,
    pub progress: Option<ProgressFn>,
}

/// End-of-run report: the metric summary plus every threshold result.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub profile: String,
    pub summary: RunSummary,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

impl RunReport {
    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|r| !r.passed)
    }
}

/// Runs `session` under `profile` and judges the result against the profile's thresholds.
///
/// Profile and session are validated before any VU starts.
pub async fn run_profile(
    profile: &LoadProfile,
    session: Session,
    transport: Arc<dyn Transport>,
    opts: RunOptions,
) -> Result<RunReport> {
    session.validate()?;
    let scenarios = scenarios_from_profile(profile, &opts.config)?;

    let ctx = RunContext::new()?;
    let executor = Arc::new(SessionExecutor::new(
        Arc::new(session),
        transport,
        ctx.aggregator().clone(),
    ));
    let stop = opts.stop.unwrap_or_else(|| Arc::new(StopSignal::new()));

    tracing::info!(profile = %profile.key, "starting load profile");
    run_scenarios(scenarios, executor, stop, opts.progress).await?;

    let summary = ctx.aggregator().snapshot();
    let thresholds = evaluate_thresholds(&profile.thresholds, &summary)?;
    let passed = thresholds_passed(&thresholds);
    for failed in thresholds.iter().filter(|r| !r.passed) {
        tracing::warn!(
            metric = %failed.metric,
            expression = %failed.expression,
            observed = ?failed.observed,
            "threshold failed"
        );
    }

    Ok(RunReport {
        profile: profile.key.clone(),
        summary,
        thresholds,
        passed,
    })
}
