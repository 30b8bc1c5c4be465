use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregator::{Aggregator, ScenarioTotals};
use crate::config::{
    LoadProfile, LoadShape, RunConfig, ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind,
    ScenarioOptions, total_stage_duration,
};
use crate::error::{Error, Result};
use crate::executor::SessionExecutor;
use crate::thresholds::validate_thresholds;

use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress};
use super::schedule::RampSchedule;
use super::signal::{StartSignal, StopSignal};
use super::vu::{VuContext, VuWork, run_vu};

pub const DEFAULT_SCENARIO: &str = "default";

const PACER_TICK: Duration = Duration::from_millis(10);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Turns a profile's load shape into validated scenarios. Thresholds are parsed here too,
/// so a bad profile fails before any VU starts.
pub fn scenarios_from_profile(profile: &LoadProfile, cfg: &RunConfig) -> Result<Vec<ScenarioConfig>> {
    validate_thresholds(&profile.thresholds)?;

    match &profile.shape {
        LoadShape::Constant { vus, duration } => {
            if *vus == 0 {
                return Err(Error::InvalidVus);
            }
            if duration.is_zero() {
                return Err(Error::InvalidDuration);
            }
            Ok(vec![ScenarioConfig {
                name: DEFAULT_SCENARIO.to_string(),
                executor: ScenarioExecutor::ConstantVus { vus: *vus },
                iterations: None,
                duration: Some(*duration),
                graceful_stop: cfg.graceful_stop,
            }])
        }
        LoadShape::Staged { stages } => {
            let opts = ScenarioOptions {
                name: DEFAULT_SCENARIO.to_string(),
                executor: Some(ScenarioExecutorKind::RampingVus.to_string()),
                stages: stages.clone(),
                ..ScenarioOptions::default()
            };
            Ok(vec![scenario_from_options(opts, cfg)?])
        }
        LoadShape::Scenarios(list) => {
            if list.is_empty() {
                return Err(Error::EmptyProfile(profile.key.clone()));
            }
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(list.len());
            for s in list {
                if !seen.insert(s.name.as_str()) {
                    return Err(Error::DuplicateScenario(s.name.clone()));
                }
                out.push(scenario_from_options(s.clone(), cfg)?);
            }
            Ok(out)
        }
    }
}

fn scenario_from_options(s: ScenarioOptions, cfg: &RunConfig) -> Result<ScenarioConfig> {
    let executor_name = s.executor.as_deref().unwrap_or("constant-vus");
    let executor_kind: ScenarioExecutorKind =
        executor_name.parse().map_err(|_| Error::InvalidExecutor)?;
    let graceful_stop = s.graceful_stop.unwrap_or(cfg.graceful_stop);

    match executor_kind {
        ScenarioExecutorKind::ConstantVus => {
            let vus = s.vus.unwrap_or(1);
            if vus == 0 {
                return Err(Error::InvalidVus);
            }
            if s.iterations == Some(0) {
                return Err(Error::InvalidIterations);
            }
            if s.duration.is_some_and(|d| d.is_zero()) {
                return Err(Error::InvalidDuration);
            }
            // Without a duration the scenario is iteration-bounded; default to one pass.
            let iterations = s
                .iterations
                .or_else(|| if s.duration.is_some() { None } else { Some(1) });

            Ok(ScenarioConfig {
                name: s.name,
                executor: ScenarioExecutor::ConstantVus { vus },
                iterations,
                duration: s.duration,
                graceful_stop,
            })
        }
        ScenarioExecutorKind::RampingVus => {
            if s.iterations.is_some() {
                return Err(Error::InvalidIterations);
            }
            if s.stages.is_empty() {
                return Err(Error::InvalidStages);
            }

            let start_vus = s.start_vus.unwrap_or(0);
            let max_stage = s.stages.iter().map(|st| st.target).max().unwrap_or(0);
            if max_stage.max(start_vus) == 0 {
                return Err(Error::InvalidVus);
            }

            let total_duration = total_stage_duration(&s.stages);
            if total_duration.is_zero() {
                return Err(Error::InvalidStages);
            }

            Ok(ScenarioConfig {
                name: s.name,
                executor: ScenarioExecutor::RampingVus {
                    start_vus,
                    stages: s.stages,
                },
                iterations: None,
                duration: Some(total_duration),
                graceful_stop,
            })
        }
        ScenarioExecutorKind::RampingArrivalRate => {
            if s.iterations.is_some() {
                return Err(Error::InvalidIterations);
            }
            if s.stages.is_empty() {
                return Err(Error::InvalidStages);
            }

            let start_rate = s.start_rate.unwrap_or(0);
            let time_unit = s.time_unit.unwrap_or(Duration::from_secs(1));
            if time_unit.is_zero() {
                return Err(Error::InvalidTimeUnit);
            }

            let pre_allocated_vus = s.pre_allocated_vus.unwrap_or(1);
            if pre_allocated_vus == 0 {
                return Err(Error::InvalidPreAllocatedVus);
            }

            let max_vus = s.max_vus.unwrap_or(pre_allocated_vus);
            if max_vus < pre_allocated_vus {
                return Err(Error::InvalidMaxVus);
            }

            let total_duration = total_stage_duration(&s.stages);
            if total_duration.is_zero() {
                return Err(Error::InvalidStages);
            }

            Ok(ScenarioConfig {
                name: s.name,
                executor: ScenarioExecutor::RampingArrivalRate {
                    start_rate,
                    time_unit,
                    pre_allocated_vus,
                    max_vus,
                    stages: s.stages,
                },
                iterations: None,
                duration: Some(total_duration),
                graceful_stop,
            })
        }
    }
}

#[derive(Clone)]
enum ProgressInfo {
    ConstantVus {
        vus: u64,
        duration: Option<Duration>,
    },
    RampingVus {
        schedule: Arc<RampSchedule>,
    },
    RampingArrivalRate {
        schedule: Arc<RampSchedule>,
        time_unit: Duration,
        pacer: Arc<ArrivalPacer>,
    },
}

impl ProgressInfo {
    fn at(&self, elapsed: Duration) -> ScenarioProgress {
        match self {
            Self::ConstantVus { vus, duration } => ScenarioProgress::ConstantVus {
                vus: *vus,
                duration: *duration,
            },
            Self::RampingVus { schedule } => ScenarioProgress::RampingVus {
                total_duration: schedule.total_duration(),
                stage: schedule.stage_snapshot_at(elapsed).map(Into::into),
            },
            Self::RampingArrivalRate {
                schedule,
                time_unit,
                pacer,
            } => ScenarioProgress::RampingArrivalRate {
                time_unit: *time_unit,
                total_duration: schedule.total_duration(),
                stage: schedule.stage_snapshot_at(elapsed).map(Into::into),
                active_vus: pacer.active_vus(),
                max_vus: pacer.max_vus(),
                dropped_iterations_total: pacer.dropped_total(),
            },
        }
    }
}

struct ScenarioRun {
    name: Arc<str>,
    duration: Option<Duration>,
    graceful_stop: Duration,
    stop: Arc<StopSignal>,
    gate: Option<Arc<IterationGate>>,
    pacer: Option<(Arc<ArrivalPacer>, Arc<RampSchedule>, Duration)>,
    progress: ProgressInfo,
    vus: JoinSet<()>,
}

/// Runs every scenario concurrently against the executor's session and returns once all
/// of them have finished. Results accumulate in the executor's aggregator.
///
/// `run_stop` ends every scenario early (e.g. on Ctrl-C); in-flight iterations still get
/// their graceful stop window.
pub async fn run_scenarios(
    scenarios: Vec<ScenarioConfig>,
    executor: Arc<SessionExecutor>,
    run_stop: Arc<StopSignal>,
    progress: Option<ProgressFn>,
) -> Result<()> {
    let aggregator = executor.aggregator().clone();

    let total_vus: u64 = scenarios.iter().map(|s| s.executor.max_vus()).sum();
    aggregator.set_vus_max(total_vus);

    let barrier_size = usize::try_from(total_vus).unwrap_or(usize::MAX);
    let ready_barrier = Arc::new(Barrier::new(barrier_size.saturating_add(1)));
    let start_signal = Arc::new(StartSignal::new());
    let run_started: Arc<OnceLock<Instant>> = Arc::new(OnceLock::new());

    let mut runs: Vec<ScenarioRun> = Vec::with_capacity(scenarios.len());
    let mut next_vu_id: u64 = 1;

    for scenario in scenarios {
        let name: Arc<str> = Arc::from(scenario.name.as_str());
        aggregator.register_scenario(&name);
        let stop = Arc::new(StopSignal::new());

        let mut gate = None;
        let mut pacer_task = None;
        let (work, progress_info) = match &scenario.executor {
            ScenarioExecutor::ConstantVus { vus } => {
                let g = Arc::new(IterationGate::new(scenario.iterations, scenario.duration));
                gate = Some(g.clone());
                (
                    VuWork::Constant { gate: g },
                    ProgressInfo::ConstantVus {
                        vus: *vus,
                        duration: scenario.duration,
                    },
                )
            }
            ScenarioExecutor::RampingVus { start_vus, stages } => {
                let schedule = Arc::new(RampSchedule::new(*start_vus, stages.clone()));
                (
                    VuWork::RampingVus {
                        schedule: schedule.clone(),
                    },
                    ProgressInfo::RampingVus { schedule },
                )
            }
            ScenarioExecutor::RampingArrivalRate {
                start_rate,
                time_unit,
                pre_allocated_vus,
                max_vus,
                stages,
            } => {
                let schedule = Arc::new(RampSchedule::new(*start_rate, stages.clone()));
                let pacer = Arc::new(ArrivalPacer::new(*pre_allocated_vus, *max_vus));
                pacer_task = Some((pacer.clone(), schedule.clone(), *time_unit));
                (
                    VuWork::RampingArrivalRate {
                        schedule: schedule.clone(),
                        time_unit: *time_unit,
                        pacer: pacer.clone(),
                    },
                    ProgressInfo::RampingArrivalRate {
                        schedule,
                        time_unit: *time_unit,
                        pacer,
                    },
                )
            }
        };

        let mut vus = JoinSet::new();
        for scenario_vu in 1..=scenario.executor.max_vus() {
            let ctx = VuContext {
                vu_id: next_vu_id,
                scenario: name.clone(),
                scenario_vu,
                executor: executor.clone(),
                work: work.clone(),
                stop: stop.clone(),
                run_started: run_started.clone(),
                ready_barrier: ready_barrier.clone(),
                start_signal: start_signal.clone(),
            };
            next_vu_id = next_vu_id.saturating_add(1);
            vus.spawn(run_vu(ctx));
        }

        runs.push(ScenarioRun {
            name,
            duration: scenario.duration,
            graceful_stop: scenario.graceful_stop,
            stop,
            gate,
            pacer: pacer_task,
            progress: progress_info,
            vus,
        });
    }

    // Every VU task is parked on the barrier before the clock starts.
    ready_barrier.wait().await;

    let started = Instant::now();
    let _ = run_started.set(started);
    aggregator.mark_started(started);
    for run in &runs {
        if let Some(gate) = &run.gate {
            gate.start_at(started);
        }
    }
    tracing::info!(scenarios = runs.len(), vus = total_vus, "run started");
    start_signal.start();

    let mut background = JoinSet::new();

    if let Some(progress) = progress {
        let scenarios: Vec<(Arc<str>, ProgressInfo)> = runs
            .iter()
            .map(|r| (r.name.clone(), r.progress.clone()))
            .collect();
        background.spawn(report_progress(
            progress,
            scenarios,
            aggregator.clone(),
            started,
        ));
    }

    // Pacers start after the VUs are released so no backlog builds up while they wait.
    for run in &runs {
        if let Some((pacer, schedule, time_unit)) = &run.pacer {
            background.spawn(drive_pacer(
                pacer.clone(),
                schedule.clone(),
                *time_unit,
                started,
                run.name.clone(),
                aggregator.clone(),
                run.stop.clone(),
            ));
        }
    }

    let mut supervisors = JoinSet::new();
    for run in runs {
        supervisors.spawn(supervise(run, started, run_stop.clone()));
    }
    while let Some(res) = supervisors.join_next().await {
        res?;
    }

    background.abort_all();
    while background.join_next().await.is_some() {}

    aggregator.mark_finished();
    tracing::info!(elapsed = ?aggregator.elapsed(), "run finished");
    Ok(())
}

async fn supervise(mut run: ScenarioRun, started: Instant, run_stop: Arc<StopSignal>) {
    let end = run.duration.map(|d| started + d);

    let finished_early = tokio::select! {
        () = drain(&mut run.vus) => true,
        () = sleep_until_opt(end) => false,
        () = run_stop.cancelled() => false,
    };
    run.stop.stop();
    if finished_early {
        tracing::debug!(scenario = %run.name, "scenario finished");
        return;
    }

    let graceful = tokio::select! {
        () = drain(&mut run.vus) => true,
        () = tokio::time::sleep(run.graceful_stop) => false,
    };
    if !graceful {
        tracing::warn!(
            scenario = %run.name,
            graceful_stop = ?run.graceful_stop,
            "graceful stop expired; interrupting in-flight iterations"
        );
        run.vus.abort_all();
        drain(&mut run.vus).await;
    }
    tracing::debug!(scenario = %run.name, "scenario finished");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn drain(vus: &mut JoinSet<()>) {
    while let Some(res) = vus.join_next().await {
        if let Err(err) = res
            && !err.is_cancelled()
        {
            tracing::error!(error = %err, "vu task failed");
        }
    }
}

async fn drive_pacer(
    pacer: Arc<ArrivalPacer>,
    schedule: Arc<RampSchedule>,
    time_unit: Duration,
    started: Instant,
    scenario: Arc<str>,
    aggregator: Arc<Aggregator>,
    stop: Arc<StopSignal>,
) {
    let mut interval = tokio::time::interval(PACER_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let total_duration = schedule.total_duration();
    let tick_s = PACER_TICK.as_secs_f64();
    let unit_s = time_unit.as_secs_f64().max(1e-9);
    let mut carry = 0.0f64;
    let mut last_dropped = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = stop.cancelled() => break,
        }

        let elapsed = started.elapsed();
        if elapsed >= total_duration {
            break;
        }

        carry += schedule.target_at(elapsed) as f64 * (tick_s / unit_s);
        let due = carry.floor() as u64;
        carry -= due as f64;
        pacer.update_due(due);

        let dropped = pacer.dropped_total();
        let delta = dropped.saturating_sub(last_dropped);
        if delta != 0 {
            aggregator.record_dropped(&scenario, delta);
            last_dropped = dropped;
        }
    }

    pacer.mark_done();
}

async fn report_progress(
    progress: ProgressFn,
    scenarios: Vec<(Arc<str>, ProgressInfo)>,
    aggregator: Arc<Aggregator>,
    started: Instant,
) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    let mut last: Vec<ScenarioTotals> = scenarios
        .iter()
        .map(|(name, _)| aggregator.scenario_totals(name))
        .collect();
    let mut last_at = Instant::now();
    let mut tick: u64 = 0;

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        let now = Instant::now();
        let dt = now.duration_since(last_at).as_secs_f64();
        last_at = now;
        let elapsed = started.elapsed();

        for ((name, info), prev) in scenarios.iter().zip(last.iter_mut()) {
            let totals = aggregator.scenario_totals(name);
            let d_requests = totals.requests.saturating_sub(prev.requests);
            let d_failed = totals.failed_requests.saturating_sub(prev.failed_requests);
            let d_iterations = totals.iterations.saturating_sub(prev.iterations);
            let d_received = totals.bytes_received.saturating_sub(prev.bytes_received);
            let d_sent = totals.bytes_sent.saturating_sub(prev.bytes_sent);
            *prev = totals;

            let (p50, p95) = aggregator.take_latency_window(name);
            let metrics = LiveMetrics {
                rps_now: stampede_metrics::per_sec(d_requests, dt),
                error_rate_now: if d_requests == 0 {
                    0.0
                } else {
                    d_failed as f64 / d_requests as f64
                },
                iterations_per_sec_now: stampede_metrics::per_sec(d_iterations, dt),
                bytes_received_per_sec_now: stampede_metrics::per_sec(d_received, dt).round()
                    as u64,
                bytes_sent_per_sec_now: stampede_metrics::per_sec(d_sent, dt).round() as u64,
                requests_total: totals.requests,
                failed_requests_total: totals.failed_requests,
                iterations_total: totals.iterations,
                latency_p50_ms_now: p50,
                latency_p95_ms_now: p95,
            };

            (progress)(ProgressUpdate {
                tick,
                elapsed,
                scenario: name.to_string(),
                metrics,
                progress: info.at(elapsed),
            });
        }
    }
}
