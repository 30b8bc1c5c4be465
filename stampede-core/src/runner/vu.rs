use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Barrier;
use tokio::time::Instant;

use crate::executor::{IterationOutcome, SessionExecutor};

use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::schedule::RampSchedule;
use super::signal::{StartSignal, StopSignal};

#[derive(Clone)]
pub struct VuContext {
    pub vu_id: u64,
    pub scenario: Arc<str>,
    /// 1-based index within the scenario.
    pub scenario_vu: u64,
    pub executor: Arc<SessionExecutor>,
    pub work: VuWork,
    /// Scenario stop: no new iterations, leave the current one after its step.
    pub stop: Arc<StopSignal>,

    pub run_started: Arc<OnceLock<Instant>>,
    pub ready_barrier: Arc<Barrier>,
    pub start_signal: Arc<StartSignal>,
}

#[derive(Debug, Clone)]
pub enum VuWork {
    Constant {
        gate: Arc<IterationGate>,
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

impl VuContext {
    async fn run_one(&self) -> IterationOutcome {
        let _active = self
            .executor
            .aggregator()
            .enter_active_vu(&self.scenario);
        self.executor
            .run_iteration(&self.scenario, &self.stop)
            .await
    }
}

pub(crate) async fn run_vu(ctx: VuContext) {
    ctx.ready_barrier.wait().await;
    ctx.start_signal.wait().await;

    let started = ctx
        .run_started
        .get()
        .copied()
        .unwrap_or_else(Instant::now);
    tracing::trace!(vu = ctx.vu_id, scenario = %ctx.scenario, "vu started");

    match &ctx.work {
        VuWork::Constant { gate } => {
            while !ctx.stop.is_stopped() && gate.next() {
                if ctx.run_one().await == IterationOutcome::Stopped {
                    break;
                }
            }
        }
        VuWork::RampingVus { schedule } => loop {
            if ctx.stop.is_stopped() {
                break;
            }
            let elapsed = started.elapsed();
            if schedule.is_done(elapsed) {
                break;
            }

            if ctx.scenario_vu > schedule.target_at(elapsed) {
                let wait = schedule
                    .next_recheck_in(elapsed, ctx.scenario_vu)
                    .max(Duration::from_millis(1));
                tokio::select! {
                    () = tokio::time::sleep(wait) => continue,
                    () = ctx.stop.cancelled() => break,
                }
            }

            if ctx.run_one().await == IterationOutcome::Stopped {
                break;
            }
        },
        VuWork::RampingArrivalRate { pacer, .. } => loop {
            if ctx.stop.is_stopped() {
                break;
            }

            // Only the first `active_vus` VUs take work.
            if ctx.scenario_vu > pacer.active_vus() {
                if pacer.is_done() {
                    break;
                }
                tokio::select! {
                    () = pacer.wait_for_update() => continue,
                    () = ctx.stop.cancelled() => break,
                }
            }

            let claimed = tokio::select! {
                claimed = pacer.claim_next() => claimed,
                () = ctx.stop.cancelled() => false,
            };
            if !claimed {
                break;
            }
            if ctx.run_one().await == IterationOutcome::Stopped {
                break;
            }
        },
    }

    tracing::trace!(vu = ctx.vu_id, scenario = %ctx.scenario, "vu finished");
}
