use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_bytes, format_duration, format_ms_opt, format_percent, format_rate};
use progress::HumanProgress;
use stampede_core::runner::{ProgressFn, ProgressUpdate, ScenarioProgress};
use stampede_core::{LoadProfile, LoadShape, RunReport, Session};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, profile: &LoadProfile, session: &Session) {
        println!("session: {} ({})", session.name, session.base_url);
        println!("profile: {} {}", profile.key, describe_shape(&profile.shape));
        for t in &profile.thresholds {
            println!("  threshold {}: {}", t.metric, t.expressions.join(", "));
        }
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u: ProgressUpdate| {
            let (total, message) = progress_message(&u);
            progress.update(&u.scenario, total, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", summary::render(report));

        let failed: Vec<_> = report.failed_thresholds().collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match t.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    None => eprintln!("  {}: {} (missing series)", t.metric, t.expression),
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn describe_shape(shape: &LoadShape) -> String {
    match shape {
        LoadShape::Constant { vus, duration } => {
            format!("constant {vus} VUs for {}", format_duration(*duration))
        }
        LoadShape::Staged { stages } => {
            let steps = stages
                .iter()
                .map(|st| format!("{}->{}", format_duration(st.duration), st.target))
                .collect::<Vec<_>>()
                .join(", ");
            format!("stages [{steps}]")
        }
        LoadShape::Scenarios(list) => {
            let names = list
                .iter()
                .map(|s| {
                    let executor = s.executor.as_deref().unwrap_or("constant-vus");
                    format!("{} ({executor})", s.name)
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("scenarios [{names}]")
        }
    }
}

fn progress_message(u: &ProgressUpdate) -> (Option<std::time::Duration>, String) {
    let m = &u.metrics;
    let rates = format!(
        " rps={} iters/s={} err={} p95={} recv={}/s reqs={}",
        format_rate(m.rps_now),
        format_rate(m.iterations_per_sec_now),
        format_percent(m.error_rate_now),
        format_ms_opt(m.latency_p95_ms_now),
        format_bytes(m.bytes_received_per_sec_now),
        m.requests_total
    );
    let elapsed = format_duration(u.elapsed);

    match &u.progress {
        ScenarioProgress::ConstantVus { vus, duration } => {
            (*duration, format!("vus={vus} elapsed={elapsed}{rates}"))
        }
        ScenarioProgress::RampingVus {
            total_duration,
            stage,
        } => {
            let msg = match stage {
                Some(st) => format!(
                    "stage={}/{} target={} elapsed={elapsed} stage_left={}{rates}",
                    st.stage,
                    st.stages,
                    st.current_target,
                    format_duration(st.stage_remaining)
                ),
                None => format!("elapsed={elapsed}{rates}"),
            };
            (Some(*total_duration), msg)
        }
        ScenarioProgress::RampingArrivalRate {
            total_duration,
            stage,
            active_vus,
            max_vus,
            dropped_iterations_total,
            ..
        } => {
            let mut msg = format!(
                "vus={active_vus}/{max_vus} dropped={dropped_iterations_total} elapsed={elapsed}{rates}"
            );
            if let Some(st) = stage {
                msg.push_str(&format!(
                    " stage={}/{} rate={}",
                    st.stage, st.stages, st.current_target
                ));
            }
            (Some(*total_duration), msg)
        }
    }
}
