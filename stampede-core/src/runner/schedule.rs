use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Position inside the stage list at some elapsed time.
#[derive(Debug, Clone, Copy)]
struct Segment {
    index: usize,
    start: Duration,
    end: Duration,
    from: u64,
    to: u64,
}

impl Segment {
    fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Linear interpolation between `from` and `to`.
    fn value_at(&self, elapsed: Duration) -> u64 {
        let len = self.duration();
        if len.is_zero() {
            return self.to;
        }
        let from = i128::from(self.from);
        let delta = i128::from(self.to) - from;
        let num = elapsed.saturating_sub(self.start).as_nanos() as i128;
        let den = (len.as_nanos() as i128).max(1);
        (from + delta.saturating_mul(num) / den).clamp(0, i128::from(u64::MAX)) as u64
    }
}

/// Piecewise-linear target (VUs or arrival rate) over a list of stages, starting from
/// `start` at t=0.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start: u64,
    stages: Vec<Stage>,
    ends: Vec<Duration>,
}

impl RampSchedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let ends = stages
            .iter()
            .scan(Duration::ZERO, |acc, st| {
                *acc = acc.saturating_add(st.duration);
                Some(*acc)
            })
            .collect();
        Self { start, stages, ends }
    }

    pub fn total_duration(&self) -> Duration {
        self.ends.last().copied().unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn segment(&self, elapsed: Duration) -> Option<Segment> {
        if self.stages.is_empty() {
            return None;
        }
        let index = self
            .ends
            .partition_point(|end| *end < elapsed)
            .min(self.stages.len() - 1);
        let start = if index == 0 {
            Duration::ZERO
        } else {
            self.ends[index - 1]
        };
        let from = if index == 0 {
            self.start
        } else {
            self.stages[index - 1].target
        };
        Some(Segment {
            index,
            start,
            end: self.ends[index],
            from,
            to: self.stages[index].target,
        })
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        if elapsed.is_zero() {
            return self.start;
        }
        match self.segment(elapsed) {
            None => self.start,
            Some(seg) if elapsed >= seg.end => seg.to,
            Some(seg) => seg.value_at(elapsed),
        }
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        let clamped = elapsed.min(self.total_duration());
        let seg = self.segment(clamped)?;
        let stage_elapsed = clamped.saturating_sub(seg.start);

        Some(StageSnapshot {
            index: seg.index,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: seg.duration().saturating_sub(stage_elapsed),
            start_target: seg.from,
            end_target: seg.to,
            current_target: self.target_at(clamped),
        })
    }

    /// How long an idle VU (1-based `vu_index`) can sleep before the ramp might need it.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        const MAX_SLEEP: Duration = Duration::from_millis(50);

        let Some(seg) = self.segment(elapsed) else {
            return MAX_SLEEP;
        };
        if self.is_done(elapsed) {
            return Duration::ZERO;
        }
        if vu_index <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let until_stage_end = seg.end.saturating_sub(elapsed).min(MAX_SLEEP);
        if seg.to <= seg.from || vu_index > seg.to {
            return until_stage_end;
        }
        if vu_index <= seg.from {
            return Duration::ZERO;
        }

        // Solve from + (to - from) * t / len >= vu_index for t.
        let need = i128::from(vu_index - seg.from);
        let delta = i128::from(seg.to - seg.from);
        let len_ns = seg.duration().as_nanos() as i128;
        let at_ns = need.saturating_mul(len_ns) / delta;
        let wait_ns = (at_ns - elapsed.saturating_sub(seg.start).as_nanos() as i128).max(0);

        Duration::from_nanos(wait_ns.min(i128::from(u64::MAX)) as u64).min(MAX_SLEEP)
    }
}
