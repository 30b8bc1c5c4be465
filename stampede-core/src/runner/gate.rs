use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Admission control for constant-VU scenarios: a shared iteration budget and/or a deadline.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    /// Claims the next iteration. `false` once the budget is spent or the deadline passed.
    pub fn next(&self) -> bool {
        if self.duration.is_some() {
            let now = Instant::now();
            let deadline = *self.deadline.get_or_init(|| now + self.duration.unwrap_or_default());
            if now >= deadline {
                return false;
            }
        }

        match self.iterations {
            Some(total) => self.counter.fetch_add(1, Ordering::Relaxed) < total,
            // Neither iterations nor duration: run once.
            None if self.duration.is_none() => self.counter.fetch_add(1, Ordering::Relaxed) == 0,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_budget_is_shared() {
        let gate = IterationGate::new(Some(3), None);
        let admitted = (0..10).filter(|_| gate.next()).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn no_budget_and_no_duration_runs_once() {
        let gate = IterationGate::new(None, None);
        assert!(gate.next());
        assert!(!gate.next());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_closes_the_gate() {
        let gate = IterationGate::new(None, Some(Duration::from_secs(2)));
        gate.start_at(Instant::now());
        assert!(gate.next());
        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(gate.next());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!gate.next());
    }
}
