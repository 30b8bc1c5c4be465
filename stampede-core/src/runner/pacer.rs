use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Token bucket for the arrival-rate executor. The pacer task schedules iterations, VUs
/// claim them. The backlog is capped at `max_vus`; anything beyond is dropped.
#[derive(Debug)]
pub struct ArrivalPacer {
    scheduled_total: AtomicU64,
    claimed_total: AtomicU64,
    dropped_total: AtomicU64,

    active_vus: AtomicU64,
    pre_allocated_vus: u64,
    max_vus: u64,

    done: AtomicBool,
    notify: Notify,
}

impl ArrivalPacer {
    pub fn new(pre_allocated_vus: u64, max_vus: u64) -> Self {
        Self {
            scheduled_total: AtomicU64::new(0),
            claimed_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            active_vus: AtomicU64::new(pre_allocated_vus),
            pre_allocated_vus,
            max_vus,
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn max_vus(&self) -> u64 {
        self.max_vus
    }

    fn backlog(&self) -> u64 {
        let claimed = self.claimed_total.load(Ordering::Relaxed);
        self.scheduled_total
            .load(Ordering::Relaxed)
            .saturating_sub(claimed)
    }

    pub fn update_due(&self, add_due: u64) {
        if add_due != 0 {
            let room = self.max_vus.max(1).saturating_sub(self.backlog());
            let to_add = add_due.min(room);
            let dropped = add_due - to_add;

            if to_add != 0 {
                self.scheduled_total.fetch_add(to_add, Ordering::Relaxed);
            }
            if dropped != 0 {
                self.dropped_total.fetch_add(dropped, Ordering::Relaxed);
            }
        }

        // Keep the pre-allocated VUs busy and bring in one extra VU per queued iteration.
        let backlog = self.backlog();
        let desired = if backlog == 0 {
            self.pre_allocated_vus
        } else {
            self.pre_allocated_vus.max(backlog.saturating_add(1))
        };
        self.active_vus
            .store(desired.clamp(1, self.max_vus.max(1)), Ordering::Relaxed);

        if add_due != 0 {
            self.notify.notify_waiters();
        }
    }

    /// `Some(true)` claimed, `Some(false)` done and drained, `None` nothing queued yet.
    fn try_claim(&self) -> Option<bool> {
        loop {
            let claimed = self.claimed_total.load(Ordering::Relaxed);
            let scheduled = self.scheduled_total.load(Ordering::Relaxed);

            if claimed >= scheduled {
                return self.is_done().then_some(false);
            }

            if self
                .claimed_total
                .compare_exchange_weak(claimed, claimed + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Some(true);
            }
        }
    }

    /// Waits for a scheduled iteration. `false` once the pacer is done and drained.
    pub async fn claim_next(&self) -> bool {
        loop {
            // Register for wakeups before checking, so an update between the check and
            // the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(claimed) = self.try_claim() {
                return claimed;
            }
            notified.await;
        }
    }

    pub async fn wait_for_update(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_done() {
            return;
        }
        notified.await;
    }
}
