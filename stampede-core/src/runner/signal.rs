use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot latch: `fire` once, every current and future waiter sees it.
#[derive(Debug, Default)]
struct Latch {
    fired: AtomicBool,
    notify: Notify,
}

impl Latch {
    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// Releases every VU at the same instant once the run clock starts.
#[derive(Debug, Default)]
pub struct StartSignal(Latch);

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.0.fire();
    }

    pub async fn wait(&self) {
        self.0.wait().await;
    }
}

/// Tells VUs to stop admitting iterations and to leave the current one after its step.
#[derive(Debug, Default)]
pub struct StopSignal(Latch);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.fire();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_fired()
    }

    /// Resolves once [`StopSignal::stop`] has been called.
    pub async fn cancelled(&self) {
        self.0.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn late_waiters_see_an_earlier_stop() {
        let stop = StopSignal::new();
        stop.stop();
        assert!(stop.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), stop.cancelled())
            .await
            .unwrap_or_else(|_| panic!("cancelled() did not resolve"));
    }

    #[tokio::test]
    async fn start_releases_all_waiters() {
        let start = Arc::new(StartSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let start = start.clone();
                tokio::spawn(async move { start.wait().await })
            })
            .collect();
        tokio::task::yield_now().await;
        start.start();
        for w in waiters {
            tokio::time::timeout(Duration::from_secs(1), w)
                .await
                .unwrap_or_else(|_| panic!("waiter stuck"))
                .unwrap_or_else(|e| panic!("{e}"));
        }
    }
}
