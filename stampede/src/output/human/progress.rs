use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One line per scenario on stderr: a bar when the scenario has a known length, a spinner
/// otherwise.
pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

struct Inner {
    multi: MultiProgress,
    lines: HashMap<String, ScenarioLine>,
}

struct ScenarioLine {
    bounded: bool,
    pb: ProgressBar,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));

        Self {
            inner: Mutex::new(Inner {
                multi,
                lines: HashMap::new(),
            }),
        }
    }

    pub(crate) fn update(
        &self,
        scenario: &str,
        total: Option<Duration>,
        elapsed: Duration,
        message: String,
    ) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = inner.line(scenario, total.is_some());
        pb.set_message(message);

        match total {
            Some(total) => {
                let total_ms = u64::try_from(total.as_millis()).unwrap_or(u64::MAX);
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                pb.set_length(total_ms);
                pb.set_position(elapsed_ms.min(total_ms));
            }
            None => pb.tick(),
        }
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (_, line) in inner.lines.drain() {
            line.pb.finish_and_clear();
        }
        inner.multi.clear().ok();
    }
}

impl Inner {
    fn line(&mut self, scenario: &str, bounded: bool) -> &ProgressBar {
        if self
            .lines
            .get(scenario)
            .is_some_and(|l| l.bounded != bounded)
            && let Some(old) = self.lines.remove(scenario)
        {
            old.pb.finish_and_clear();
        }

        let multi = &self.multi;
        let line = self
            .lines
            .entry(scenario.to_string())
            .or_insert_with(|| {
                let pb = if bounded {
                    let pb = multi.add(ProgressBar::new(0));
                    pb.set_style(bar_style());
                    pb
                } else {
                    let pb = multi.add(ProgressBar::new_spinner());
                    pb.set_style(spinner_style());
                    pb.enable_steady_tick(Duration::from_millis(120));
                    pb
                };
                pb.set_prefix(scenario.to_string());
                ScenarioLine { bounded, pb }
            });

        &line.pb
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [{bar:24.green/white}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
