use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Trend,
    Rate,
    Counter,
    Gauge,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

impl MetricSeriesSummary {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge {
        value: i64,
        peak: i64,
    },
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

/// Aggregates of a trend series. Percentiles use the nearest-rank method over every
/// recorded sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub med: Option<f64>,
    /// `percentiles[p - 1]` holds `p(p)` for `p` in `1..=100`. Empty when `count == 0`.
    percentiles: Vec<f64>,
}

impl TrendSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);

        let sum: f64 = sorted.iter().sum();
        let percentiles: Vec<f64> = (1..=100u8)
            .filter_map(|p| nearest_rank(&sorted, p))
            .collect();

        Self {
            count: sorted.len() as u64,
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            avg: Some(sum / sorted.len() as f64),
            med: nearest_rank(&sorted, 50),
            percentiles,
        }
    }

    pub fn percentile(&self, p: u8) -> Option<f64> {
        if p == 0 {
            return None;
        }
        self.percentiles.get(usize::from(p) - 1).copied()
    }
}

/// Nearest-rank percentile: the smallest sample such that at least `p`% of samples are
/// less than or equal to it.
pub fn nearest_rank(sorted: &[f64], p: u8) -> Option<f64> {
    let n = sorted.len() as u64;
    if n == 0 || p == 0 || p > 100 {
        return None;
    }
    let rank = (u64::from(p) * n).div_ceil(100).clamp(1, n);
    sorted.get((rank - 1) as usize).copied()
}

#[derive(Debug, Default)]
pub struct Rate {
    pub total: AtomicU64,
    pub hits: AtomicU64,
}

#[derive(Debug, Default)]
pub struct Gauge {
    pub value: AtomicI64,
    pub peak: AtomicI64,
}

#[derive(Debug, Default)]
pub struct Trend {
    samples: Mutex<Vec<f64>>,
}

impl Trend {
    pub fn summarize(&self) -> TrendSummary {
        let samples = self.samples.lock();
        TrendSummary::from_samples(&samples)
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricStorage::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => MetricStorage::Gauge(Arc::new(Gauge::default())),
            MetricKind::Rate => MetricStorage::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => MetricStorage::Trend(Arc::new(Trend::default())),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            MetricStorage::Counter(a) => MetricHandle::Counter(a.clone()),
            MetricStorage::Gauge(a) => MetricHandle::Gauge(a.clone()),
            MetricStorage::Rate(a) => MetricHandle::Rate(a.clone()),
            MetricStorage::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            MetricStorage::Counter(c) => MetricValue::Counter(c.load(Ordering::Relaxed)),
            MetricStorage::Gauge(g) => MetricValue::Gauge {
                value: g.value.load(Ordering::Relaxed),
                peak: g.peak.load(Ordering::Relaxed),
            },
            MetricStorage::Rate(r) => {
                let total = r.total.load(Ordering::Relaxed);
                let hits = r.hits.load(Ordering::Relaxed).min(total);
                let rate = (total > 0).then(|| hits as f64 / total as f64);
                MetricValue::Rate { total, hits, rate }
            }
            MetricStorage::Trend(t) => MetricValue::Trend(t.summarize()),
        }
    }
}

/// Write handle for one series. Cloning is cheap and every update is atomic for the series.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<Gauge>),
    Rate(Arc<Rate>),
    Trend(Arc<Trend>),
}

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Rate(_) => MetricKind::Rate,
            MetricHandle::Trend(_) => MetricKind::Trend,
        }
    }

    #[inline]
    pub fn increment(&self, value: u64) {
        if let MetricHandle::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let MetricHandle::Gauge(g) = self {
            g.value.store(value, Ordering::Relaxed);
            g.peak.fetch_max(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_gauge(&self, delta: i64) {
        if let MetricHandle::Gauge(g) = self {
            let now = g.value.fetch_add(delta, Ordering::Relaxed).saturating_add(delta);
            g.peak.fetch_max(now, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_bool(&self, hit: bool) {
        if let MetricHandle::Rate(r) = self {
            // `total` first; readers clamp `hits` to `total`.
            r.total.fetch_add(1, Ordering::Relaxed);
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records a trend sample. Non-finite values are ignored.
    #[inline]
    pub fn observe(&self, value: f64) {
        if let MetricHandle::Trend(t) = self
            && value.is_finite()
        {
            t.samples.lock().push(value);
        }
    }

    pub fn get_counter(&self) -> u64 {
        match self {
            MetricHandle::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn get_gauge(&self) -> i64 {
        match self {
            MetricHandle::Gauge(g) => g.value.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// `(total, hits)`
    pub fn get_rate(&self) -> (u64, u64) {
        match self {
            MetricHandle::Rate(r) => (
                r.total.load(Ordering::Relaxed),
                r.hits.load(Ordering::Relaxed),
            ),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_matches_textbook_values() {
        let sorted = [100.0, 200.0, 300.0, 400.0, 500.0];
        assert_eq!(nearest_rank(&sorted, 95), Some(500.0));
        assert_eq!(nearest_rank(&sorted, 90), Some(500.0));
        assert_eq!(nearest_rank(&sorted, 50), Some(300.0));
        assert_eq!(nearest_rank(&sorted, 20), Some(100.0));
        assert_eq!(nearest_rank(&sorted, 1), Some(100.0));
        assert_eq!(nearest_rank(&sorted, 100), Some(500.0));
        assert_eq!(nearest_rank(&[], 50), None);
        assert_eq!(nearest_rank(&sorted, 0), None);
    }

    #[test]
    fn trend_summary_is_order_independent() {
        let s = TrendSummary::from_samples(&[500.0, 100.0, 400.0, 200.0, 300.0]);
        assert_eq!(s.count, 5);
        assert_eq!(s.min, Some(100.0));
        assert_eq!(s.max, Some(500.0));
        assert_eq!(s.avg, Some(300.0));
        assert_eq!(s.med, Some(300.0));
        assert_eq!(s.percentile(95), Some(500.0));
        assert_eq!(s.percentile(0), None);
        assert_eq!(s.percentile(101), None);
    }

    #[test]
    fn empty_trend_summary_has_no_stats() {
        let s = TrendSummary::from_samples(&[]);
        assert_eq!(s.count, 0);
        assert!(s.min.is_none());
        assert!(s.avg.is_none());
        assert!(s.percentile(50).is_none());
    }

    #[test]
    fn handles_update_their_storage() {
        let c = MetricStorage::new(MetricKind::Counter).handle();
        c.increment(2);
        c.increment(3);
        assert_eq!(c.get_counter(), 5);

        let g = MetricStorage::new(MetricKind::Gauge).handle();
        g.add_gauge(5);
        g.add_gauge(-3);
        g.set_gauge(1);
        assert_eq!(g.get_gauge(), 1);
        let MetricHandle::Gauge(inner) = &g else {
            panic!("expected gauge handle");
        };
        assert_eq!(inner.peak.load(Ordering::Relaxed), 5);

        let r = MetricStorage::new(MetricKind::Rate).handle();
        r.add_bool(true);
        r.add_bool(false);
        r.add_bool(true);
        assert_eq!(r.get_rate(), (3, 2));

        let t = MetricStorage::new(MetricKind::Trend).handle();
        t.observe(1.0);
        t.observe(f64::NAN);
        let MetricHandle::Trend(inner) = &t else {
            panic!("expected trend handle");
        };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn mismatched_updates_are_ignored() {
        let c = MetricStorage::new(MetricKind::Counter).handle();
        c.observe(10.0);
        c.add_bool(true);
        assert_eq!(c.get_counter(), 0);
        assert_eq!(c.kind(), MetricKind::Counter);
    }
}
