use std::collections::HashMap;
use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::MetricStorage;
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    Has(KeyId),
    Missing(KeyId),
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Has(k) => tags.get(k).is_some(),
            TagFilter::Missing(k) => tags.get(k).is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
}

impl CounterSnapshot {
    pub fn new(total: u64) -> Self {
        Self { total }
    }

    pub fn delta_since(self, prev: Option<Self>) -> u64 {
        match prev {
            Some(prev) => self.total.saturating_sub(prev.total),
            None => self.total,
        }
    }

    pub fn per_sec_since(self, prev: Option<Self>, dt_secs: f64) -> f64 {
        per_sec(self.delta_since(prev), dt_secs)
    }
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    delta as f64 / dt_secs.max(1e-9)
}

/// Filtered read over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: &str, value: &str) -> Self {
        let f = TagFilter::Eq(self.registry.resolve_key(key), self.registry.resolve_key(value));
        self.filters.push(f);
        self
    }

    #[must_use]
    pub fn where_has(mut self, key: &str) -> Self {
        let f = TagFilter::Has(self.registry.resolve_key(key));
        self.filters.push(f);
        self
    }

    #[must_use]
    pub fn where_missing(mut self, key: &str) -> Self {
        let f = TagFilter::Missing(self.registry.resolve_key(key));
        self.filters.push(f);
        self
    }

    #[must_use]
    pub fn group_by<'k>(mut self, keys: impl IntoIterator<Item = &'k str>) -> Self {
        self.group_keys = keys
            .into_iter()
            .map(|k| self.registry.resolve_key(k))
            .collect();
        self.group_keys.sort_unstable();
        self.group_keys.dedup();
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    pub fn sum_counter(self) -> HashMap<TagSet, u64> {
        let mut out: HashMap<TagSet, u64> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Counter(c) = storage else {
                return;
            };

            let v = c.load(Ordering::Relaxed);
            if v == 0 {
                return;
            }

            let k = tags.project(&self.group_keys);
            out.entry(k)
                .and_modify(|cur| *cur = cur.saturating_add(v))
                .or_insert(v);
        });

        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().values().copied().sum()
    }

    /// `(total, hits)` summed over matching rate series.
    pub fn sum_rate(self) -> (u64, u64) {
        let mut total = 0u64;
        let mut hits = 0u64;
        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            if let MetricStorage::Rate(r) = storage {
                let t = r.total.load(Ordering::Relaxed);
                total = total.saturating_add(t);
                hits = hits.saturating_add(r.hits.load(Ordering::Relaxed).min(t));
            }
        });
        (total, hits)
    }
}
