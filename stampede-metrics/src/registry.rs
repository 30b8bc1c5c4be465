use ahash::{AHashMap, RandomState};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::error::{Error, Result};
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

#[derive(Debug, Default)]
struct Defs {
    by_name: AHashMap<KeyId, MetricId>,
    list: Vec<MetricDef>,
}

type SeriesMap = DashMap<TagSet, MetricStorage, RandomState>;

/// Metric series store for a single run.
///
/// A series is identified by `(metric name, normalized tags)`. Series are created lazily
/// on first use; concurrent first observations of the same series converge on one storage.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Defs>,
    storage: DashMap<MetricId, SeriesMap, RandomState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or look up) a metric. Registering an existing name with a different kind
    /// is an error.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let name_id = self.interner.get_or_intern(name);

        if let Some(id) = self.lookup(name_id, name, kind)? {
            return Ok(id);
        }

        let mut defs = self.defs.write();
        if let Some(&id) = defs.by_name.get(&name_id) {
            return check_kind(&defs.list[id.0 as usize], id, name, kind);
        }

        let id = MetricId(defs.list.len() as u32);
        defs.list.push(MetricDef {
            name: name_id,
            kind,
        });
        defs.by_name.insert(name_id, id);
        self.storage.insert(id, SeriesMap::default());
        Ok(id)
    }

    fn lookup(&self, name_id: KeyId, name: &str, kind: MetricKind) -> Result<Option<MetricId>> {
        let defs = self.defs.read();
        match defs.by_name.get(&name_id) {
            Some(&id) => check_kind(&defs.list[id.0 as usize], id, name, kind).map(Some),
            None => Ok(None),
        }
    }

    pub fn kind_of(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().list.get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::normalize(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let kind = self.kind_of(metric)?;
        let series_map = self.storage.get(&metric)?;

        if let Some(storage) = series_map.get(&tags) {
            return Some(storage.handle());
        }

        let storage = series_map
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    /// Register-and-fetch shortcut used on hot paths that build series names at runtime.
    pub fn handle(&self, name: &str, kind: MetricKind, tags: &[(&str, &str)]) -> Result<MetricHandle> {
        let metric = self.register(name, kind)?;
        let tags = self.resolve_tags(tags);
        self.get_handle(metric, tags)
            .ok_or_else(|| Error::UnknownMetric(name.to_string()))
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &MetricStorage)) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for series in series_map.iter() {
            f(series.key(), series.value());
        }
    }

    fn resolve_string(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Point-in-time view of every series, sorted by name then tags. Does not mutate
    /// any series, so repeated calls without new observations return equal results.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let defs: Vec<(MetricId, KeyId, MetricKind)> = {
            let defs = self.defs.read();
            defs.list
                .iter()
                .enumerate()
                .map(|(idx, d)| (MetricId(idx as u32), d.name, d.kind))
                .collect()
        };

        let mut out = Vec::new();
        for (id, name_id, kind) in defs {
            let name = self.resolve_string(name_id);
            self.visit_series(id, |tags, storage| {
                let mut tag_vec: Vec<(String, String)> = tags
                    .iter()
                    .map(|(k, v)| (self.resolve_string(k), self.resolve_string(v)))
                    .collect();
                tag_vec.sort();

                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind,
                    tags: tag_vec,
                    values: storage.value(),
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}

fn check_kind(def: &MetricDef, id: MetricId, name: &str, kind: MetricKind) -> Result<MetricId> {
    if def.kind != kind {
        return Err(Error::KindMismatch {
            name: name.to_string(),
            registered: def.kind,
            requested: kind,
        });
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricValue;
    use std::sync::Arc;

    #[test]
    fn register_is_idempotent_and_rejects_kind_changes() {
        let reg = Registry::new();
        let a = reg
            .register("response_time", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));
        let b = reg
            .register("response_time", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a, b);

        let err = reg.register("response_time", MetricKind::Counter);
        assert!(matches!(err, Err(Error::KindMismatch { .. })));
        assert!(matches!(
            reg.register("", MetricKind::Counter),
            Err(Error::EmptyName)
        ));
    }

    #[test]
    fn tag_order_does_not_create_new_series() {
        let reg = Registry::new();
        let h1 = reg
            .handle("http_reqs", MetricKind::Counter, &[("a", "1"), ("b", "2")])
            .unwrap_or_else(|e| panic!("{e}"));
        let h2 = reg
            .handle("http_reqs", MetricKind::Counter, &[("b", "2"), ("a", "1")])
            .unwrap_or_else(|e| panic!("{e}"));
        h1.increment(1);
        h2.increment(1);

        let summary = reg.summarize();
        assert_eq!(summary.len(), 1);
        assert!(matches!(summary[0].values, MetricValue::Counter(2)));
        assert_eq!(
            summary[0].tags,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn summarize_is_sorted_and_repeatable() {
        let reg = Registry::new();
        let t = reg
            .handle("b_trend", MetricKind::Trend, &[])
            .unwrap_or_else(|e| panic!("{e}"));
        let r = reg
            .handle("a_rate", MetricKind::Rate, &[])
            .unwrap_or_else(|e| panic!("{e}"));
        t.observe(10.0);
        r.add_bool(true);

        let first = reg.summarize();
        let second = reg.summarize();
        let names: Vec<&str> = first.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a_rate", "b_trend"]);
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.name, y.name);
            assert_eq!(format!("{:?}", x.values), format!("{:?}", y.values));
        }
    }

    #[test]
    fn concurrent_first_observations_share_one_series() {
        let reg = Arc::new(Registry::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let h = reg
                            .handle("endpoint_reqs_x", MetricKind::Counter, &[])
                            .unwrap_or_else(|e| panic!("{e}"));
                        h.increment(1);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap_or_else(|_| panic!("thread panicked"));
        }

        let summary = reg.summarize();
        assert_eq!(summary.len(), 1);
        assert!(matches!(summary[0].values, MetricValue::Counter(8_000)));
    }
}
