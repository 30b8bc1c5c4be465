use smallvec::SmallVec;

use crate::key::KeyId;

/// Normalized tag set: pairs sorted by key, one value per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series usually carry at most a couple of tags.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    /// Build a tag set from pairs in any order. When a key repeats, the last value wins.
    pub fn normalize(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 4]> = SmallVec::new();
        for (k, v) in iter {
            match tags.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => tags.push((k, v)),
            }
        }
        tags.sort_unstable();
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let slice: &[(KeyId, KeyId)] = &self.tags;
        let idx = slice.partition_point(|(k, _)| *k < key);
        slice.get(idx).and_then(|(k, v)| (*k == key).then_some(*v))
    }

    pub fn project(&self, keys: &[KeyId]) -> TagSet {
        let mut out = SmallVec::<[(KeyId, KeyId); 4]>::new();
        for key in keys {
            if let Some(value) = self.get(*key) {
                out.push((*key, value));
            }
        }
        out.sort_unstable();
        TagSet { tags: out }
    }
}
