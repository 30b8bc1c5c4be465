use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

/// Interned string id used for metric names and tag keys/values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct InternerState {
    ids: AHashMap<Arc<str>, KeyId>,
    strings: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub(crate) struct Interner {
    state: RwLock<InternerState>,
}

impl Interner {
    pub(crate) fn get(&self, s: &str) -> Option<KeyId> {
        self.state.read().ids.get(s).copied()
    }

    pub(crate) fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.get(s) {
            return id;
        }

        let mut state = self.state.write();
        // Another writer may have won between the read and write lock.
        if let Some(&id) = state.ids.get(s) {
            return id;
        }

        let id = KeyId(state.strings.len() as u32);
        let s: Arc<str> = Arc::from(s);
        state.strings.push(s.clone());
        state.ids.insert(s, id);
        id
    }

    pub(crate) fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.state.read().strings.get(id.0 as usize).cloned()
    }
}
