use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::error::{StateError, StateResult};
use crate::state::{
    CommitRecord, StateDelta, StateKey, StateSnapshot, StateStore, StateView, Version,
};

#[derive(Debug, Default)]
struct Inner {
    version: Version,
    view: StateView,
    history: Vec<CommitRecord>,
}

/// Transient, process-local implementation of [`StateStore`].
///
/// Commits build the next view from a copy of the current one and swap it in
/// under the write lock, so readers holding an older [`StateView`] are never
/// affected and a failed commit leaves nothing behind.
///
/// # Example
///
/// ```rust
/// use conclave_core::{InMemoryStateStore, StateDelta, StateKey, StateStore, Version};
///
/// let store = InMemoryStateStore::new();
/// let snapshot = store.snapshot().unwrap();
/// let delta = StateDelta::new().set(StateKey::new("topic").unwrap(), "rust");
///
/// let v1 = store.commit(snapshot.version, &delta).unwrap();
/// assert_eq!(v1, Version::new(1));
///
/// // The same base version can't be committed twice.
/// assert!(store.commit(snapshot.version, &delta).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStateStore {
    /// Create an empty store at [`Version::INITIAL`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `entries` at [`Version::INITIAL`].
    ///
    /// Seeding is not a commit: the history starts empty.
    pub fn with_initial(entries: BTreeMap<StateKey, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                version: Version::INITIAL,
                view: StateView::new(entries),
                history: Vec::new(),
            })),
        }
    }

    /// Build a seeded store from a JSON object.
    pub fn from_json(json: &str) -> StateResult<Self> {
        let raw: HashMap<String, Value> =
            serde_json::from_str(json).map_err(|e| StateError::Serialization {
                details: e.to_string(),
            })?;

        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            let key = StateKey::new(&key).map_err(|e| StateError::InvalidKey {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            entries.insert(key, value);
        }

        Ok(Self::with_initial(entries))
    }

    /// Export the current view as a JSON object.
    pub fn export_json(&self) -> StateResult<String> {
        let snapshot = self.snapshot()?;
        serde_json::to_string(&snapshot.view).map_err(|e| StateError::Serialization {
            details: e.to_string(),
        })
    }
}

impl StateStore for InMemoryStateStore {
    fn snapshot(&self) -> StateResult<StateSnapshot> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StateError::lock_poisoned("snapshot", e))?;
        Ok(StateSnapshot {
            version: inner.version,
            view: inner.view.clone(),
        })
    }

    fn commit(&self, base_version: Version, delta: &StateDelta) -> StateResult<Version> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StateError::lock_poisoned("commit", e))?;

        if inner.version != base_version {
            return Err(StateError::VersionConflict {
                base: base_version,
                current: inner.version,
            });
        }

        let mut next = inner.view.to_map();
        delta.apply_to(&mut next);

        let version = base_version.next();
        inner.view = StateView::new(next);
        inner.version = version;
        inner.history.push(CommitRecord {
            base_version,
            version,
            delta: delta.clone(),
            committed_at: Utc::now(),
        });

        tracing::trace!(%version, ops = delta.len(), "state committed");
        Ok(version)
    }

    fn version(&self) -> StateResult<Version> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StateError::lock_poisoned("version", e))?;
        Ok(inner.version)
    }

    fn history(&self) -> StateResult<Vec<CommitRecord>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StateError::lock_poisoned("history", e))?;
        Ok(inner.history.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> StateKey {
        StateKey::new(k).unwrap()
    }

    #[test]
    fn stale_commit_is_rejected_without_side_effects() {
        let store = InMemoryStateStore::new();
        let base = store.snapshot().unwrap();

        store
            .commit(base.version, &StateDelta::new().set(key("winner"), "a"))
            .unwrap();

        let err = store
            .commit(base.version, &StateDelta::new().set(key("winner"), "b"))
            .unwrap_err();

        assert!(matches!(
            err,
            StateError::VersionConflict { base, current }
                if base == Version::INITIAL && current == Version::new(1)
        ));
        let after = store.snapshot().unwrap();
        assert_eq!(after.version, Version::new(1));
        assert_eq!(after.view.get_str("winner"), Some("a"));
    }

    #[test]
    fn older_views_are_unaffected_by_commits() {
        let store = InMemoryStateStore::new();
        let before = store.snapshot().unwrap();
        store
            .commit(before.version, &StateDelta::new().set(key("x"), 1))
            .unwrap();

        assert!(before.view.is_empty());
        assert_eq!(store.snapshot().unwrap().view.get("x"), Some(&json!(1)));
    }

    #[test]
    fn history_is_gapless() {
        let store = InMemoryStateStore::new();
        for i in 0..5 {
            let v = store.version().unwrap();
            store
                .commit(v, &StateDelta::new().set(key("counter"), i))
                .unwrap();
        }

        let history = store.history().unwrap();
        assert_eq!(history.len(), 5);
        for (i, record) in history.iter().enumerate() {
            assert_eq!(record.base_version.get(), i as u64);
            assert_eq!(record.version.get(), i as u64 + 1);
        }
    }

    #[test]
    fn json_round_trip() {
        let store = InMemoryStateStore::from_json(r#"{"topic": "rust", "round": 2}"#).unwrap();
        assert_eq!(store.version().unwrap(), Version::INITIAL);
        assert!(store.history().unwrap().is_empty());

        let exported: Value = serde_json::from_str(&store.export_json().unwrap()).unwrap();
        assert_eq!(exported, json!({"round": 2, "topic": "rust"}));
    }

    #[test]
    fn invalid_seed_key_is_reported() {
        let err = InMemoryStateStore::from_json(r#"{"bad key": 1}"#).unwrap_err();
        assert!(matches!(err, StateError::InvalidKey { .. }));
    }
}
