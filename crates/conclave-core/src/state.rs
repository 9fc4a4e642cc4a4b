//! # Session state
//!
//! Versioned key-value state shared by every agent in a session. The state
//! is only ever mutated through [`StateStore::commit`], which applies a
//! [`StateDelta`] all-or-nothing against the version the writer last read
//! (optimistic concurrency). Each successful commit advances the version by
//! exactly one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::StateResult;
use crate::validation::{NameKind, ValidationError};

/// Validated state key.
///
/// Keys follow [`NameKind::StateKey`]: alphanumeric segments (with `_` and
/// `-`) joined by `.` or `:`, at most 128 bytes. Surrounding whitespace is
/// trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateKey(String);

impl StateKey {
    /// Maximum allowed length for state keys.
    pub const MAX_LENGTH: usize = NameKind::StateKey.max_length();

    /// Create a new validated state key.
    ///
    /// ```rust
    /// use conclave_core::StateKey;
    ///
    /// let key = StateKey::new("blog_title").unwrap();
    /// assert_eq!(key.as_str(), "blog_title");
    /// assert!(StateKey::new("not a key").is_err());
    /// ```
    pub fn new(key: &str) -> Result<Self, ValidationError> {
        NameKind::StateKey.validate(key).map(StateKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StateKey {
    type Error = ValidationError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        StateKey::new(&key)
    }
}

impl TryFrom<&str> for StateKey {
    type Error = ValidationError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        StateKey::new(key)
    }
}

impl From<StateKey> for String {
    fn from(key: StateKey) -> Self {
        key.0
    }
}

/// Monotonic state version. The initial state is version 0.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub const INITIAL: Version = Version(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The version produced by the next commit.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A single operation inside a [`StateDelta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StateOp {
    Set { key: StateKey, value: Value },
    Remove { key: StateKey },
}

impl StateOp {
    pub fn key(&self) -> &StateKey {
        match self {
            StateOp::Set { key, .. } | StateOp::Remove { key } => key,
        }
    }
}

/// An ordered batch of state operations applied atomically by a commit.
///
/// Later operations on the same key win, so `set(a, 1).set(a, 2)` leaves
/// `a = 2`. Removing a key that is absent is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta {
    ops: Vec<StateOp>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `Set` operation.
    pub fn set(mut self, key: StateKey, value: impl Into<Value>) -> Self {
        self.ops.push(StateOp::Set {
            key,
            value: value.into(),
        });
        self
    }

    /// Append a `Remove` operation.
    pub fn remove(mut self, key: StateKey) -> Self {
        self.ops.push(StateOp::Remove { key });
        self
    }

    /// Append all operations of `other` after this delta's own.
    pub fn merge(mut self, other: StateDelta) -> Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn ops(&self) -> &[StateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Keys touched by this delta, in operation order (may repeat).
    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.ops.iter().map(StateOp::key)
    }

    /// Apply every operation to `entries` in order.
    pub fn apply_to(&self, entries: &mut BTreeMap<StateKey, Value>) {
        for op in &self.ops {
            match op {
                StateOp::Set { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                StateOp::Remove { key } => {
                    entries.remove(key);
                }
            }
        }
    }
}

/// Read-only, cheaply clonable view of the state at one version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateView(Arc<BTreeMap<StateKey, Value>>);

impl StateView {
    pub fn new(entries: BTreeMap<StateKey, Value>) -> Self {
        Self(Arc::new(entries))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Convenience accessor for string values.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the entries out, e.g. to build the next version.
    pub fn to_map(&self) -> BTreeMap<StateKey, Value> {
        self.0.as_ref().clone()
    }
}

impl Serialize for StateView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

/// The state as of one version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub version: Version,
    pub view: StateView,
}

/// Audit record of one successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Version the writer read before proposing the delta.
    pub base_version: Version,
    /// Version produced by this commit (`base_version.next()`).
    pub version: Version,
    pub delta: StateDelta,
    pub committed_at: DateTime<Utc>,
}

/// Versioned store for session state.
///
/// Implementations must guarantee that no two commits succeed against the
/// same base version. A commit whose `base_version` is not the current
/// version fails with [`StateError::VersionConflict`](crate::error::StateError::VersionConflict)
/// and leaves the state untouched.
pub trait StateStore: Send + Sync {
    /// Current version and a read-only view of the state.
    fn snapshot(&self) -> StateResult<StateSnapshot>;

    /// Apply `delta` if `base_version` is still current, returning the new version.
    fn commit(&self, base_version: Version, delta: &StateDelta) -> StateResult<Version>;

    /// Current version without materializing a view.
    fn version(&self) -> StateResult<Version> {
        Ok(self.snapshot()?.version)
    }

    /// All commits applied so far, oldest first.
    fn history(&self) -> StateResult<Vec<CommitRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> StateKey {
        StateKey::new(k).unwrap()
    }

    #[test]
    fn later_ops_win() {
        let delta = StateDelta::new()
            .set(key("a"), 1)
            .set(key("b"), "x")
            .set(key("a"), 2)
            .remove(key("b"))
            .remove(key("missing"));

        let mut entries = BTreeMap::new();
        delta.apply_to(&mut entries);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("a"), Some(&json!(2)));
    }

    #[test]
    fn delta_serializes_as_tagged_ops() {
        let delta = StateDelta::new().set(key("topic"), "rust").remove(key("draft"));
        let encoded = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            encoded,
            json!([
                {"op": "set", "key": "topic", "value": "rust"},
                {"op": "remove", "key": "draft"}
            ])
        );
    }

    #[test]
    fn view_exposes_typed_accessors() {
        let mut entries = BTreeMap::new();
        entries.insert(key("title"), json!("Hello"));
        entries.insert(key("count"), json!(3));
        let view = StateView::new(entries);

        assert_eq!(view.get_str("title"), Some("Hello"));
        assert_eq!(view.get_str("count"), None);
        assert!(view.contains_key("count"));
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({"count": 3, "title": "Hello"})
        );
    }

    #[test]
    fn versions_advance_by_one() {
        assert_eq!(Version::INITIAL.next(), Version::new(1));
        assert_eq!(Version::new(41).next().get(), 42);
        assert_eq!(Version::new(7).to_string(), "v7");
    }
}
