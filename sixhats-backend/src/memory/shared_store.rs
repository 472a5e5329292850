//! Shared state store for passing results between agents
//!
//! Every agent publishes what it produced here and every other agent reads
//! it back from here; agents never look at each other's message history.
//!
//! Entries live in a two-level map: `namespace -> EntryKey -> value`. The
//! namespace is the writing agent's identity. An `EntryKey` is a logical topic
//! plus an optional [`Stamp`]. Stamped entries accumulate (one per round, one
//! per search, ...) and "latest" means the greatest stamp for that topic.
//!
//! ```ignore
//! let store = SharedStore::new();
//! store.record("White Hat", "result", json!("facts..."));
//! let (_, latest) = store.latest("White Hat", "result").unwrap();
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const COMPACT_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Last stamp handed out by [`Stamp::now`]
static LAST_STAMP: Lazy<Mutex<Option<Stamp>>> = Lazy::new(|| Mutex::new(None));

/// Ordering key for accumulated entries.
///
/// Compares by wall-clock time first, then by sequence number. `Stamp::now`
/// never goes backwards and never repeats, even when the clock does or when
/// two writers land in the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    at: DateTime<Utc>,
    seq: u64,
}

impl Stamp {
    pub fn now() -> Self {
        let mut last = LAST_STAMP.lock();
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if prev.at >= now => Stamp {
                at: prev.at,
                seq: prev.seq + 1,
            },
            Some(prev) => Stamp {
                at: now,
                seq: prev.seq + 1,
            },
            None => Stamp { at: now, seq: 0 },
        };
        *last = Some(stamp);
        stamp
    }

    pub fn new(at: DateTime<Utc>, seq: u64) -> Self {
        Self { at, seq }
    }

    /// Parse `YYYYmmdd_HHMMSS` with an optional `_<seq>` suffix
    pub fn parse_compact(s: &str) -> Option<Self> {
        let s = s.trim();
        let (time_part, seq) = match s.len() {
            15 => (s, 0),
            n if n > 16 && s.as_bytes()[15] == b'_' => (&s[..15], s[16..].parse().ok()?),
            _ => return None,
        };
        let naive = NaiveDateTime::parse_from_str(time_part, COMPACT_FORMAT).ok()?;
        Some(Self {
            at: Utc.from_utc_datetime(&naive),
            seq,
        })
    }

    /// Fixed-width rendering, sorts the same way the stamp compares
    /// within one process
    pub fn compact(&self) -> String {
        format!("{}_{:06}", self.at.format(COMPACT_FORMAT), self.seq)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact())
    }
}

/// Key of one entry inside a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub topic: String,
    pub stamp: Option<Stamp>,
}

impl EntryKey {
    pub fn plain(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            stamp: None,
        }
    }

    pub fn stamped(topic: impl Into<String>, stamp: Stamp) -> Self {
        Self {
            topic: topic.into(),
            stamp: Some(stamp),
        }
    }

    /// Flat `{namespace}_{topic}[_{stamp}]` form used for listings and logs
    pub fn display_in(&self, namespace: &str) -> String {
        match self.stamp {
            Some(stamp) => format!("{}_{}_{}", namespace, self.topic, stamp),
            None => format!("{}_{}", namespace, self.topic),
        }
    }
}

type Namespaces = HashMap<String, HashMap<EntryKey, Value>>;

/// Process-wide key/value store shared by all agents.
///
/// Cloning is cheap and clones share state. Each method takes the lock once,
/// so every single operation is atomic; there are no multi-key transactions.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<Namespaces>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an unstamped value. Last write wins.
    pub fn set(&self, namespace: &str, topic: &str, value: impl Into<Value>) {
        self.insert(namespace, EntryKey::plain(topic), value.into());
    }

    /// Add a value under a fresh stamp and return that stamp
    pub fn record(&self, namespace: &str, topic: &str, value: impl Into<Value>) -> Stamp {
        let stamp = Stamp::now();
        self.insert(namespace, EntryKey::stamped(topic, stamp), value.into());
        stamp
    }

    /// Add a value under a caller-chosen stamp
    pub fn record_at(&self, namespace: &str, topic: &str, stamp: Stamp, value: impl Into<Value>) {
        self.insert(namespace, EntryKey::stamped(topic, stamp), value.into());
    }

    fn insert(&self, namespace: &str, key: EntryKey, value: Value) {
        log::debug!("[STORE] Set '{}'", key.display_in(namespace));
        self.inner
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key, value);
    }

    /// Get an unstamped value, or `default` when absent
    pub fn get(&self, namespace: &str, topic: &str, default: Value) -> Value {
        self.get_entry(namespace, &EntryKey::plain(topic))
            .unwrap_or(default)
    }

    /// Get an unstamped value as text
    pub fn get_text(&self, namespace: &str, topic: &str, default: &str) -> String {
        self.get_entry(namespace, &EntryKey::plain(topic))
            .map(|v| value_to_text(&v))
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_entry(&self, namespace: &str, key: &EntryKey) -> Option<Value> {
        self.inner.read().get(namespace)?.get(key).cloned()
    }

    /// Remove an unstamped value
    pub fn delete(&self, namespace: &str, topic: &str) -> Option<Value> {
        self.delete_entry(namespace, &EntryKey::plain(topic))
    }

    pub fn delete_entry(&self, namespace: &str, key: &EntryKey) -> Option<Value> {
        let mut store = self.inner.write();
        let entries = store.get_mut(namespace)?;
        let removed = entries.remove(key);
        if entries.is_empty() {
            store.remove(namespace);
        }
        removed
    }

    /// All keys in flat `{namespace}_{topic}[_{stamp}]` form, sorted
    pub fn list_keys(&self) -> Vec<String> {
        let store = self.inner.read();
        let mut keys: Vec<String> = store
            .iter()
            .flat_map(|(ns, entries)| entries.keys().map(move |k| k.display_in(ns)))
            .collect();
        keys.sort();
        keys
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Most recent stamped entry for `topic` in `namespace`
    pub fn latest(&self, namespace: &str, topic: &str) -> Option<(Stamp, Value)> {
        let store = self.inner.read();
        store
            .get(namespace)?
            .iter()
            .filter(|(k, _)| k.topic == topic)
            .filter_map(|(k, v)| k.stamp.map(|s| (s, v)))
            .max_by_key(|(s, _)| *s)
            .map(|(s, v)| (s, v.clone()))
    }

    /// Up to `n` most recent stamped entries of a namespace, newest first,
    /// regardless of topic
    pub fn latest_in(&self, namespace: &str, n: usize) -> Vec<(EntryKey, Value)> {
        let store = self.inner.read();
        let Some(entries) = store.get(namespace) else {
            return Vec::new();
        };
        let mut stamped: Vec<(&EntryKey, &Value)> =
            entries.iter().filter(|(k, _)| k.stamp.is_some()).collect();
        stamped.sort_by(|a, b| b.0.stamp.cmp(&a.0.stamp));
        stamped
            .into_iter()
            .take(n)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().values().map(|entries| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything (explicit session reset)
    pub fn clear(&self) {
        log::info!("[STORE] Clearing all entries");
        self.inner.write().clear();
    }
}

/// Render a stored value as text; strings come back without JSON quoting
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
