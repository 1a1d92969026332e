//! In-memory per-document state index.
//!
//! Maps `collection/document` to the hash and timestamp of the most
//! recent committed write. Replication reconciliation compares these
//! entries across peers instead of shipping whole documents; the index is
//! rebuilt from disk whenever a driver starts, so disk remains the single
//! ground truth.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Hash and timestamp of a document's last committed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Content hash of the payload bytes
    #[serde(rename = "Hash")]
    pub hash: String,

    /// Time of the last committed write
    #[serde(rename = "Timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Index of `collection/document` -> [`StateEntry`]
#[derive(Debug, Default)]
pub struct StateIndex {
    entries: Mutex<HashMap<String, StateEntry>>,
}

impl StateIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the state of a committed write
    pub fn set(&self, collection: &str, doc: &Document) {
        let entry = StateEntry {
            hash: doc.hash.clone(),
            updated_at: doc.updated_at,
        };
        let mut entries = self.entries.lock().expect("state index poisoned");
        entries.insert(state_key(collection, &doc.id), entry);
    }

    /// Drop the entry for a deleted document
    pub fn remove(&self, collection: &str, id: &str) {
        let mut entries = self.entries.lock().expect("state index poisoned");
        entries.remove(&state_key(collection, id));
    }

    /// Look up a single document's recorded state
    pub fn get(&self, collection: &str, id: &str) -> Option<StateEntry> {
        let entries = self.entries.lock().expect("state index poisoned");
        entries.get(&state_key(collection, id)).cloned()
    }

    /// Copy of the whole index, the `SYNC` reply body
    pub fn snapshot(&self) -> HashMap<String, StateEntry> {
        self.entries.lock().expect("state index poisoned").clone()
    }

    /// Entries updated strictly after `timestamp`, the `ONLINE` delta
    pub fn since(&self, timestamp: DateTime<Utc>) -> HashMap<String, StateEntry> {
        let entries = self.entries.lock().expect("state index poisoned");
        entries
            .iter()
            .filter(|(_, entry)| entry.updated_at > timestamp)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.entries.lock().expect("state index poisoned").len()
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the canonical `collection/document` state key
pub fn state_key(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}

/// Split a state key back into `(collection, document)`
pub fn split_state_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::marshal_tab_indent;
    use chrono::Duration;

    fn doc(id: &str, number: i64) -> Document {
        let bytes = marshal_tab_indent(&serde_json::json!({ "Number": number })).unwrap();
        let raw = serde_json::from_slice(&bytes).unwrap();
        Document::new("Test", id, raw)
    }

    #[test]
    fn test_set_and_get() {
        let index = StateIndex::new();
        let d = doc("d1", 1);
        index.set("Test", &d);

        let entry = index.get("Test", "d1").unwrap();
        assert_eq!(entry.hash, d.hash);
        assert_eq!(entry.updated_at, d.updated_at);
        assert!(index.get("Test", "d2").is_none());
    }

    #[test]
    fn test_rewrite_replaces_entry() {
        let index = StateIndex::new();
        index.set("Test", &doc("d1", 1));
        let second = doc("d1", 2);
        index.set("Test", &second);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("Test", "d1").unwrap().hash, second.hash);
    }

    #[test]
    fn test_remove() {
        let index = StateIndex::new();
        index.set("Test", &doc("d1", 1));
        index.remove("Test", "d1");
        assert!(index.get("Test", "d1").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_since_returns_strictly_newer() {
        let index = StateIndex::new();
        let old = doc("old", 1);
        let new = doc("new", 2);
        index.set("Test", &old);
        index.set("Test", &new);

        let cutoff = old.updated_at;
        let delta = index.since(cutoff);
        assert!(delta.contains_key("Test/new"));
        // Strictly-after comparison excludes the entry at the cutoff itself.
        assert!(!delta.contains_key("Test/old"));

        let all = index.since(cutoff - Duration::seconds(1));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_state_key_round_trip() {
        let key = state_key("Test", "d1");
        assert_eq!(split_state_key(&key), Some(("Test", "d1")));
    }
}
