//! Bounded in-memory read cache.
//!
//! Maps `collection/document` to a timestamped snapshot of the document.
//! Overflow evicts the entry with the earliest `cached_at`; a hit
//! refreshes `cached_at` (access-time promotion). Expired entries are
//! swept by the driver's purge task once per second rather than on
//! access. All mutations run under one cache lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{DEFAULT_CACHE_LIMIT, DEFAULT_CACHE_TIMEOUT_SECS};
use crate::document::Document;

/// Cache tuning knobs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an entry may stay cached without being read
    pub timeout: Duration,
    /// Maximum number of cached documents
    pub limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_CACHE_TIMEOUT_SECS),
            limit: DEFAULT_CACHE_LIMIT,
        }
    }
}

/// A cached document snapshot
#[derive(Debug, Clone)]
struct CachedDoc {
    cached_at: DateTime<Utc>,
    document: Document,
}

/// Bounded document cache
#[derive(Debug)]
pub struct Cache {
    documents: Mutex<HashMap<String, CachedDoc>>,
    timeout: chrono::Duration,
    limit: usize,
}

impl Cache {
    /// Create a cache with the given tuning
    pub fn new(config: CacheConfig) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            timeout: chrono::Duration::from_std(config.timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_CACHE_TIMEOUT_SECS as i64)),
            limit: config.limit,
        }
    }

    /// Insert a document, evicting the oldest entry on overflow.
    ///
    /// The stored copy always carries `from_cache = true`.
    pub fn put(&self, collection: &str, doc: &Document) {
        let key = cache_key(collection, &doc.id);
        let mut documents = self.documents.lock().expect("cache poisoned");

        if !documents.contains_key(&key) && documents.len() >= self.limit {
            if let Some(oldest) = documents
                .iter()
                .min_by_key(|(_, cached)| cached.cached_at)
                .map(|(k, _)| k.clone())
            {
                documents.remove(&oldest);
            }
        }

        let mut document = doc.clone();
        document.from_cache = true;
        documents.insert(
            key,
            CachedDoc {
                cached_at: Utc::now(),
                document,
            },
        );
    }

    /// Look up a document; a hit refreshes its `cached_at`
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        let key = cache_key(collection, id);
        let mut documents = self.documents.lock().expect("cache poisoned");

        let cached = documents.get_mut(&key)?;
        cached.cached_at = Utc::now();
        let mut document = cached.document.clone();
        document.from_cache = true;
        Some(document)
    }

    /// Drop a single entry
    pub fn delete(&self, collection: &str, id: &str) {
        let mut documents = self.documents.lock().expect("cache poisoned");
        documents.remove(&cache_key(collection, id));
    }

    /// Drop every entry older than the configured timeout.
    ///
    /// Called by the driver's purge task; holds the cache lock for the
    /// whole scan.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        let mut documents = self.documents.lock().expect("cache poisoned");
        documents.retain(|_, cached| cached.cached_at + self.timeout >= now);
    }

    /// Number of cached documents
    pub fn len(&self) -> usize {
        self.documents.lock().expect("cache poisoned").len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}
