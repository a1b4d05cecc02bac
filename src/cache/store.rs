//! Concurrent in-memory cache store
//!
//! Maps request fingerprints to records under a single store-wide TTL. The
//! store is shared behind an `Arc` and needs no external locking: the map is
//! sharded and the TTL is kept in an atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{Record, RequestKey};

/// Thread-safe map from `RequestKey` to `Record`
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<RequestKey, Record>,
    /// Store-wide TTL in nanoseconds; zero disables expiry
    ttl_nanos: AtomicU64,
}

impl CacheStore {
    /// Creates an empty store with the given TTL
    pub fn new(ttl: Duration) -> Self {
        let store = Self::default();
        store.set_ttl(ttl);
        store
    }

    /// Current TTL; zero means entries never expire
    pub fn ttl(&self) -> Duration {
        Duration::from_nanos(self.ttl_nanos.load(Ordering::Relaxed))
    }

    /// Replaces the store-wide TTL
    ///
    /// TTLs beyond `u64::MAX` nanoseconds (~584 years) are clamped.
    pub fn set_ttl(&self, ttl: Duration) {
        let nanos = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);
        self.ttl_nanos.store(nanos, Ordering::Relaxed);
    }

    /// Looks up a record; a missing key is `None`, not an error
    pub fn get(&self, key: &RequestKey) -> Option<Record> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts or overwrites the record for `key`
    pub fn put(&self, key: RequestKey, record: Record) {
        self.entries.insert(key, record);
    }

    /// Visits every entry; order is unspecified
    ///
    /// The visitor must not write to the store.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&RequestKey, &Record),
    {
        for entry in self.entries.iter() {
            visit(entry.key(), entry.value());
        }
    }

    /// Returns a snapshot of all entries
    pub fn entries(&self) -> Vec<(RequestKey, Record)> {
        let mut entries = Vec::with_capacity(self.len());
        self.for_each(|key, record| entries.push((key.clone(), record.clone())));
        entries
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, keeping the TTL
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns whether `record` is fresh now under this store's TTL
    pub fn is_fresh(&self, record: &Record) -> bool {
        self.is_fresh_at(record, Utc::now())
    }

    /// Freshness of `record` at `now` under the current TTL
    pub fn is_fresh_at(&self, record: &Record, now: DateTime<Utc>) -> bool {
        record.is_fresh_at(self.ttl(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(path: &str) -> RequestKey {
        RequestKey::new("GET", format!("https://example.com{}", path), "hash")
    }

    fn record(response: &'static str) -> Record {
        Record::from_parts(Utc::now(), "request", response)
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let store = CacheStore::default();

        assert!(store.get(&key("/missing")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let store = CacheStore::default();
        let stored = record("first");

        store.put(key("/a"), stored.clone());

        assert_eq!(store.get(&key("/a")), Some(stored));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_overwrites_existing_entry() {
        let store = CacheStore::default();

        store.put(key("/a"), record("first"));
        store.put(key("/a"), record("second"));

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&key("/a")).unwrap().response_bytes(),
            &bytes::Bytes::from_static(b"second")
        );
    }

    #[test]
    fn test_for_each_visits_every_entry() {
        let store = CacheStore::default();
        store.put(key("/a"), record("a"));
        store.put(key("/b"), record("b"));
        store.put(key("/c"), record("c"));

        let mut urls = Vec::new();
        store.for_each(|key, _| urls.push(key.url().to_string()));
        urls.sort();

        assert_eq!(
            urls,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c"
            ]
        );
    }

    #[test]
    fn test_ttl_round_trips_and_defaults_to_zero() {
        let store = CacheStore::default();
        assert_eq!(store.ttl(), Duration::ZERO);

        store.set_ttl(Duration::from_millis(1500));
        assert_eq!(store.ttl(), Duration::from_millis(1500));

        let store = CacheStore::new(Duration::from_secs(30));
        assert_eq!(store.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let store = CacheStore::new(Duration::MAX);

        assert_eq!(store.ttl(), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_is_fresh_uses_store_ttl() {
        let store = CacheStore::new(Duration::from_secs(10));
        let now = Utc::now();
        let old = Record::from_parts(now - chrono::Duration::seconds(11), "", "");
        let recent = Record::from_parts(now - chrono::Duration::seconds(9), "", "");

        assert!(!store.is_fresh_at(&old, now));
        assert!(store.is_fresh_at(&recent, now));

        store.set_ttl(Duration::ZERO);
        assert!(store.is_fresh_at(&old, now));
    }

    #[test]
    fn test_clear_keeps_ttl() {
        let store = CacheStore::new(Duration::from_secs(5));
        store.put(key("/a"), record("a"));

        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.ttl(), Duration::from_secs(5));
    }

    #[test]
    fn test_concurrent_puts_and_gets() {
        let store = Arc::new(CacheStore::default());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        let entry_key = key(&format!("/{}/{}", worker, i));
                        store.put(entry_key.clone(), record("body"));
                        assert!(store.get(&entry_key).is_some());
                        let _ = store.get(&key("/shared"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Worker should not panic");
        }

        assert_eq!(store.len(), 800);
    }
}
