//! # TTL Cache
//!
//! A small mutex-guarded map whose entries expire a fixed time after
//! insertion. Expired entries are dropped lazily on read, swept every
//! [`PURGE_INTERVAL`] inserts, or explicitly with [`TtlCache::purge_expired`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One hour
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Inserts between sweeps of expired entries
pub const PURGE_INTERVAL: usize = 64;

#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
    inserts: AtomicUsize,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            inserts: AtomicUsize::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry, removing it if it has expired
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry, restarting its lifetime
    ///
    /// Every [`PURGE_INTERVAL`]th insert first drops expired entries, so keys
    /// that are never read again do not accumulate.
    pub fn insert(&self, key: K, value: V) {
        let count = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut entries) = self.entries.lock() {
            if count % PURGE_INTERVAL == 0 {
                let ttl = self.ttl;
                entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
            }
            entries.insert(key, (Instant::now(), value));
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
