//! # Cached Worker
//!
//! Memoizes another worker's successful payloads by (role, input). Errors
//! are never cached, so a retry after a transient failure reaches the inner
//! worker.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{Worker, WorkerError};
use crate::swarm::Payload;
use crate::tools::TtlCache;

pub struct CachedWorker {
    name: String,
    inner: Arc<dyn Worker>,
    cache: TtlCache<(String, String), Payload>,
}

impl CachedWorker {
    /// Wrap `inner` with the default one-hour TTL
    pub fn new(inner: Arc<dyn Worker>) -> Self {
        Self::with_ttl(inner, crate::tools::DEFAULT_TTL)
    }

    pub fn with_ttl(inner: Arc<dyn Worker>, ttl: Duration) -> Self {
        Self {
            name: format!("cached:{}", inner.name()),
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    /// Drop expired entries
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Cached payloads, including expired ones not yet swept
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl Worker for CachedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, role: &str, input: &str) -> Result<Payload, WorkerError> {
        let key = (role.to_string(), input.to_string());
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(worker = %self.name, "cache hit");
            return Ok(hit);
        }

        let payload = self.inner.run(role, input).await?;
        self.cache.insert(key, payload.clone());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::FnWorker;
    use crate::tools::ttl_cache::PURGE_INTERVAL;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(calls: Arc<AtomicU32>, fail_first: bool) -> Arc<dyn Worker> {
        Arc::new(FnWorker::new("geocoder", move |_: &str, input: &str| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if fail_first && n == 0 {
                return Err(WorkerError::new("rate limited"));
            }
            let mut payload = Payload::new();
            payload.insert("query".into(), json!(input));
            payload.insert("call".into(), json!(n));
            Ok(payload)
        }))
    }

    #[tokio::test]
    async fn test_repeated_input_hits_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let worker = CachedWorker::new(counting(calls.clone(), false));

        let first = worker.run("geo", "Austin").await.unwrap();
        let second = worker.run("geo", "Austin").await.unwrap();
        worker.run("geo", "Denver").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(worker.name(), "cached:geocoder");
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let worker = CachedWorker::new(counting(calls.clone(), true));

        assert!(worker.run("geo", "Austin").await.is_err());
        assert!(worker.run("geo", "Austin").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_call_through() {
        let calls = Arc::new(AtomicU32::new(0));
        let worker = CachedWorker::with_ttl(counting(calls.clone(), false), Duration::from_millis(10));

        worker.run("geo", "Austin").await.unwrap();
        std::thread::sleep(Duration::from_millis(30));
        worker.run("geo", "Austin").await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unread_inputs_do_not_accumulate() {
        let calls = Arc::new(AtomicU32::new(0));
        let worker = CachedWorker::with_ttl(counting(calls.clone(), false), Duration::from_millis(10));

        for i in 0..PURGE_INTERVAL - 1 {
            worker.run("geo", &format!("town {}", i)).await.unwrap();
        }
        std::thread::sleep(Duration::from_millis(30));
        worker.run("geo", "Austin").await.unwrap();

        assert_eq!(worker.cached_len(), 1);
    }
}
