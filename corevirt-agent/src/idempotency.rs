//! Task-id-keyed idempotency cache (spec §4.5): a retried request reuses
//! the originating Task id (spec §4.4), so replaying the cached result
//! instead of repeating the side effect collapses duplicate execution.
//! Lost on agent restart; the controller's reconciliation sweep re-queries
//! `*.describe` to converge in that case (Design Notes §9).

use std::num::NonZeroUsize;

use corevirt_proto::RpcError;
use lru::LruCache;
use tokio::sync::Mutex;

pub type CachedResult = Result<serde_json::Value, RpcError>;

pub struct IdempotencyCache {
    inner: Mutex<LruCache<String, CachedResult>>,
}

impl IdempotencyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    pub async fn get(&self, task_id: &str) -> Option<CachedResult> {
        self.inner.lock().await.get(task_id).cloned()
    }

    pub async fn put(&self, task_id: String, result: CachedResult) {
        self.inner.lock().await.put(task_id, result);
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corevirt_proto::ErrorCode;

    #[tokio::test]
    async fn replays_cached_result() {
        let cache = IdempotencyCache::new(8);
        cache.put("task-1".to_string(), Ok(serde_json::json!({"status": "running"}))).await;
        let replayed = cache.get("task-1").await.expect("cached");
        assert_eq!(replayed.unwrap()["status"], "running");
    }

    #[tokio::test]
    async fn caches_errors_too() {
        let cache = IdempotencyCache::new(8);
        cache.put("task-2".to_string(), Err(RpcError::new(ErrorCode::HypervisorError, "boom"))).await;
        let replayed = cache.get("task-2").await.expect("cached");
        assert_eq!(replayed.unwrap_err().code, ErrorCode::HypervisorError);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = IdempotencyCache::new(8);
        assert!(cache.get("unknown").await.is_none());
    }
}
