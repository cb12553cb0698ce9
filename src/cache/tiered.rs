//! Tiered L1+L2 composition (spec.md §4.5): a fast in-process L1 over a
//! slower persistent L2, with L2 writes dispatched to a worker pool so a
//! response never waits on the slow path.

use super::{CacheBackend, CacheEntry};
use crate::error::CacheError;
use std::sync::Arc;

/// Anything that can run a closure off the calling thread. The real
/// instance is the server's bounded worker pool (`server.rs`); tests use an
/// inline pool that just calls the closure synchronously.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), ()>;
}

pub struct TieredCache {
    l1: Arc<dyn CacheBackend>,
    l2: Arc<dyn CacheBackend>,
    pool: Option<Arc<dyn TaskSpawner>>,
}

impl TieredCache {
    pub fn new(l1: Arc<dyn CacheBackend>, l2: Arc<dyn CacheBackend>, pool: Option<Arc<dyn TaskSpawner>>) -> Self {
        Self { l1, l2, pool }
    }
}

impl CacheBackend for TieredCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        if let Some(entry) = self.l1.get(key)? {
            return Ok(Some(entry));
        }
        if let Some(entry) = self.l2.get(key)? {
            // Synchronous promotion into L1 (spec.md §4.5).
            self.l1.put(key, entry.clone())?;
            return Ok(Some(entry));
        }
        Ok(None)
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.l1.put(key, entry.clone())?;
        match &self.pool {
            Some(pool) => {
                let l2 = Arc::clone(&self.l2);
                let key = key.to_string();
                let job: Box<dyn FnOnce() + Send> = Box::new(move || {
                    let _ = l2.put(&key, entry);
                });
                if pool.spawn(job).is_err() {
                    // Spawn failed: drop the job rather than block the caller.
                }
                Ok(())
            }
            None => self.l2.put(key, entry),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let l1_hit = self.l1.delete(key)?;
        let l2_hit = self.l2.delete(key)?;
        Ok(l1_hit || l2_hit)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.l1.clear()?;
        self.l2.clear()
    }

    fn size(&self) -> usize {
        self.l1.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LruCache, NoopCache};

    struct InlineSpawner;
    impl TaskSpawner for InlineSpawner {
        fn spawn(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), ()> {
            job();
            Ok(())
        }
    }

    fn entry(n: usize) -> CacheEntry {
        CacheEntry::new(vec![0u8; n], "image/png")
    }

    #[test]
    fn get_promotes_l2_hit_into_l1() {
        let l1 = Arc::new(LruCache::new(1024));
        let l2 = Arc::new(LruCache::new(1024));
        l2.put("a", entry(10)).unwrap();
        let tiered = TieredCache::new(l1.clone(), l2, None);
        assert!(tiered.get("a").unwrap().is_some());
        assert!(l1.get("a").unwrap().is_some());
    }

    #[test]
    fn put_writes_l1_synchronously_and_l2_via_pool() {
        let l1 = Arc::new(LruCache::new(1024));
        let l2 = Arc::new(LruCache::new(1024));
        let pool: Arc<dyn TaskSpawner> = Arc::new(InlineSpawner);
        let tiered = TieredCache::new(l1.clone(), l2.clone(), Some(pool));
        tiered.put("a", entry(10)).unwrap();
        assert!(l1.get("a").unwrap().is_some());
        assert!(l2.get("a").unwrap().is_some());
    }

    #[test]
    fn put_falls_back_to_synchronous_l2_without_a_pool() {
        let l1 = Arc::new(LruCache::new(1024));
        let l2 = Arc::new(LruCache::new(1024));
        let tiered = TieredCache::new(l1, l2.clone(), None);
        tiered.put("a", entry(10)).unwrap();
        assert!(l2.get("a").unwrap().is_some());
    }

    #[test]
    fn delete_never_short_circuits() {
        let l1 = Arc::new(LruCache::new(1024));
        let l2 = Arc::new(NoopCache);
        l1.put("a", entry(10)).unwrap();
        let tiered = TieredCache::new(l1, l2, None);
        assert!(tiered.delete("a").unwrap());
    }

    #[test]
    fn size_reports_l1_only() {
        let l1 = Arc::new(LruCache::new(1024));
        let l2 = Arc::new(LruCache::new(1024));
        l1.put("a", entry(10)).unwrap();
        l2.put("b", entry(10)).unwrap();
        l2.put("c", entry(10)).unwrap();
        let tiered = TieredCache::new(l1, l2, None);
        assert_eq!(tiered.size(), 1);
    }
}
