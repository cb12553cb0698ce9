//! The in-process LRU backend (spec.md §4.5). Grounded in the original
//! `SledCache`'s access-timestamp eviction (`sled_cache.rs`), reworked from
//! a persistent sled `Db` to an in-memory map guarded by a `RwLock`, and
//! from wall-clock timestamps to a monotonic access counter (cheaper, and
//! immune to clock skew between `put` and `get`).

use super::{CacheBackend, CacheEntry};
use crate::error::CacheError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

struct Slot {
    entry: CacheEntry,
    stamp: u64,
}

struct Inner {
    slots: HashMap<String, Slot>,
    current_size: usize,
}

/// Fixed byte-budget LRU cache. Every `get` counts as a use and therefore
/// takes the lock's exclusive side (it must bump the entry's access
/// stamp), so in practice this is a plain mutex with a reader-writer lock's
/// API; the original's lock type is kept for fidelity to the spec's stated
/// concurrency primitive.
pub struct LruCache {
    inner: RwLock<Inner>,
    counter: AtomicU64,
    budget: usize,
}

impl LruCache {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: RwLock::new(Inner { slots: HashMap::new(), current_size: 0 }),
            counter: AtomicU64::new(0),
            budget,
        }
    }

    fn next_stamp(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict the globally least-recently-used entry. Returns its freed size.
    fn evict_one(inner: &mut Inner) -> usize {
        let victim = inner
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.stamp)
            .map(|(k, _)| k.clone());
        match victim {
            Some(key) => {
                let slot = inner.slots.remove(&key).expect("victim key just observed");
                slot.entry.weight()
            }
            None => 0,
        }
    }
}

impl CacheBackend for LruCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let stamp = self.next_stamp();
        let mut inner = self.inner.write().expect("lru lock poisoned");
        match inner.slots.get_mut(key) {
            Some(slot) => {
                slot.stamp = stamp;
                Ok(Some(slot.entry.clone()))
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let new_size = entry.weight();
        if new_size > self.budget {
            // Silently not stored; caller observes this via a later miss.
            return Ok(());
        }
        let stamp = self.next_stamp();
        let mut inner = self.inner.write().expect("lru lock poisoned");

        if let Some(old) = inner.slots.remove(key) {
            inner.current_size -= old.entry.weight();
        }
        while inner.current_size + new_size > self.budget && !inner.slots.is_empty() {
            let freed = Self::evict_one(&mut inner);
            inner.current_size -= freed;
        }
        inner.current_size += new_size;
        inner.slots.insert(key.to_string(), Slot { entry, stamp });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.inner.write().expect("lru lock poisoned");
        match inner.slots.remove(key) {
            Some(slot) => {
                inner.current_size -= slot.entry.weight();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.write().expect("lru lock poisoned");
        inner.slots.clear();
        inner.current_size = 0;
        Ok(())
    }

    fn size(&self) -> usize {
        self.inner.read().expect("lru lock poisoned").slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: usize) -> CacheEntry {
        CacheEntry::new(vec![0u8; n], "image/png")
    }

    #[test]
    fn put_then_get_round_trips() {
        let c = LruCache::new(1024);
        c.put("a", entry(10)).unwrap();
        assert_eq!(c.get("a").unwrap().unwrap().weight(), 10 + "image/png".len());
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let c = LruCache::new(40);
        c.put("a", entry(10)).unwrap(); // weight 10 + 9 = 19
        c.put("b", entry(1)).unwrap(); // weight 1 + 9 = 10, total 29
        // touch "a" so "b" becomes the LRU entry
        c.get("a").unwrap();
        c.put("c", entry(10)).unwrap(); // weight 19; evicting just "b" (10) makes room
        assert!(c.get("b").unwrap().is_none());
        assert!(c.get("a").unwrap().is_some());
        assert!(c.get("c").unwrap().is_some());
    }

    #[test]
    fn oversize_entry_is_silently_not_stored() {
        let c = LruCache::new(5);
        c.put("huge", entry(100)).unwrap();
        assert!(c.get("huge").unwrap().is_none());
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn replacing_a_key_frees_its_old_weight() {
        let c = LruCache::new(50);
        c.put("a", entry(20)).unwrap();
        c.put("a", entry(5)).unwrap();
        assert_eq!(c.size(), 1);
        c.put("b", entry(20)).unwrap();
        assert!(c.get("a").unwrap().is_some());
        assert!(c.get("b").unwrap().is_some());
    }

    #[test]
    fn clear_empties_the_cache() {
        let c = LruCache::new(1024);
        c.put("a", entry(1)).unwrap();
        c.clear().unwrap();
        assert_eq!(c.size(), 0);
        assert!(c.get("a").unwrap().is_none());
    }
}
