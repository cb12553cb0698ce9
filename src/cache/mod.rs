//! Cache interface and backends (spec.md §4.5): a no-op backend, an
//! in-process LRU backend, a persistent object-store backend, and a tiered
//! L1+L2 composition. Generalises the original multi-backend `Cache` trait
//! (`disk.rs` / `sled_cache.rs` / `cloudflare.rs`) into the polymorphic
//! `get/put/delete/clear/size` surface the pipeline and dispatcher share.

pub mod lru;
pub mod noop;
pub mod store;
pub mod tiered;

pub use lru::LruCache;
pub use noop::NoopCache;
pub use store::{sniff_content_type, ObjectStoreClient, StoreCache};
pub use tiered::{TaskSpawner, TieredCache};

use crate::error::CacheError;

/// A cached response body plus the content-type it was stored under and the
/// time it was written (spec.md §3 "Cache entry"). `created_at` is not
/// consulted by either backend's eviction policy (L1 is pure LRU; L2
/// expiry is the object store's job) — it is carried because the data
/// model names it, and it is useful for a future staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub data: Vec<u8>,
    pub content_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl CacheEntry {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self { data, content_type: content_type.into(), created_at: chrono::Utc::now() }
    }

    /// Bytes counted against a backend's byte budget (spec.md §4.5:
    /// `entrySize = data.len + contentType.len`).
    pub fn weight(&self) -> usize {
        self.data.len() + self.content_type.len()
    }
}

/// Shared surface every cache backend implements. All operations are
/// synchronous and best-effort from the dispatcher's point of view; only
/// `StoreCache` can return a genuine I/O error.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<bool, CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
    fn size(&self) -> usize;
}

/// Collapse runs of `/` and map `|`-joined cache key segments onto an
/// object-store key (spec.md §6 "Persistent-store key format").
pub fn key_to_object_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut prev_slash = false;
    for segment in key.split('|') {
        if !out.is_empty() {
            out.push('/');
        }
        for ch in segment.chars() {
            if ch == '/' {
                if !prev_slash {
                    out.push('/');
                }
                prev_slash = true;
            } else {
                out.push(ch);
                prev_slash = false;
            }
        }
    }
    out
}
