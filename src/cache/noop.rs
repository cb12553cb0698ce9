//! The no-op backend (spec.md §4.5): every operation is inert. Used when
//! caching is disabled so the dispatcher can still treat the cache handle
//! uniformly.

use super::{CacheBackend, CacheEntry};
use crate::error::CacheError;

#[derive(Debug, Default)]
pub struct NoopCache;

impl CacheBackend for NoopCache {
    fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    fn put(&self, _key: &str, _entry: CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn size(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_operations_are_inert() {
        let c = NoopCache;
        assert_eq!(c.get("k").unwrap(), None);
        c.put("k", CacheEntry::new(vec![1], "image/png")).unwrap();
        assert_eq!(c.get("k").unwrap(), None);
        assert_eq!(c.delete("k").unwrap(), false);
        assert_eq!(c.size(), 0);
    }
}
