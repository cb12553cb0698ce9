//! The object-store origin fetcher (spec.md §4.6): strips a leading `/`
//! from the request path, treats the remainder as the object key, and maps
//! the persistent backend's store errors onto the fetch-error taxonomy.

use super::OriginFetcher;
use crate::cache::{sniff_content_type, ObjectStoreClient};
use crate::error::FetchError;

pub struct ObjectStoreFetcher<C: ObjectStoreClient> {
    client: C,
}

impl<C: ObjectStoreClient> ObjectStoreFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: ObjectStoreClient> OriginFetcher for ObjectStoreFetcher<C> {
    fn fetch(&self, path: &str) -> Result<(Vec<u8>, String), FetchError> {
        let key = path.trim_start_matches('/');
        let bytes = self.client.get_object(key).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("not found") {
                FetchError::NotFound
            } else {
                FetchError::ServerError(msg)
            }
        })?;
        let content_type = sniff_content_type(&bytes).unwrap_or("application/octet-stream").to_string();
        Ok((bytes, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::Mutex;

    struct FakeClient {
        objects: Mutex<std::collections::HashMap<String, Vec<u8>>>,
    }

    impl ObjectStoreClient for FakeClient {
        fn get_object(&self, key: &str) -> Result<Vec<u8>, CacheError> {
            self.objects.lock().unwrap().get(key).cloned().ok_or_else(|| CacheError::Io("not found".into()))
        }
        fn put_object(&self, _key: &str, _data: &[u8]) -> Result<(), CacheError> {
            Ok(())
        }
        fn delete_object(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[test]
    fn fetch_strips_leading_slash_and_sniffs_content_type() {
        let mut map = std::collections::HashMap::new();
        map.insert("photo.png".to_string(), vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        let client = FakeClient { objects: Mutex::new(map) };
        let fetcher = ObjectStoreFetcher::new(client);
        let (bytes, ct) = fetcher.fetch("/photo.png").unwrap();
        assert_eq!(ct, "image/png");
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn fetch_maps_missing_object_to_not_found() {
        let client = FakeClient { objects: Mutex::new(std::collections::HashMap::new()) };
        let fetcher = ObjectStoreFetcher::new(client);
        assert_eq!(fetcher.fetch("/missing.png").unwrap_err(), FetchError::NotFound);
    }
}
