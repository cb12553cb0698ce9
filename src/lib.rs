pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod image_handle;
pub mod negotiate;
pub mod origin;
pub mod params;
pub mod pipeline;
pub mod pool;
pub mod s3_sig;
pub mod server;

use crate::cache::{LruCache, NoopCache, StoreCache, TaskSpawner, TieredCache};
use crate::config::{OriginType, ZimgxConfig};
use crate::dispatch::ServerState;
use crate::origin::{HttpFetcher, ObjectStoreFetcher, OriginFetcher};
use crate::pool::TokioBlockingSpawner;
use crate::s3_sig::S3Client;
use std::sync::Arc;

/// Build the server state a running instance dispatches against: an origin
/// fetcher matching `config.origin.kind`, and a cache backend that is
/// tiered (LRU in front of an R2-backed store) when R2 credentials are
/// present, falling back to a bare LRU, or a no-op cache when caching is
/// disabled outright (spec.md §6 `ZIMGX_CACHE_ENABLED`).
pub fn build_state(config: &ZimgxConfig) -> ServerState {
    let origin: Arc<dyn OriginFetcher> = match config.origin.kind {
        OriginType::Http => Arc::new(HttpFetcher::new(
            config.origin.base_url.clone(),
            config.origin.timeout,
            config.server.max_request_size,
        )),
        OriginType::S3 => match S3Client::from_config(&config.r2, config.r2.bucket_originals.clone().unwrap_or_default()) {
            Some(client) => Arc::new(ObjectStoreFetcher::new(client)),
            None => {
                tracing::warn!("ZIMGX_ORIGIN_TYPE=s3 but R2 credentials are incomplete; falling back to http origin");
                Arc::new(HttpFetcher::new(config.origin.base_url.clone(), config.origin.timeout, config.server.max_request_size))
            }
        },
    };

    let cache: Arc<dyn crate::cache::CacheBackend> = if !config.cache.enabled {
        Arc::new(NoopCache)
    } else {
        let l1: Arc<dyn crate::cache::CacheBackend> =
            Arc::new(LruCache::new(config.cache.max_size_bytes as usize));
        match S3Client::from_config(&config.r2, config.r2.bucket_variants.clone().unwrap_or_default()) {
            Some(client) => {
                let l2: Arc<dyn crate::cache::CacheBackend> = Arc::new(StoreCache::new(client));
                // Dispatch L2 writes onto tokio's blocking pool when called
                // from inside a running runtime (spec.md §4.5); outside one
                // (e.g. a unit test building state directly) fall back to
                // the tiered cache's synchronous L2 path.
                let pool: Option<Arc<dyn TaskSpawner>> = tokio::runtime::Handle::try_current()
                    .ok()
                    .map(|h| Arc::new(TokioBlockingSpawner::new(h)) as Arc<dyn TaskSpawner>);
                Arc::new(TieredCache::new(l1, l2, pool))
            }
            None => l1,
        }
    };

    ServerState::new(cache, origin, config.transform.clone(), config.cache.clone())
}
