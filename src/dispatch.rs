//! The request dispatcher (spec.md §4.7/§4.8): a single pure `dispatch`
//! function over server state plus a cache handle, producing the
//! intermediate `ServerResponse` the connection loop serialises. Grounded
//! in the shape of the original `lib.rs` handler (cache lookup → fetch →
//! transform → cache store → headers), generalised from axum-extractor
//! plumbing into a socket-free, directly testable function.

use crate::cache::{CacheBackend, CacheEntry};
use crate::config::{CacheConfig, TransformConfig};
use crate::error::DispatchError;
use crate::origin::OriginFetcher;
use crate::params::TransformParams;
use crate::pipeline::{self, AnimConfig};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters incremented as requests are served (spec.md §4.7: "every route
/// increments requestsTotal"). Relaxed atomics per spec.md §5 — exact
/// precision across racing increments is not required, only monotonicity.
#[derive(Default)]
pub struct Stats {
    pub requests_total: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
}

impl Stats {
    fn snapshot(&self, cache_entries: usize, uptime_seconds: u64) -> serde_json::Value {
        json!({
            "requestsTotal": self.requests_total.load(Ordering::Relaxed),
            "cacheHits": self.cache_hits.load(Ordering::Relaxed),
            "cacheMisses": self.cache_misses.load(Ordering::Relaxed),
            "cacheEntries": cache_entries,
            "uptimeSeconds": uptime_seconds,
        })
    }
}

/// Everything `dispatch` needs besides the request itself.
pub struct ServerState {
    pub cache: Arc<dyn CacheBackend>,
    pub origin: Arc<dyn OriginFetcher>,
    pub transform: TransformConfig,
    pub cache_config: CacheConfig,
    pub stats: Stats,
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        origin: Arc<dyn OriginFetcher>,
        transform: TransformConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self { cache, origin, transform, cache_config, stats: Stats::default(), started_at: Instant::now() }
    }
}

/// The socket-free response the server loop serialises (spec.md §3 "Server
/// response (intermediate)"). `body: None` marks a 304 with no payload.
pub struct ServerResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Option<Vec<u8>>,
    pub cache_control: Option<String>,
    pub etag: Option<String>,
    pub vary: Option<String>,
}

impl ServerResponse {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: Some(serde_json::to_vec(&value).unwrap_or_default()),
            cache_control: None,
            etag: None,
            vary: None,
        }
    }

    fn error(err: &DispatchError) -> Self {
        let body = json!({
            "error": {
                "status": err.status(),
                "message": err.phrase(),
                "detail": err.to_string(),
            }
        });
        Self::json(err.status(), body)
    }
}

enum Route<'a> {
    Health,
    Ready,
    Metrics,
    Image { image_path: &'a str, transform: &'a str },
    NotFound,
}

/// Split the request path into route + (image path, raw transform string),
/// and reject paths that fail the traversal sanitiser (spec.md §6, §8).
fn route_for(path: &str) -> Route<'_> {
    match path {
        "/health" => return Route::Health,
        "/ready" => return Route::Ready,
        "/metrics" => return Route::Metrics,
        _ => {}
    }

    if !is_sanitised(path) {
        return Route::NotFound;
    }

    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Route::NotFound;
    }

    match trimmed.rsplit_once('/') {
        Some((head, tail)) if tail.contains('=') => Route::Image { image_path: head, transform: tail },
        _ => Route::Image { image_path: trimmed, transform: "" },
    }
}

/// Reject traversal and encoded-traversal attempts (spec.md §6, §8).
fn is_sanitised(path: &str) -> bool {
    if path.starts_with("//") {
        return false;
    }
    if path.contains('\0') {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    !(lower.contains("..") || lower.contains("%2e") || lower.contains("%2f") || lower.contains("%00"))
}

/// 64-bit FNV-1a fingerprint over the first 8192 bytes, XORed with the full
/// length, rendered as 16 lowercase hex digits (spec.md §4.8, §8).
fn compute_etag(bytes: &[u8]) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let probe = &bytes[..bytes.len().min(8192)];
    let mut hash = FNV_OFFSET;
    for &b in probe {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash ^= bytes.len() as u64;
    format!("{:016x}", hash)
}

fn strip_etag_quoting(raw: &str) -> &str {
    raw.trim().trim_start_matches("W/").trim_matches('"')
}

fn content_type_from_ext(format_hint: Option<&str>) -> String {
    match format_hint {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
    .to_string()
}

/// Build the `Cache-Control` value for a successful image response.
fn cache_control_for(cfg: &CacheConfig) -> String {
    format!("public, max-age={}", cfg.default_ttl_seconds)
}

/// Pure over `state` plus the cache handle (spec.md §4.7). `raw_path` is
/// the request path (e.g. `/spinner.gif/w=64`); `if_none_match` and
/// `accept` are the corresponding request headers, if present.
pub fn dispatch(state: &ServerState, raw_path: &str, if_none_match: Option<&str>, accept: Option<&str>) -> ServerResponse {
    state.stats.requests_total.fetch_add(1, Ordering::Relaxed);

    match route_for(raw_path) {
        Route::Health => ServerResponse::json(200, json!({ "status": "ok" })),
        Route::Ready => ServerResponse::json(200, json!({ "ready": true })),
        Route::Metrics => {
            let uptime = state.started_at.elapsed().as_secs();
            ServerResponse::json(200, state.stats.snapshot(state.cache.size(), uptime))
        }
        Route::Image { image_path, transform } => handle_image_request(state, image_path, transform, if_none_match, accept),
        Route::NotFound => ServerResponse::json(404, json!({ "error": { "status": 404, "message": "not found" } })),
    }
}

fn handle_image_request(
    state: &ServerState,
    image_path: &str,
    transform: &str,
    if_none_match: Option<&str>,
    accept: Option<&str>,
) -> ServerResponse {
    // Step 1-2: parse + validate.
    let params = match TransformParams::parse(transform) {
        Ok(p) => p,
        Err(e) => return ServerResponse::error(&DispatchError::from(e)),
    };
    if let Err(e) = params.validate() {
        return ServerResponse::error(&DispatchError::from(e));
    }
    // Deployment-configured ceilings (spec.md §6 `ZIMGX_TRANSFORM_MAX_WIDTH`/
    // `MAX_HEIGHT`) can only narrow the spec's fixed 1..8192 bound, never
    // widen it — `validate()` above already enforced the hard ceiling.
    if params.width.is_some_and(|w| w > state.transform.max_width) {
        return ServerResponse::error(&DispatchError::from(crate::error::ValidationError::Width));
    }
    if params.height.is_some_and(|h| h > state.transform.max_height) {
        return ServerResponse::error(&DispatchError::from(crate::error::ValidationError::Height));
    }

    // Step 3: cache key = (imagePath, rawTransformString, explicit format or "auto").
    let format_component = if params.format == crate::params::OutputFormat::Auto {
        "auto"
    } else {
        params.format.as_str()
    };
    let cache_key = format!("{}|{}|{}", image_path, transform, format_component);

    // Step 4: cache lookup.
    if let Ok(Some(entry)) = state.cache.get(&cache_key) {
        state.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        return respond_with_entry(state, entry, if_none_match);
    }
    state.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

    // Step 5: origin fetch.
    let (origin_bytes, _origin_content_type) = match state.origin.fetch(image_path) {
        Ok(v) => v,
        Err(e) => return ServerResponse::error(&DispatchError::from(e)),
    };

    // Step 6: pipeline.
    let anim_cfg = AnimConfig { max_frames: state.transform.max_frames, max_animated_pixels: state.transform.max_animated_pixels };
    let output = match pipeline::run(&origin_bytes, &params, accept, anim_cfg) {
        Ok(out) => out,
        Err(_) => {
            // Pipeline errors degrade to serving the original bytes (spec.md §7).
            let best_effort_ct = crate::cache::sniff_content_type(&origin_bytes).map(|s| s.to_string());
            let ct = best_effort_ct.unwrap_or_else(|| content_type_from_ext(None));
            let entry = CacheEntry::new(origin_bytes, ct);
            let _ = state.cache.put(&cache_key, entry.clone());
            return respond_with_entry(state, entry, if_none_match);
        }
    };

    // Step 7: cache the transformed bytes, then re-get to construct the response.
    let entry = CacheEntry::new(output.bytes, output.format.content_type().to_string());
    let _ = state.cache.put(&cache_key, entry.clone());
    match state.cache.get(&cache_key) {
        Ok(Some(cached)) => respond_with_entry(state, cached, if_none_match),
        _ => respond_with_entry(state, entry, if_none_match),
    }
}

fn respond_with_entry(state: &ServerState, entry: CacheEntry, if_none_match: Option<&str>) -> ServerResponse {
    let etag = compute_etag(&entry.data);

    if let Some(candidate) = if_none_match {
        if strip_etag_quoting(candidate) == etag {
            return ServerResponse {
                status: 304,
                content_type: entry.content_type,
                body: None,
                cache_control: Some(cache_control_for(&state.cache_config)),
                etag: Some(etag),
                vary: Some("Accept".to_string()),
            };
        }
    }

    ServerResponse {
        status: 200,
        content_type: entry.content_type,
        body: Some(entry.data),
        cache_control: Some(cache_control_for(&state.cache_config)),
        etag: Some(etag),
        vary: Some("Accept".to_string()),
    }
}
