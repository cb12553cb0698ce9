//! Environment-variable configuration, generalising the original
//! `ImageKitConfig` + `ConfigError` pattern (a flat struct plus a
//! `validate()` step) to the full `ZIMGX_*` surface from spec.md §6.
//!
//! The env-var loader itself is out of scope (spec.md §1 lists it among the
//! assumed-available collaborators); what lives here is the struct it
//! populates and the validation the core is responsible for.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginType {
    Http,
    S3,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub request_timeout: Duration,
    pub max_request_size: usize,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".into(),
            request_timeout: Duration::from_millis(30_000),
            max_request_size: 8 * 1024 * 1024,
            max_connections: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OriginConfig {
    pub kind: OriginType,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub path_prefix: Option<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            kind: OriginType::Http,
            base_url: String::new(),
            timeout: Duration::from_millis(10_000),
            max_retries: 2,
            path_prefix: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub default_quality: u8,
    pub max_pixels: u64,
    pub strip_metadata: bool,
    pub max_frames: u32,
    pub max_animated_pixels: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_width: 8192,
            max_height: 8192,
            default_quality: 80,
            max_pixels: 8192 * 8192,
            strip_metadata: true,
            max_frames: 64,
            max_animated_pixels: 50_000_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size_bytes: u64,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_bytes: 256 * 1024 * 1024,
            default_ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct R2Config {
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket_originals: Option<String>,
    pub bucket_variants: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ZimgxConfig {
    pub server: ServerConfig,
    pub origin: OriginConfig,
    pub transform: TransformConfig,
    pub cache: CacheConfig,
    pub r2: R2Config,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server.port must be nonzero")]
    InvalidPort,
    #[error("server.max_connections must be > 0")]
    InvalidMaxConnections,
    #[error("origin.base_url must not be empty for an http origin")]
    EmptyOriginUrl,
    #[error("transform.max_width/max_height must be > 0 and <= 8192")]
    InvalidTransformBounds,
    #[error("transform.default_quality must be in 1..=100")]
    InvalidDefaultQuality,
    #[error("cache.max_size_bytes must be > 0 when cache is enabled")]
    InvalidCacheSize,
}

impl ZimgxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections);
        }
        if self.origin.kind == OriginType::Http && self.origin.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyOriginUrl);
        }
        if self.transform.max_width == 0
            || self.transform.max_width > 8192
            || self.transform.max_height == 0
            || self.transform.max_height > 8192
        {
            return Err(ConfigError::InvalidTransformBounds);
        }
        if self.transform.default_quality == 0 || self.transform.default_quality > 100 {
            return Err(ConfigError::InvalidDefaultQuality);
        }
        if self.cache.enabled && self.cache.max_size_bytes == 0 {
            return Err(ConfigError::InvalidCacheSize);
        }
        Ok(())
    }

    /// Load from process environment, falling back to defaults for anything
    /// unset. `ZIMGX_*` variables per spec.md §6.
    pub fn from_env() -> Self {
        let mut cfg = ZimgxConfig::default();

        if let Ok(v) = std::env::var("ZIMGX_SERVER_PORT") {
            if let Ok(p) = v.parse() {
                cfg.server.port = p;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_SERVER_HOST") {
            cfg.server.host = v;
        }
        if let Ok(v) = std::env::var("ZIMGX_SERVER_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                cfg.server.request_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_SERVER_MAX_REQUEST_SIZE") {
            if let Ok(n) = v.parse() {
                cfg.server.max_request_size = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_SERVER_MAX_CONNECTIONS") {
            if let Ok(n) = v.parse() {
                cfg.server.max_connections = n;
            }
        }

        if let Ok(v) = std::env::var("ZIMGX_ORIGIN_TYPE") {
            cfg.origin.kind = match v.to_ascii_lowercase().as_str() {
                "s3" => OriginType::S3,
                _ => OriginType::Http,
            };
        }
        if let Ok(v) = std::env::var("ZIMGX_ORIGIN_BASE_URL") {
            cfg.origin.base_url = v;
        }
        if let Ok(v) = std::env::var("ZIMGX_ORIGIN_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                cfg.origin.timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_ORIGIN_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                cfg.origin.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_ORIGIN_PATH_PREFIX") {
            cfg.origin.path_prefix = Some(v);
        }

        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_MAX_WIDTH") {
            if let Ok(n) = v.parse() {
                cfg.transform.max_width = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_MAX_HEIGHT") {
            if let Ok(n) = v.parse() {
                cfg.transform.max_height = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_DEFAULT_QUALITY") {
            if let Ok(n) = v.parse() {
                cfg.transform.default_quality = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_MAX_PIXELS") {
            if let Ok(n) = v.parse() {
                cfg.transform.max_pixels = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_STRIP_METADATA") {
            cfg.transform.strip_metadata = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_MAX_FRAMES") {
            if let Ok(n) = v.parse() {
                cfg.transform.max_frames = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_TRANSFORM_MAX_ANIMATED_PIXELS") {
            if let Ok(n) = v.parse() {
                cfg.transform.max_animated_pixels = n;
            }
        }

        if let Ok(v) = std::env::var("ZIMGX_CACHE_ENABLED") {
            cfg.cache.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("ZIMGX_CACHE_MAX_SIZE_BYTES") {
            if let Ok(n) = v.parse() {
                cfg.cache.max_size_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("ZIMGX_CACHE_DEFAULT_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                cfg.cache.default_ttl_seconds = n;
            }
        }

        cfg.r2.endpoint = std::env::var("ZIMGX_R2_ENDPOINT").ok();
        cfg.r2.access_key_id = std::env::var("ZIMGX_R2_ACCESS_KEY_ID").ok();
        cfg.r2.secret_access_key = std::env::var("ZIMGX_R2_SECRET_ACCESS_KEY").ok();
        cfg.r2.bucket_originals = std::env::var("ZIMGX_R2_BUCKET_ORIGINALS").ok();
        cfg.r2.bucket_variants = std::env::var("ZIMGX_R2_BUCKET_VARIANTS").ok();

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let mut cfg = ZimgxConfig::default();
        cfg.origin.base_url = "https://example.com".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_origin_url_rejected() {
        let cfg = ZimgxConfig::default();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyOriginUrl));
    }

    #[test]
    fn zero_port_rejected() {
        let mut cfg = ZimgxConfig::default();
        cfg.origin.base_url = "https://example.com".into();
        cfg.server.port = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidPort));
    }
}
