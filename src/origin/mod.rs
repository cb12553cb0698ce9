//! Origin fetchers (spec.md §4.6): two interchangeable sources for the
//! original image bytes, both returning `(bytes, content_type)` or a
//! `FetchError`.

pub mod http;
pub mod s3;

pub use http::HttpFetcher;
pub use s3::ObjectStoreFetcher;

use crate::error::FetchError;

pub trait OriginFetcher: Send + Sync {
    fn fetch(&self, path: &str) -> Result<(Vec<u8>, String), FetchError>;
}

/// Strip a configured path prefix from the request path before handing it
/// to a fetcher, enabling account-id-prefixed URLs (spec.md §4.6).
pub fn strip_path_prefix<'a>(path: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(p) if !p.is_empty() => {
            let wanted = format!("{}/", p.trim_matches('/'));
            path.strip_prefix(wanted.as_str()).unwrap_or(path)
        }
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_configured_prefix() {
        assert_eq!(strip_path_prefix("acct123/photo.png", Some("acct123")), "photo.png");
    }

    #[test]
    fn leaves_path_untouched_without_a_prefix() {
        assert_eq!(strip_path_prefix("photo.png", None), "photo.png");
    }

    #[test]
    fn leaves_path_untouched_when_prefix_does_not_match() {
        assert_eq!(strip_path_prefix("other/photo.png", Some("acct123")), "other/photo.png");
    }
}
