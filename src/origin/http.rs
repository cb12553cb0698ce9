//! The HTTP origin fetcher (spec.md §4.6). Grounded in the original
//! `fetch_source` (`fetch.rs`): same streaming size-enforcement strategy,
//! reworked from an async `bytes_stream()` pull into the blocking client's
//! `Read` loop the synchronous core needs (§5: origin HTTP GET is a
//! blocking suspension point).

use super::OriginFetcher;
use crate::error::FetchError;
use std::io::Read;
use std::time::Duration;

pub struct HttpFetcher {
    base_url: String,
    client: reqwest::blocking::Client,
    max_response_size: usize,
}

impl HttpFetcher {
    pub fn new(base_url: String, timeout: Duration, max_response_size: usize) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zimgx/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client config is static and always valid");
        Self { base_url, client, max_response_size }
    }

    fn url_for(&self, path: &str) -> Result<String, FetchError> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(FetchError::ConnectionFailed("empty origin path".into()));
        }
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), trimmed))
    }
}

impl OriginFetcher for HttpFetcher {
    fn fetch(&self, path: &str) -> Result<(Vec<u8>, String), FetchError> {
        let url = self.url_for(path)?;

        let mut resp = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(FetchError::NotFound);
        }
        if status.as_u16() >= 500 {
            return Err(FetchError::ServerError(format!("origin returned {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::ServerError(format!("origin returned {}", status)));
        }

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_response_size {
                return Err(FetchError::ResponseTooLarge);
            }
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut buf = Vec::with_capacity(8192);
        let mut chunk = [0u8; 8192];
        loop {
            let n = resp.read(&mut chunk).map_err(|e| FetchError::ConnectionFailed(e.to_string()))?;
            if n == 0 {
                break;
            }
            if buf.len() + n > self.max_response_size {
                return Err(FetchError::ResponseTooLarge);
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        Ok((buf, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(base: &str) -> HttpFetcher {
        HttpFetcher::new(base.to_string(), Duration::from_millis(5_000), 1024)
    }

    #[test]
    fn url_for_joins_base_and_path() {
        let f = fetcher("https://origin.example.com/");
        assert_eq!(f.url_for("/photo.png").unwrap(), "https://origin.example.com/photo.png");
    }

    #[test]
    fn url_for_rejects_empty_path() {
        let f = fetcher("https://origin.example.com");
        assert_eq!(f.url_for("").unwrap_err(), FetchError::ConnectionFailed("empty origin path".into()));
        assert_eq!(f.url_for("/").unwrap_err(), FetchError::ConnectionFailed("empty origin path".into()));
    }
}
