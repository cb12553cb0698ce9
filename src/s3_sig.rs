//! The S3 signature V4 signer (spec.md §1: "a pure deterministic function
//! of inputs... assumed available"). This module is the thin, concrete
//! collaborator the cache's `StoreCache` and `origin::s3` consume through
//! `cache::store::ObjectStoreClient` — everything interesting (bucket
//! credentials, the actual HTTP transport, magic-byte sniffing) lives on
//! either side of it.

use crate::cache::ObjectStoreClient;
use crate::config::R2Config;
use crate::error::CacheError;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use aws_sigv4::sign::v4::SigningParams;
use reqwest::blocking::Client;
use std::time::SystemTime;

/// Credentials and endpoint for an S3-compatible bucket pair (originals +
/// variants), populated from `ZIMGX_R2_*` (spec.md §6).
#[derive(Debug, Clone)]
pub struct S3Client {
    endpoint: String,
    bucket: String,
    access_key_id: String,
    secret_access_key: String,
    region: String,
    http: Client,
}

impl S3Client {
    pub fn from_config(cfg: &R2Config, bucket: String) -> Option<Self> {
        Some(Self {
            endpoint: cfg.endpoint.clone()?,
            bucket,
            access_key_id: cfg.access_key_id.clone()?,
            secret_access_key: cfg.secret_access_key.clone()?,
            region: "auto".to_string(),
            http: Client::new(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, key.trim_start_matches('/'))
    }

    fn sign(&self, method: &str, url: &str, body: &[u8]) -> Result<Vec<(String, String)>, CacheError> {
        let identity = aws_credential_types::Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            None,
            None,
            "zimgx",
        )
        .into();

        let params = SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name("s3")
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| CacheError::Io(e.to_string()))?
            .into();

        let signable = SignableRequest::new(method, url, std::iter::empty(), SignableBody::Bytes(body))
            .map_err(|e| CacheError::Io(e.to_string()))?;

        let (instructions, _signature) =
            sign(signable, &params).map_err(|e| CacheError::Io(e.to_string()))?.into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

impl ObjectStoreClient for S3Client {
    fn get_object(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let url = self.object_url(key);
        let headers = self.sign("GET", &url, b"")?;
        let mut req = self.http.get(&url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req.send().map_err(|e| CacheError::Io(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CacheError::Io("object not found".into()));
        }
        if !resp.status().is_success() {
            return Err(CacheError::Io(format!("s3 get failed: {}", resp.status())));
        }
        resp.bytes().map(|b| b.to_vec()).map_err(|e| CacheError::Io(e.to_string()))
    }

    fn put_object(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        let url = self.object_url(key);
        let headers = self.sign("PUT", &url, data)?;
        let mut req = self.http.put(&url).body(data.to_vec());
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req.send().map_err(|e| CacheError::Io(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CacheError::Io(format!("s3 put failed: {}", resp.status())));
        }
        Ok(())
    }

    fn delete_object(&self, key: &str) -> Result<(), CacheError> {
        let url = self.object_url(key);
        let headers = self.sign("DELETE", &url, b"")?;
        let mut req = self.http.delete(&url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req.send().map_err(|e| CacheError::Io(e.to_string()))?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(CacheError::Io(format!("s3 delete failed: {}", resp.status())));
        }
        Ok(())
    }
}
