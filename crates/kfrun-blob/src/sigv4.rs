//! AWS Signature Version 4 presigned URLs.
//!
//! Requests are signed in the query string with `UNSIGNED-PAYLOAD`, so the
//! body can be sent as-is. URLs are path-style:
//! `<endpoint>/<bucket>/<key>?X-Amz-...`.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::StorageError;

/// Maximum expiration time for presigned URLs (7 days in seconds).
const MAX_EXPIRES_SECONDS: u64 = 604_800;

/// Default expiration time (15 minutes).
const DEFAULT_EXPIRES_SECONDS: u64 = 900;

const SERVICE: &str = "s3";

/// HTTP methods used for object transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
}

impl HttpMethod {
    fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
        }
    }
}

/// Builder for a presigned object URL.
pub struct Presigner<'a> {
    endpoint: &'a str,
    region: &'a str,
    access_key: &'a str,
    secret_key: &'a str,
    session_token: Option<&'a str>,
    expires_seconds: u64,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> Presigner<'a> {
    /// Create a presigner for an endpoint, region and key pair.
    pub fn new(endpoint: &'a str, region: &'a str, access_key: &'a str, secret_key: &'a str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/'),
            region,
            access_key,
            secret_key,
            session_token: None,
            expires_seconds: DEFAULT_EXPIRES_SECONDS,
            timestamp: None,
        }
    }

    /// Temporary-credential session token.
    pub fn session_token(mut self, token: Option<&'a str>) -> Self {
        self.session_token = token;
        self
    }

    /// Expiration in seconds, capped at 7 days.
    pub fn expires_in_seconds(mut self, seconds: u64) -> Self {
        self.expires_seconds = seconds.min(MAX_EXPIRES_SECONDS);
        self
    }

    /// Fix the signing time (for testing).
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Presign `method` on `bucket/key`.
    pub fn presign(&self, method: HttpMethod, bucket: &str, key: &str) -> Result<String, StorageError> {
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(StorageError::Credentials(
                "S3 access key and secret key are required".to_string(),
            ));
        }
        let key = key.trim_start_matches('/');
        if bucket.is_empty() || key.is_empty() {
            return Err(StorageError::InvalidKey(format!("{bucket}/{key}")));
        }

        let now = self.timestamp.unwrap_or_else(Utc::now);
        let date_str = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential_scope = format!("{}/{}/{}/aws4_request", date_str, self.region, SERVICE);

        let host_and_base = self
            .endpoint
            .strip_prefix("http://")
            .or_else(|| self.endpoint.strip_prefix("https://"))
            .ok_or_else(|| StorageError::InvalidEndpoint(self.endpoint.to_string()))?;
        let (host, base_path) = match host_and_base.split_once('/') {
            Some((host, path)) => (host, format!("/{}", path.trim_end_matches('/'))),
            None => (host_and_base, String::new()),
        };
        if host.is_empty() {
            return Err(StorageError::InvalidEndpoint(self.endpoint.to_string()));
        }

        let encoded_uri = uri_encode_path(&format!("{base_path}/{bucket}/{key}"));

        let mut query_params = BTreeMap::new();
        query_params.insert("X-Amz-Algorithm", "AWS4-HMAC-SHA256".to_string());
        query_params.insert(
            "X-Amz-Credential",
            format!("{}/{}", self.access_key, credential_scope),
        );
        query_params.insert("X-Amz-Date", amz_date.clone());
        query_params.insert("X-Amz-Expires", self.expires_seconds.to_string());
        if let Some(token) = self.session_token {
            query_params.insert("X-Amz-Security-Token", token.to_string());
        }
        query_params.insert("X-Amz-SignedHeaders", "host".to_string());
        let canonical_query_string = build_canonical_query_string(&query_params);

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            method.as_str(),
            encoded_uri,
            canonical_query_string,
            host
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signature = calculate_signature(
            self.secret_key,
            &date_str,
            self.region,
            SERVICE,
            &string_to_sign,
        );

        let scheme = if self.endpoint.starts_with("https://") {
            "https"
        } else {
            "http"
        };

        Ok(format!(
            "{scheme}://{host}{encoded_uri}?{canonical_query_string}&X-Amz-Signature={signature}"
        ))
    }
}

/// URI-encode a path (preserving slashes).
fn uri_encode_path(path: &str) -> String {
    encode(path, true)
}

/// URI-encode a query parameter name or value.
fn uri_encode_value(value: &str) -> String {
    encode(value, false)
}

fn encode(input: &str, keep_slash: bool) -> String {
    let mut result = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char);
            }
            b'/' if keep_slash => result.push('/'),
            _ => {
                let _ = write!(result, "%{:02X}", b);
            }
        }
    }
    result
}

fn build_canonical_query_string(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode_value(k), uri_encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn calculate_signature(
    secret_key: &str,
    date: &str,
    region: &str,
    service: &str,
    string_to_sign: &str,
) -> String {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_presigned_url_basic() {
        let url = Presigner::new("http://localhost:9000", "us-east-1", "test-access-key", "test-secret-key")
            .timestamp(ts())
            .expires_in_seconds(3600)
            .presign(HttpMethod::Get, "test-bucket", "data/Xtrain.npz")
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/test-bucket/data/Xtrain.npz?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Credential=test-access-key%2F20240115%2Fus-east-1%2Fs3%2Faws4_request"));
        assert!(url.contains("X-Amz-Expires=3600"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(!url.contains("X-Amz-Security-Token"));
    }

    #[test]
    fn test_signature_is_deterministic_and_method_specific() {
        let signer = Presigner::new("https://s3.us-east-1.amazonaws.com", "us-east-1", "ak", "sk").timestamp(ts());
        let get = signer.presign(HttpMethod::Get, "b", "k").unwrap();
        let get_again = signer.presign(HttpMethod::Get, "b", "k").unwrap();
        let put = signer.presign(HttpMethod::Put, "b", "k").unwrap();

        assert_eq!(get, get_again);
        assert_ne!(get, put);
        assert!(get.starts_with("https://s3.us-east-1.amazonaws.com/b/k?"));
    }

    #[test]
    fn test_session_token_is_signed() {
        let url = Presigner::new("http://localhost:9000", "us-east-1", "ak", "sk")
            .session_token(Some("tok/en"))
            .timestamp(ts())
            .presign(HttpMethod::Put, "b", "k")
            .unwrap();
        assert!(url.contains("X-Amz-Security-Token=tok%2Fen"));
    }

    #[test]
    fn test_key_is_encoded() {
        let url = Presigner::new("http://localhost:9000", "us-east-1", "ak", "sk")
            .timestamp(ts())
            .presign(HttpMethod::Get, "b", "dir/a file.npz")
            .unwrap();
        assert!(url.starts_with("http://localhost:9000/b/dir/a%20file.npz?"));
    }

    #[test]
    fn test_missing_credentials() {
        let result = Presigner::new("http://localhost:9000", "us-east-1", "", "sk").presign(HttpMethod::Get, "b", "k");
        assert!(matches!(result, Err(StorageError::Credentials(_))));
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = Presigner::new("localhost:9000", "us-east-1", "ak", "sk").presign(HttpMethod::Get, "b", "k");
        assert!(matches!(result, Err(StorageError::InvalidEndpoint(_))));
    }
}
