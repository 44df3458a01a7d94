// crates/vpt-broker/src/r2.rs
// ============================================================================
// Module: Cloudflare R2 Object Store
// Description: SigV4-signed PUT/GET client for Cloudflare R2's S3-compatible
//              API, implementing vpt_core::ObjectStore.
// Purpose: Durable off-box storage for reference images, navigation
//          snapshots, script reports, screenshots, and audio analysis.
// Dependencies: vpt-core, reqwest, sha2, hmac, time
// ============================================================================

//! ## Overview
//! [`R2ObjectStore`] signs every request with AWS Signature Version 4, the
//! scheme Cloudflare R2 accepts in place of S3's own IAM. Only the
//! operations [`vpt_core::ObjectStore`] names are implemented: single-file
//! PUT, single-file GET, and public URL construction. Bucket listing,
//! multipart upload, and object deletion have no caller anywhere in this
//! engine and are not implemented. Canonical URIs are not percent-encoded
//! beyond the ASCII produced by [`crate::well_known`]'s key builders; every
//! remote key this engine ever writes comes from those builders.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use hmac::Hmac;
use hmac::Mac;
use reqwest::blocking::Client;
use sha2::Digest;
use sha2::Sha256;
use vpt_core::ObjectStore;
use vpt_core::UploadOutcome;
use vpt_core::UploadRequest;
use vpt_core::VptError;

/// HMAC-SHA256, the MAC this signing scheme chains four times per request.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Connection details for a Cloudflare R2 bucket.
///
/// # Invariants
/// - `endpoint` has no trailing slash.
/// - `public_url_base` has no trailing slash.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 S3-compatible API endpoint, e.g.
    /// `https://<account_id>.r2.cloudflarestorage.com`.
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// R2 access key id.
    pub access_key_id: String,
    /// R2 secret access key.
    pub secret_access_key: String,
    /// Public base URL used to build [`ObjectStore::get_public_url`] values.
    pub public_url_base: String,
}

/// The region identifier R2 accepts for SigV4 requests.
const R2_REGION: &str = "auto";
/// The AWS service name SigV4 signs for; R2 speaks the S3 dialect.
const R2_SERVICE: &str = "s3";

/// SigV4-signed [`ObjectStore`] backed by Cloudflare R2.
pub struct R2ObjectStore {
    /// Shared HTTP client.
    client: Client,
    /// Bucket connection details.
    config: R2Config,
}

impl R2ObjectStore {
    /// Builds an R2 store from the provided config.
    ///
    /// # Errors
    ///
    /// Returns [`VptError::Controller`] when the HTTP client cannot be built.
    pub fn new(config: R2Config) -> Result<Self, VptError> {
        let client = Client::builder().build().map_err(|err| VptError::Controller(err.to_string()))?;
        Ok(Self { client, config })
    }

    /// Returns the request URL for a remote key.
    fn object_url(&self, remote_path: &str) -> String {
        format!("{}/{}/{}", self.config.endpoint, self.config.bucket, remote_path)
    }

    /// Uploads a single file, returning the error message on failure.
    fn put_one(&self, request: &UploadRequest) -> Result<String, String> {
        let bytes = fs::read(&request.local_path).map_err(|err| err.to_string())?;
        let host = object_host(&self.config.endpoint).ok_or("endpoint has no host")?;
        let canonical_uri = format!("/{}/{}", self.config.bucket, request.remote_path);
        let content_type = request.content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
        let signed = sign_request(&self.config, "PUT", &canonical_uri, &host, &bytes, &[("content-type", content_type.as_str())])?;

        let response = self
            .client
            .put(self.object_url(&request.remote_path))
            .header("host", host)
            .header("content-type", content_type)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization)
            .body(bytes)
            .send()
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("r2 put failed with status {}", response.status()));
        }
        Ok(self.get_public_url(&request.remote_path))
    }
}

impl ObjectStore for R2ObjectStore {
    fn upload_files(&self, requests: &[UploadRequest]) -> Result<UploadOutcome, VptError> {
        let mut outcome = UploadOutcome::default();
        for request in requests {
            match self.put_one(request) {
                Ok(public_url) => outcome.uploaded_files.push((request.local_path.clone(), public_url)),
                Err(_) => outcome.failed_uploads.push(request.local_path.clone()),
            }
        }
        Ok(outcome)
    }

    fn download_file(&self, remote_path: &str, local_path: &str) -> Result<(), VptError> {
        let host = object_host(&self.config.endpoint).ok_or_else(|| VptError::Controller("endpoint has no host".to_string()))?;
        let canonical_uri = format!("/{}/{}", self.config.bucket, remote_path);
        let signed =
            sign_request(&self.config, "GET", &canonical_uri, &host, &[], &[]).map_err(VptError::Controller)?;

        let response = self
            .client
            .get(self.object_url(remote_path))
            .header("host", host)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .header("authorization", &signed.authorization)
            .send()
            .map_err(|err| VptError::Controller(err.to_string()))?;
        if !response.status().is_success() {
            return Err(VptError::Controller(format!("r2 get failed with status {}", response.status())));
        }
        let bytes = response.bytes().map_err(|err| VptError::Controller(err.to_string()))?;
        fs::write(local_path, bytes).map_err(|err| VptError::Io(err.to_string()))?;
        Ok(())
    }

    fn get_public_url(&self, remote_path: &str) -> String {
        format!("{}/{remote_path}", self.config.public_url_base)
    }
}

// ============================================================================
// SECTION: SigV4 signing
// ============================================================================

/// The headers and signature needed to complete a signed request.
struct SignedRequest {
    /// Hex-encoded SHA-256 of the request body.
    payload_hash: String,
    /// `x-amz-date` header value (`YYYYMMDDTHHMMSSZ`).
    amz_date: String,
    /// Complete `authorization` header value.
    authorization: String,
}

/// Signs a request per AWS Signature Version 4.
fn sign_request(
    config: &R2Config,
    method: &str,
    canonical_uri: &str,
    host: &str,
    body: &[u8],
    extra_signed_headers: &[(&str, &str)],
) -> Result<SignedRequest, String> {
    let (date_stamp, amz_date) = amz_timestamp();
    let payload_hash = hex_encode(&Sha256::digest(body));

    let mut headers: Vec<(&str, String)> = vec![
        ("host", host.to_string()),
        ("x-amz-content-sha256", payload_hash.clone()),
        ("x-amz-date", amz_date.clone()),
    ];
    for (name, value) in extra_signed_headers {
        headers.push((*name, (*value).to_string()));
    }
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = headers.iter().map(|(name, value)| format!("{name}:{}\n", value.trim())).collect();
    let signed_headers = headers.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";");

    let canonical_request =
        format!("{method}\n{canonical_uri}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");
    let canonical_request_hash = hex_encode(&Sha256::digest(canonical_request.as_bytes()));

    let credential_scope = format!("{date_stamp}/{R2_REGION}/{R2_SERVICE}/aws4_request");
    let string_to_sign = format!("AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{canonical_request_hash}");

    let signing_key = derive_signing_key(&config.secret_access_key, &date_stamp)?;
    let signature = hex_encode(&hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        config.access_key_id,
    );

    Ok(SignedRequest { payload_hash, amz_date, authorization })
}

/// Derives the SigV4 signing key via the four-step HMAC chain.
fn derive_signing_key(secret_access_key: &str, date_stamp: &str) -> Result<Vec<u8>, String> {
    let k_date = hmac_sha256(format!("AWS4{secret_access_key}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, R2_REGION.as_bytes())?;
    let k_service = hmac_sha256(&k_region, R2_SERVICE.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Computes HMAC-SHA256 over `data` with `key`.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|err| err.to_string())?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Returns `(YYYYMMDD, YYYYMMDDTHHMMSSZ)` for the current wall clock.
fn amz_timestamp() -> (String, String) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let datetime = time::OffsetDateTime::from_unix_timestamp(i64::try_from(now.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH);
    let date_stamp = format!("{:04}{:02}{:02}", datetime.year(), u8::from(datetime.month()), datetime.day());
    let amz_date = format!("{date_stamp}T{:02}{:02}{:02}Z", datetime.hour(), datetime.minute(), datetime.second());
    (date_stamp, amz_date)
}

/// Extracts the `host[:port]` component from a URL string.
fn object_host(endpoint: &str) -> Option<String> {
    let without_scheme = endpoint.split_once("://").map_or(endpoint, |(_, rest)| rest);
    let host = without_scheme.split('/').next()?;
    if host.is_empty() { None } else { Some(host.to_string()) }
}

/// Lowercase hex encoding, matching this workspace's hand-rolled convention
/// for digest formatting (no `hex` crate dependency).
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions are permitted to unwrap")]
#[allow(clippy::missing_docs_in_private_items, reason = "test helpers are self-explanatory from their names")]
mod tests {
    use super::*;

    #[test]
    fn object_host_strips_scheme_and_path() {
        assert_eq!(object_host("https://abc123.r2.cloudflarestorage.com"), Some("abc123.r2.cloudflarestorage.com".to_string()));
        assert_eq!(object_host("https://abc123.r2.cloudflarestorage.com/extra"), Some("abc123.r2.cloudflarestorage.com".to_string()));
    }

    #[test]
    fn hex_encode_matches_known_digest() {
        let digest = Sha256::digest(b"");
        assert_eq!(hex_encode(&digest), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85");
    }

    #[test]
    fn signing_is_deterministic_for_the_same_inputs() {
        let config = R2Config {
            endpoint: "https://abc123.r2.cloudflarestorage.com".to_string(),
            bucket: "test-bucket".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            public_url_base: "https://public.example.com".to_string(),
        };
        let host = object_host(&config.endpoint).unwrap();
        let first = sign_request(&config, "PUT", "/test-bucket/home.jpg", &host, b"payload", &[]).unwrap();
        let second = sign_request(&config, "PUT", "/test-bucket/home.jpg", &host, b"payload", &[]).unwrap();
        assert_eq!(first.authorization, second.authorization);
    }

    #[test]
    fn get_public_url_joins_base_and_key() {
        let config = R2Config {
            endpoint: "https://abc123.r2.cloudflarestorage.com".to_string(),
            bucket: "test-bucket".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            public_url_base: "https://public.example.com".to_string(),
        };
        let store = R2ObjectStore::new(config).unwrap();
        assert_eq!(store.get_public_url("reference-images/x1/home.jpg"), "https://public.example.com/reference-images/x1/home.jpg");
    }
}
