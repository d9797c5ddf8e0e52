//! AWS Signature Version 4 request signing.
//!
//! Used for Bedrock `InvokeModel`. Pure Rust
//! (`hmac`, `sha2`, `hex`); no AWS SDK.
//!
//! # Credentials
//!
//! - `AWS_ACCESS_KEY_ID`: required
//! - `AWS_SECRET_ACCESS_KEY`: required
//! - `AWS_SESSION_TOKEN`: optional (temporary credentials / IAM roles)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// A service endpoint: scheme plus host, e.g. `https://bedrock-runtime.us-east-1.amazonaws.com`.
#[derive(Debug, Clone)]
pub struct AwsEndpoint {
    pub base_url: String,
    pub host: String,
    pub region: String,
    pub service: String,
}

impl AwsEndpoint {
    /// `https://<host_prefix>.<region>.amazonaws.com`, or `override_url`
    /// (LocalStack and similar) when given.
    pub fn new(host_prefix: &str, service: &str, region: &str, override_url: Option<&str>) -> Self {
        let base_url = match override_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}.amazonaws.com", host_prefix, region),
        };
        let host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        Self {
            base_url,
            host,
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Build a signed JSON POST to the path made of `segments`.
    pub fn signed_post(
        &self,
        client: &reqwest::Client,
        creds: &AwsCredentials,
        segments: &[&str],
        body: Vec<u8>,
        extra_headers: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        let url_path: String = segments.iter().map(|s| format!("/{}", uri_encode(s))).collect();
        // Non-S3 services sign each path segment encoded twice.
        let canonical_path: String = segments
            .iter()
            .map(|s| format!("/{}", uri_encode(&uri_encode(s))))
            .collect();

        let mut headers: Vec<(String, String)> = extra_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        headers.push(("content-type".to_string(), "application/json".to_string()));

        let signed = sign_request(
            creds,
            "POST",
            &self.host,
            &canonical_path,
            &self.region,
            &self.service,
            &body,
            headers,
            Utc::now(),
        );

        let mut req = client.post(format!("{}{}", self.base_url, url_path));
        for (k, v) in signed {
            if k != "host" {
                req = req.header(k, v);
            }
        }
        req.body(body)
    }
}

/// Compute SigV4 headers for a request.
///
/// Returns every header that was signed (including `host`, `x-amz-date`
/// and `x-amz-content-sha256`) plus `authorization`.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    creds: &AwsCredentials,
    method: &str,
    host: &str,
    canonical_uri: &str,
    region: &str,
    service: &str,
    body: &[u8],
    mut headers: Vec<(String, String)>,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(body);

    headers.push(("host".to_string(), host.to_string()));
    headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
    headers.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, service);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    headers.push((
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
    ));
    headers
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything but `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
