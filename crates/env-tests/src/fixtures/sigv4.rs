//! AWS Signature Version 4 request signing.
//!
//! Only what the SQS JSON protocol needs: header-based signing of requests
//! with a fully buffered body.

use crate::profile::EnvironmentProfile;
use crate::transport::HttpRequest;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use reqwest::Url;
use ring::{digest, hmac};
use std::fmt;
use thiserror::Error;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Request signing failures.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Cannot sign request with invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Static AWS credentials taken from the profile.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
            session_token: None,
        }
    }

    /// Credentials from the profile, when both key id and secret are present.
    pub fn from_profile(profile: &EnvironmentProfile) -> Option<Self> {
        let access_key_id = profile.credential("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = profile.credential("AWS_SECRET_ACCESS_KEY")?;

        Some(Self {
            access_key_id: access_key_id.expose_secret().to_string(),
            secret_access_key: secret_access_key.clone(),
            session_token: profile.credential("AWS_SESSION_TOKEN").cloned(),
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Sign `request` for `service` in `region` at the current time.
pub fn sign(
    request: HttpRequest,
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
) -> Result<HttpRequest, SigningError> {
    sign_at(request, credentials, region, service, Utc::now())
}

/// Sign `request` as of `now`.
///
/// Adds `x-amz-date`, `x-amz-security-token` (with a session token) and
/// `authorization`. Every header already on the request is signed, plus
/// `host`, which is derived from the URL.
pub fn sign_at(
    request: HttpRequest,
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> Result<HttpRequest, SigningError> {
    let url = Url::parse(&request.url).map_err(|e| SigningError::InvalidUrl {
        url: request.url.clone(),
        reason: e.to_string(),
    })?;
    let host = host_header(&url).ok_or_else(|| SigningError::InvalidUrl {
        url: request.url.clone(),
        reason: "missing host".to_string(),
    })?;

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut request = request.header("x-amz-date", amz_date.as_str());
    if let Some(token) = &credentials.session_token {
        request = request.header("x-amz-security-token", token.expose_secret());
    }

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), host));
    headers.sort();

    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let payload_hash = sha256_hex(request.body.as_deref().unwrap_or_default());
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.as_str(),
        canonical_path(&url),
        canonical_query(&url),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = signing_key(credentials, &date, region, service);
    let signature = hex::encode(hmac::sign(&signing_key, string_to_sign.as_bytes()).as_ref());

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    );

    Ok(request.header("authorization", authorization))
}

fn signing_key(credentials: &AwsCredentials, date: &str, region: &str, service: &str) -> hmac::Key {
    let secret = format!("AWS4{}", credentials.secret_access_key.expose_secret());
    let k_date = hmac_bytes(secret.as_bytes(), date);
    let k_region = hmac_bytes(&k_date, region);
    let k_service = hmac_bytes(&k_region, service);
    let k_signing = hmac_bytes(&k_service, "aws4_request");
    hmac::Key::new(hmac::HMAC_SHA256, &k_signing)
}

fn hmac_bytes(key: &[u8], data: &str) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, data.as_bytes()).as_ref().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// `host[:port]`, with the port only when it is not the scheme default.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn canonical_path(url: &Url) -> String {
    let path = url.path();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (uri_encode(&key), uri_encode(&value)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn uri_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> AwsCredentials {
        AwsCredentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn test_get_vanilla_signature() {
        let request = HttpRequest::get("https://example.amazonaws.com/");

        let signed = sign_at(
            request,
            &example_credentials(),
            "us-east-1",
            "service",
            example_time(),
        )
        .unwrap();

        assert_eq!(signed.header_value("x-amz-date"), Some("20150830T123600Z"));
        assert_eq!(
            signed.header_value("authorization"),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
                 SignedHeaders=host;x-amz-date, \
                 Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
            )
        );
    }

    #[test]
    fn test_session_token_is_signed() {
        let mut credentials = example_credentials();
        credentials.session_token = Some(SecretString::from("session-token".to_string()));

        let request = HttpRequest::post("http://localhost:4566/")
            .header("x-amz-target", "AmazonSQS.GetQueueUrl")
            .body("application/x-amz-json-1.0", b"{}".to_vec());
        let signed = sign_at(request, &credentials, "us-east-1", "sqs", example_time()).unwrap();

        assert_eq!(signed.header_value("x-amz-security-token"), Some("session-token"));
        let authorization = signed.header_value("authorization").unwrap();
        assert!(authorization.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
        ));
    }

    #[test]
    fn test_host_header_keeps_non_default_port() {
        let local = Url::parse("http://localhost:4566/").unwrap();
        let deployed = Url::parse("https://sqs.us-east-1.amazonaws.com/").unwrap();

        assert_eq!(host_header(&local).as_deref(), Some("localhost:4566"));
        assert_eq!(host_header(&deployed).as_deref(), Some("sqs.us-east-1.amazonaws.com"));
    }

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        let url = Url::parse("https://example.amazonaws.com/?b=2&a=x y&a=1").unwrap();
        assert_eq!(canonical_query(&url), "a=1&a=x%20y&b=2");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut credentials = example_credentials();
        credentials.session_token = Some(SecretString::from("session-token".to_string()));

        let debug = format!("{:?}", credentials);
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("EXAMPLEKEY"));
        assert!(!debug.contains("session-token"));
    }
}
