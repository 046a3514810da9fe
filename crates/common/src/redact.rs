//! Redaction of credentials in text that ends up in test reports.
//!
//! Response bodies from collaborating services are copied into failure
//! messages. Some of them echo request headers or tokens back, so every body
//! passes through [`sanitize_error_body`] before it is stored.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum number of characters kept from an error body.
pub const MAX_ERROR_BODY_LEN: usize = 256;

/// Bearer tokens in text ("Bearer <token>").
#[allow(clippy::expect_used)] // static pattern, covered by tests
static BEARER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").expect("valid bearer pattern")
});

/// JWT tokens (header.payload.signature).
#[allow(clippy::expect_used)] // static pattern, covered by tests
static JWT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]*)?").expect("valid JWT pattern")
});

/// AWS access key ids (long-term `AKIA` and temporary `ASIA`).
#[allow(clippy::expect_used)] // static pattern, covered by tests
static AWS_KEY_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b").expect("valid key id pattern"));

/// Sanitize a response body before it is placed in an error message.
///
/// Bearer tokens are replaced first so that "Bearer <JWT>" is captured as a
/// whole, then standalone JWTs and AWS access key ids. The result is truncated
/// to [`MAX_ERROR_BODY_LEN`] characters.
#[must_use]
pub fn sanitize_error_body(body: &str) -> String {
    let sanitized = BEARER_PATTERN.replace_all(body, "[BEARER_REDACTED]");
    let sanitized = JWT_PATTERN.replace_all(&sanitized, "[JWT_REDACTED]");
    let sanitized = AWS_KEY_ID_PATTERN.replace_all(&sanitized, "[AWS_KEY_REDACTED]");

    match sanitized.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((cut, _)) => {
            let head = sanitized.get(..cut).unwrap_or_default();
            format!("{head}...[truncated]")
        }
        None => sanitized.into_owned(),
    }
}
