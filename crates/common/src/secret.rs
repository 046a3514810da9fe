//! Secret types for credentials handed to the harness.
//!
//! Re-exports the [`secrecy`] types used for API keys and AWS credentials.
//! `SecretString` implements `Debug` with redaction, so a profile or fixture
//! that derives `Debug` never prints a credential through `{:?}` or tracing.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct KnoxCredentials {
//!     endpoint: String,
//!     api_key: SecretString,
//! }
//!
//! let creds = KnoxCredentials {
//!     endpoint: "http://localhost:8000".to_string(),
//!     api_key: SecretString::from("knox-local-key"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("knox-local-key"));
//! assert_eq!(creds.api_key.expose_secret(), "knox-local-key");
//! ```
//!
//! Use `SecretString` for:
//! - Knox API keys
//! - AWS secret access keys and session tokens
//! - Any value read from a credential variable of the environment file

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("AKIAEXAMPLESECRET");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("AKIAEXAMPLESECRET"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("knox-api-key");
        assert_eq!(secret.expose_secret(), "knox-api-key");
    }

    #[test]
    fn test_credential_map_debug_is_safe() {
        let mut credentials = std::collections::BTreeMap::new();
        credentials.insert(
            "AWS_SECRET_ACCESS_KEY".to_string(),
            SecretString::from("wJalrXUtnFEMI"),
        );

        let debug_str = format!("{credentials:?}");

        assert!(debug_str.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!debug_str.contains("wJalrXUtnFEMI"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ServiceCredentials {
            service: String,
            api_key: SecretString,
        }

        let json = r#"{"service": "knox", "api_key": "my-secret-value"}"#;
        let creds: ServiceCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.api_key.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
