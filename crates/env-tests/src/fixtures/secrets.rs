//! Secrets Manager client fixture.
//!
//! Only `GetSecretValue` is needed: deployed environments keep the Knox API
//! key in a named secret. Speaks AWS JSON 1.1 and signs like the SQS client.

use crate::fixtures::sigv4::{self, AwsCredentials, SigningError};
use crate::profile::join_url;
use crate::session::Session;
use crate::transport::{HttpRequest, TransportError};
use common::redact::sanitize_error_body;
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const SERVICE: &str = "secretsmanager";

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("GetSecretValue for '{secret_id}' failed with status {status} ({}): {message}", .code.as_deref().unwrap_or("unknown"))]
    RequestFailed {
        secret_id: String,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("secret '{0}' has no string value")]
    NotAString(String),

    #[error("invalid GetSecretValue response: {0}")]
    InvalidResponse(String),

    #[error("request serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueRequest<'a> {
    secret_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueResponse {
    #[serde(default)]
    secret_string: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Client for the profile's Secrets Manager endpoint.
pub struct SecretsManagerClient<'a> {
    session: &'a Session,
    endpoint: String,
    region: String,
    credentials: Option<AwsCredentials>,
}

impl<'a> SecretsManagerClient<'a> {
    pub fn new(session: &'a Session) -> Self {
        let profile = session.profile();
        Self {
            session,
            endpoint: join_url(profile.secrets_manager_endpoint(), "/"),
            region: profile.aws_region().to_string(),
            credentials: AwsCredentials::from_profile(profile),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `GetSecretValue`. Binary secrets are rejected.
    #[instrument(skip(self))]
    pub async fn get_secret_value(&self, secret_id: &str) -> Result<SecretString, SecretsError> {
        let payload = serde_json::to_vec(&GetSecretValueRequest { secret_id })?;
        let mut request = HttpRequest::post(self.endpoint.as_str())
            .header("x-amz-target", "secretsmanager.GetSecretValue")
            .body(CONTENT_TYPE, payload);

        if let Some(credentials) = &self.credentials {
            request = sigv4::sign(request, credentials, &self.region, SERVICE)?;
        }

        let response = self.session.send(request).await?;

        if !response.is_success() {
            let (code, message) = match response.json::<ErrorBody>() {
                Ok(body) => (
                    body.kind
                        .map(|kind| kind.rsplit('#').next().unwrap_or(&kind).to_string()),
                    sanitize_error_body(body.message.as_deref().unwrap_or("unknown")),
                ),
                Err(_) => (None, sanitize_error_body(&response.text())),
            };
            return Err(SecretsError::RequestFailed {
                secret_id: secret_id.to_string(),
                status: response.status,
                code,
                message,
            });
        }

        let body: GetSecretValueResponse = response
            .json()
            .map_err(|e| SecretsError::InvalidResponse(e.to_string()))?;

        body.secret_string
            .map(SecretString::from)
            .ok_or_else(|| SecretsError::NotAString(secret_id.to_string()))
    }
}
