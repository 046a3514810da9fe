//! Knox transaction service client fixture.
//!
//! Knox answers errors with an envelope of the form
//! `{"error": {"message": "...", "code": "..."}}`.

use crate::fixtures::secrets::{SecretsError, SecretsManagerClient};
use crate::profile::{join_url, Environment, KNOX_API_KEY_SECRET_VAR, KNOX_API_KEY_VAR};
use crate::readiness::NotReady;
use crate::session::Session;
use crate::targets::TargetKind;
use crate::transport::{HttpRequest, HttpResponse, TransportError};
use common::redact::sanitize_error_body;
use common::secret::{ExposeSecret, SecretString};
use common::types::{BatchId, OrganizationId};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, instrument};

/// Knox client errors.
#[derive(Debug, Error)]
pub enum KnoxClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request failed with status {status} ({}): {message}", .code.as_deref().unwrap_or("unknown"))]
    RequestFailed {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Knox endpoint is not configured")]
    NotConfigured,

    #[error("no Knox API key: set {} or {}", KNOX_API_KEY_VAR, KNOX_API_KEY_SECRET_VAR)]
    MissingApiKey,

    #[error("Knox API key lookup failed: {0}")]
    ApiKeyLookup(#[from] SecretsError),
}

impl From<KnoxClientError> for NotReady {
    fn from(err: KnoxClientError) -> Self {
        match err {
            KnoxClientError::Transport(e) => NotReady::Transport(e),
            KnoxClientError::RequestFailed { status, .. } => NotReady::Status(status),
            other => NotReady::Payload(other.to_string()),
        }
    }
}

/// Comparison operator of a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
}

/// One search filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filter {
    pub data: Vec<String>,
    pub operator: FilterOperator,
}

impl Filter {
    pub fn eq(value: impl Into<String>) -> Self {
        Self {
            data: vec![value.into()],
            operator: FilterOperator::Eq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchFilters {
    pub transaction_metadata_organization_id: Filter,
    pub transaction_metadata_batch_id: Filter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: usize,
}

/// Body of `POST /v1/transactions/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub filters: SearchFilters,
    pub pagination: Pagination,
}

impl SearchRequest {
    /// Transactions of one ingestion batch.
    pub fn for_batch(organization_id: &OrganizationId, batch_id: &BatchId, limit: usize) -> Self {
        Self {
            filters: SearchFilters {
                transaction_metadata_organization_id: Filter::eq(organization_id.to_string()),
                transaction_metadata_batch_id: Filter::eq(batch_id.to_string()),
            },
            pagination: Pagination { limit },
        }
    }
}

/// The fields of a search hit the harness looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionSummary {
    pub transaction_id: String,
}

/// Response of the search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Option<Vec<TransactionSummary>>,
}

impl SearchResponse {
    pub fn transactions(&self) -> &[TransactionSummary] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn transaction_ids(&self) -> BTreeSet<&str> {
        self.transactions()
            .iter()
            .map(|t| t.transaction_id.as_str())
            .collect()
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

/// Client for the Knox API.
pub struct KnoxClient<'a> {
    session: &'a Session,
    base_url: Url,
    health_url: String,
    api_key: Option<SecretString>,
}

impl<'a> KnoxClient<'a> {
    /// Client for the profile's Knox target, authenticated with the session's
    /// Knox API key.
    pub async fn connect(session: &'a Session) -> Result<Self, KnoxClientError> {
        let endpoint = session
            .profile()
            .target(TargetKind::Knox)
            .ok_or(KnoxClientError::NotConfigured)?;
        let api_key = session.knox_api_key().await?;

        Ok(Self {
            session,
            base_url: endpoint.base_url.clone(),
            health_url: endpoint.health_url(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET` on the profile's Knox health path.
    pub async fn health(&self) -> Result<(), KnoxClientError> {
        let response = self.send(HttpRequest::get(self.health_url.as_str())).await?;
        check_status(&response)
    }

    /// `POST /v1/transactions/search`.
    #[instrument(skip_all)]
    pub async fn search_transactions(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, KnoxClientError> {
        let request = HttpRequest::post(self.url("/v1/transactions/search")).json(request)?;
        let response = self.send(request).await?;
        handle_response(&response)
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, KnoxClientError> {
        let request = match &self.api_key {
            Some(key) => request.header("authorization", format!("Bearer {}", key.expose_secret())),
            None => request,
        };
        Ok(self.session.send(request).await?)
    }
}

/// Knox API key for a session.
///
/// `KNOX_API_KEY` wins everywhere. Outside `local` the key is otherwise read
/// from the Secrets Manager secret named by `KNOX_API_KEY_SECRET_NAME`; on
/// `local` Knox is called without a key.
pub async fn resolve_api_key(session: &Session) -> Result<Option<SecretString>, KnoxClientError> {
    let profile = session.profile();

    if let Some(key) = profile.credential(KNOX_API_KEY_VAR) {
        return Ok(Some(key.clone()));
    }

    if profile.environment() == Environment::Local {
        return Ok(None);
    }

    let secret_name = profile
        .knox_api_key_secret()
        .ok_or(KnoxClientError::MissingApiKey)?;
    let key = SecretsManagerClient::new(session)
        .get_secret_value(secret_name)
        .await?;

    info!(secret = %secret_name, "Knox API key read from Secrets Manager");
    Ok(Some(key))
}

fn check_status(response: &HttpResponse) -> Result<(), KnoxClientError> {
    if response.is_success() {
        return Ok(());
    }

    let envelope = response
        .json::<ErrorEnvelope>()
        .ok()
        .and_then(|envelope| envelope.error);
    let (code, message) = match envelope {
        Some(detail) => (
            detail.code,
            sanitize_error_body(detail.message.as_deref().unwrap_or("unknown")),
        ),
        None => (None, sanitize_error_body(&response.text())),
    };

    Err(KnoxClientError::RequestFailed {
        status: response.status,
        code,
        message,
    })
}

fn handle_response<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, KnoxClientError> {
    check_status(response)?;
    Ok(response.json()?)
}
