//! SQS client fixture over the shared session transport.
//!
//! Speaks the AWS JSON 1.0 protocol (`X-Amz-Target: AmazonSQS.<Action>`).
//! Requests are SigV4-signed when the profile carries AWS credentials; the
//! local emulation layer accepts unsigned requests.

use crate::fixtures::sigv4::{self, AwsCredentials, SigningError};
use crate::profile::{join_url, QueueRef};
use crate::session::Session;
use crate::transport::{HttpRequest, TransportError};
use common::redact::sanitize_error_body;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Most entries SQS accepts in one `SendMessageBatch` call.
pub const MAX_BATCH_ENTRIES: usize = 10;

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const SERVICE: &str = "sqs";

/// SQS client errors.
#[derive(Debug, Error)]
pub enum SqsError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("{action} failed with status {status} ({}): {message}", .code.as_deref().unwrap_or("unknown"))]
    RequestFailed {
        action: &'static str,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("queue '{0}' does not exist; set KNOX_INGESTION_QUEUE_URL or KNOX_INGESTION_QUEUE_NAME")]
    QueueDoesNotExist(String),

    #[error("failed to enqueue {failed} of {total} messages: {details}")]
    BatchFailed {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("batch of {0} entries exceeds the limit of {}", MAX_BATCH_ENTRIES)]
    BatchTooLarge(usize),

    #[error("invalid {action} response: {reason}")]
    InvalidResponse { action: &'static str, reason: String },

    #[error("request serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One `SendMessageBatch` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchEntry {
    pub id: String,
    pub message_body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueUrlRequest<'a> {
    queue_name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueUrlResponse {
    queue_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: &'a [BatchEntry],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchResponse {
    #[serde(default)]
    successful: Vec<serde_json::Value>,
    #[serde(default)]
    failed: Vec<BatchFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BatchFailure {
    id: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Client for the SQS API of the AWS edge.
pub struct SqsClient<'a> {
    session: &'a Session,
    endpoint: String,
    region: String,
    credentials: Option<AwsCredentials>,
}

impl<'a> SqsClient<'a> {
    /// Client for the profile's AWS edge.
    pub fn new(session: &'a Session) -> Self {
        let profile = session.profile();
        Self {
            session,
            endpoint: join_url(profile.base_url(), "/"),
            region: profile.aws_region().to_string(),
            credentials: AwsCredentials::from_profile(profile),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_signing(&self) -> bool {
        self.credentials.is_some()
    }

    /// Resolve a queue reference to its URL.
    pub async fn resolve_queue(&self, queue: &QueueRef) -> Result<String, SqsError> {
        match queue {
            QueueRef::Url(url) => Ok(url.clone()),
            QueueRef::Name(name) => self.get_queue_url(name).await,
        }
    }

    /// `GetQueueUrl`.
    #[instrument(skip(self))]
    pub async fn get_queue_url(&self, queue_name: &str) -> Result<String, SqsError> {
        let result: Result<GetQueueUrlResponse, SqsError> = self
            .call("GetQueueUrl", &GetQueueUrlRequest { queue_name })
            .await;

        match result {
            Ok(response) => Ok(response.queue_url),
            Err(SqsError::RequestFailed { code: Some(code), .. }) if is_missing_queue(&code) => {
                Err(SqsError::QueueDoesNotExist(queue_name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// `SendMessageBatch`. Any failed entry fails the whole call.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[BatchEntry],
    ) -> Result<(), SqsError> {
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(SqsError::BatchTooLarge(entries.len()));
        }

        let response: SendMessageBatchResponse = self
            .call("SendMessageBatch", &SendMessageBatchRequest { queue_url, entries })
            .await?;

        if !response.failed.is_empty() {
            let details = response
                .failed
                .iter()
                .map(|entry| {
                    format!(
                        "{}: {}",
                        entry.id,
                        entry
                            .message
                            .as_deref()
                            .or(entry.code.as_deref())
                            .unwrap_or("unknown")
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SqsError::BatchFailed {
                failed: response.failed.len(),
                total: entries.len(),
                details,
            });
        }

        debug!(sent = response.successful.len(), "Batch enqueued");
        Ok(())
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        action: &'static str,
        payload: &Req,
    ) -> Result<Resp, SqsError> {
        let mut request = HttpRequest::post(self.endpoint.as_str())
            .header("x-amz-target", format!("AmazonSQS.{}", action))
            .body(CONTENT_TYPE, serde_json::to_vec(payload)?);

        if let Some(credentials) = &self.credentials {
            request = sigv4::sign(request, credentials, &self.region, SERVICE)?;
        }

        let response = self.session.send(request).await?;

        if !response.is_success() {
            let (code, message) = match response.json::<ErrorBody>() {
                Ok(body) => (
                    body.kind.map(|kind| error_code(&kind).to_string()),
                    body.message
                        .map(|message| sanitize_error_body(&message))
                        .unwrap_or_else(|| sanitize_error_body(&response.text())),
                ),
                Err(_) => (None, sanitize_error_body(&response.text())),
            };
            return Err(SqsError::RequestFailed {
                action,
                status: response.status,
                code,
                message,
            });
        }

        response.json().map_err(|e| SqsError::InvalidResponse {
            action,
            reason: e.to_string(),
        })
    }
}

/// Error code from a `__type` value such as `com.amazonaws.sqs#QueueDoesNotExist`.
fn error_code(kind: &str) -> &str {
    kind.rsplit('#').next().unwrap_or(kind)
}

fn is_missing_queue(code: &str) -> bool {
    matches!(
        code,
        "QueueDoesNotExist" | "AWS.SimpleQueueService.NonExistentQueue"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::EnvironmentProfile;
    use std::collections::HashMap;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn session_for(server: &MockServer, extra: &[(&str, &str)]) -> Session {
        let mut vars = HashMap::from([("YONDA_BASE_URL".to_string(), server.uri())]);
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }
        Session::open(EnvironmentProfile::from_vars(&vars).unwrap()).unwrap()
    }

    fn entries(count: usize) -> Vec<BatchEntry> {
        (0..count)
            .map(|i| BatchEntry {
                id: i.to_string(),
                message_body: format!("{{\"n\":{}}}", i),
            })
            .collect()
    }

    #[test]
    fn test_error_code_strips_namespace() {
        assert_eq!(error_code("com.amazonaws.sqs#QueueDoesNotExist"), "QueueDoesNotExist");
        assert_eq!(error_code("InvalidParameterValue"), "InvalidParameterValue");
    }

    #[test]
    fn test_batch_entry_serialization() {
        let json = serde_json::to_value(&entries(1)[0]).unwrap();
        assert_eq!(json, serde_json::json!({"Id": "0", "MessageBody": "{\"n\":0}"}));
    }

    #[tokio::test]
    async fn test_get_queue_url_unsigned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-amz-target", "AmazonSQS.GetQueueUrl"))
            .and(header("content-type", CONTENT_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "QueueUrl": "http://localhost:4566/000000000000/local-stack-source-ntd-queue"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server, &[]);
        let client = SqsClient::new(&session);
        assert!(!client.is_signing());

        let url = client
            .get_queue_url("local-stack-source-ntd-queue")
            .await
            .unwrap();
        assert!(url.ends_with("/local-stack-source-ntd-queue"));

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body, serde_json::json!({"QueueName": "local-stack-source-ntd-queue"}));
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_signed_when_credentials_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"QueueUrl": "http://queue"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(
            &server,
            &[
                ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
                ("AWS_SECRET_ACCESS_KEY", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
            ],
        );
        let client = SqsClient::new(&session);
        assert!(client.is_signing());

        client.get_queue_url("q").await.unwrap();

        let received = server.received_requests().await.unwrap();
        let authorization = received[0]
            .headers
            .get("authorization")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/sqs/aws4_request"));
    }

    #[tokio::test]
    async fn test_missing_queue_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "__type": "com.amazonaws.sqs#QueueDoesNotExist",
                "message": "The specified queue does not exist."
            })))
            .mount(&server)
            .await;

        let session = session_for(&server, &[]);
        let err = SqsClient::new(&session)
            .get_queue_url("knox-ingestion-source-ntd-queue")
            .await
            .unwrap_err();

        assert!(matches!(err, SqsError::QueueDoesNotExist(ref name) if name == "knox-ingestion-source-ntd-queue"));
        assert!(err.to_string().contains("KNOX_INGESTION_QUEUE_URL"));
    }

    #[tokio::test]
    async fn test_resolve_queue_url_skips_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session_for(&server, &[]);
        let url = SqsClient::new(&session)
            .resolve_queue(&QueueRef::Url("http://queue/direct".to_string()))
            .await
            .unwrap();

        assert_eq!(url, "http://queue/direct");
    }

    #[tokio::test]
    async fn test_send_message_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-amz-target", "AmazonSQS.SendMessageBatch"))
            .respond_with(|request: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                let successful: Vec<_> = body["Entries"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|entry| serde_json::json!({"Id": entry["Id"], "MessageId": "m"}))
                    .collect();
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Successful": successful, "Failed": []}))
            })
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server, &[]);
        SqsClient::new(&session)
            .send_message_batch("http://queue", &entries(10))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["QueueUrl"], "http://queue");
        assert_eq!(body["Entries"].as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_partial_batch_failure_lists_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Successful": [{"Id": "0", "MessageId": "m"}],
                "Failed": [{"Id": "1", "SenderFault": true, "Code": "InvalidMessageContents", "Message": "bad body"}]
            })))
            .mount(&server)
            .await;

        let session = session_for(&server, &[]);
        let err = SqsClient::new(&session)
            .send_message_batch("http://queue", &entries(2))
            .await
            .unwrap_err();

        match err {
            SqsError::BatchFailed { failed, total, details } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
                assert_eq!(details, "1: bad body");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_without_request() {
        let server = MockServer::start().await;
        let session = session_for(&server, &[]);

        let err = SqsClient::new(&session)
            .send_message_batch("http://queue", &entries(11))
            .await
            .unwrap_err();

        assert!(matches!(err, SqsError::BatchTooLarge(11)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
