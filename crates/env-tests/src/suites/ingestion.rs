//! Knox ingestion flow.
//!
//! Publishes a batch of NTDV1 messages to the Knox ingestion queue, then polls
//! Knox search until every published transaction is returned. The two steps
//! share the batch through [`IngestionState`]; the search step never runs
//! unless publishing succeeded.

use crate::check::{Check, CheckError};
use crate::eventual::{wait_until, EventualError, Observation, PollSchedule};
use crate::fixtures::knox::{KnoxClient, KnoxClientError, SearchRequest};
use crate::fixtures::sqs::{BatchEntry, SqsClient, SqsError, MAX_BATCH_ENTRIES};
use crate::profile::EnvironmentProfile;
use crate::sequence::Sequence;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{BatchId, OrganizationId, TransactionId};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::info;

pub const SEQUENCE_NAME: &str = "knox_ingestion";

/// Messages published per run.
pub const TOTAL_MESSAGES: usize = 100;

const BUNDLED_TEMPLATE: &str = include_str!("../../fixtures/ntdv1-message.json");

/// Template problems.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read NTDV1 template {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("NTDV1 template is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NTDV1 template is missing '{0}'")]
    MissingField(&'static str),
}

/// Sizes and timing of the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionSettings {
    pub total_messages: usize,
    pub chunk_size: usize,
    pub schedule: PollSchedule,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            total_messages: TOTAL_MESSAGES,
            chunk_size: MAX_BATCH_ENTRIES,
            schedule: PollSchedule::KNOX_INGESTION,
        }
    }
}

/// A batch of messages ready to publish.
#[derive(Debug, Clone)]
pub struct IngestionBatch {
    pub organization_id: OrganizationId,
    pub batch_id: BatchId,
    pub messages: Vec<Value>,
    pub transaction_ids: Vec<TransactionId>,
}

/// State shared by the steps of one flow.
#[derive(Debug)]
pub struct IngestionState {
    settings: IngestionSettings,
    batch: OnceLock<IngestionBatch>,
    published: AtomicBool,
}

impl IngestionState {
    pub fn new(settings: IngestionSettings) -> Self {
        Self {
            settings,
            batch: OnceLock::new(),
            published: AtomicBool::new(false),
        }
    }

    pub fn batch(&self) -> Option<&IngestionBatch> {
        self.batch.get()
    }

    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::SeqCst)
    }
}

/// The flow with the default settings.
pub fn sequence() -> Sequence {
    sequence_with(IngestionSettings::default())
}

pub fn sequence_with(settings: IngestionSettings) -> Sequence {
    let state = Arc::new(IngestionState::new(settings));
    Sequence::new(SEQUENCE_NAME)
        .step(PublishMessages {
            state: Arc::clone(&state),
        })
        .step(SearchPublished { state })
}

/// Template from `NTDV1_TEMPLATE_PATH`, or the bundled one.
pub fn load_template(profile: &EnvironmentProfile) -> Result<Value, TemplateError> {
    let text = match profile.template_path() {
        Some(path) => std::fs::read_to_string(path).map_err(|e| TemplateError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        None => BUNDLED_TEMPLATE.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

/// Build `count` messages from `template`.
///
/// Every message gets a fresh record suffix (returned as its transaction id),
/// the batch and organization ids, current timestamps, numbered order and
/// customer ids, and per-line ids.
pub fn build_batch(
    template: &Value,
    organization_id: &OrganizationId,
    batch_id: &BatchId,
    count: usize,
    now: DateTime<Utc>,
) -> Result<IngestionBatch, TemplateError> {
    let metadata = template
        .get("transaction_data")
        .and_then(|data| data.get("metadata"))
        .and_then(Value::as_object)
        .ok_or(TemplateError::MissingField("transaction_data.metadata"))?;
    let base_order_number = metadata
        .get("order_number")
        .and_then(Value::as_str)
        .unwrap_or("ORDER")
        .to_string();
    let base_customer_id = metadata
        .get("customer_id")
        .and_then(Value::as_str)
        .unwrap_or("CUSTOMER")
        .to_string();
    let timestamp = format_timestamp(now);

    let mut messages = Vec::with_capacity(count);
    let mut transaction_ids = Vec::with_capacity(count);

    for index in 0..count {
        let suffix = TransactionId::new();
        let mut message = template.clone();
        let root = message
            .as_object_mut()
            .ok_or(TemplateError::MissingField("id"))?;

        set(root, "id", format!("{}|{}", organization_id, suffix));

        if let Some(data) = root.get_mut("transaction_data").and_then(Value::as_object_mut) {
            set(data, "transaction_date", timestamp.as_str());

            if let Some(metadata) = data.get_mut("metadata").and_then(Value::as_object_mut) {
                set(metadata, "organization_id", organization_id.to_string());
                set(metadata, "batch_id", batch_id.to_string());
                set(metadata, "batch_date", timestamp.as_str());
                set(metadata, "order_number", format!("{}-{:04}", base_order_number, index));
                set(metadata, "customer_id", format!("{}-{:04}", base_customer_id, index));
                set(
                    metadata,
                    "meta_integration_id",
                    format!("integration-{}", organization_id),
                );
            }
        }

        if let Some(items) = root.get_mut("line_item_data").and_then(Value::as_array_mut) {
            for (line_index, item) in items.iter_mut().enumerate() {
                let Some(item) = item.as_object_mut() else {
                    continue;
                };
                let metadata = item
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(metadata) = metadata.as_object_mut() {
                    set(metadata, "line_id", format!("{}-line-{}", suffix, line_index));
                }
            }
        }

        messages.push(message);
        transaction_ids.push(suffix);
    }

    Ok(IngestionBatch {
        organization_id: *organization_id,
        batch_id: batch_id.clone(),
        messages,
        transaction_ids,
    })
}

fn set(map: &mut Map<String, Value>, key: &str, value: impl Into<Value>) {
    map.insert(key.to_string(), value.into());
}

/// UTC, whole seconds, `Z` suffix.
fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Step 1: build the batch and publish it in chunks.
struct PublishMessages {
    state: Arc<IngestionState>,
}

#[async_trait]
impl Check for PublishMessages {
    fn name(&self) -> &str {
        "publish_ntdv1_messages"
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        let profile = session.profile();
        let settings = self.state.settings;

        let batch = match self.state.batch.get() {
            Some(batch) => batch,
            None => {
                let organization_id = profile.test_organization_id().ok_or_else(|| {
                    CheckError::Precondition(
                        "TEST_ORGANIZATION_ID must be set outside local".to_string(),
                    )
                })?;
                let template = load_template(profile)
                    .map_err(|e| CheckError::Precondition(e.to_string()))?;
                let built = build_batch(
                    &template,
                    &organization_id,
                    &BatchId::new(),
                    settings.total_messages,
                    Utc::now(),
                )
                .map_err(|e| CheckError::Precondition(e.to_string()))?;
                self.state.batch.get_or_init(|| built)
            }
        };

        let sqs = SqsClient::new(session);
        let queue_url = sqs.resolve_queue(profile.ingestion_queue()).await?;
        let chunk_size = settings.chunk_size.clamp(1, MAX_BATCH_ENTRIES);

        for (chunk_index, chunk) in batch.messages.chunks(chunk_size).enumerate() {
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(offset, message)| {
                    Ok(BatchEntry {
                        id: (chunk_index * chunk_size + offset).to_string(),
                        message_body: serde_json::to_string(message)?,
                    })
                })
                .collect::<Result<Vec<_>, serde_json::Error>>()
                .map_err(SqsError::from)?;

            sqs.send_message_batch(&queue_url, &entries).await?;
        }

        self.state.published.store(true, Ordering::SeqCst);
        info!(
            batch_id = %batch.batch_id,
            organization_id = %batch.organization_id,
            messages = batch.messages.len(),
            "NTDV1 batch published"
        );
        Ok(())
    }
}

/// Step 2: every published transaction shows up in Knox search.
struct SearchPublished {
    state: Arc<IngestionState>,
}

#[async_trait]
impl Check for SearchPublished {
    fn name(&self) -> &str {
        "knox_search_returns_published_transactions"
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        let batch = match self.state.batch() {
            Some(batch) if self.state.is_published() => batch,
            _ => {
                return Err(CheckError::Precondition(
                    "NTDV1 batch must be published before polling Knox".to_string(),
                ))
            }
        };

        let knox = KnoxClient::connect(session).await?;
        let request = SearchRequest::for_batch(
            &batch.organization_id,
            &batch.batch_id,
            batch.transaction_ids.len(),
        );
        let expected: BTreeSet<&str> = batch
            .transaction_ids
            .iter()
            .map(|id| id.0.as_str())
            .collect();

        let (knox, request, expected_ref) = (&knox, &request, &expected);
        let result = wait_until(self.state.settings.schedule, move || async move {
            let response = knox.search_transactions(request).await?;
            let received = response.transaction_ids();
            let found = expected_ref.iter().filter(|id| received.contains(*id)).count();

            Ok::<_, KnoxClientError>(if found == expected_ref.len() {
                Observation::Ready(found)
            } else {
                Observation::Pending(format!(
                    "observed {} of {} transactions",
                    found,
                    expected_ref.len()
                ))
            })
        })
        .await;

        match result {
            Ok(found) => {
                info!(batch_id = %batch.batch_id, found, "All published transactions found");
                Ok(())
            }
            Err(EventualError::Timeout { timeout, last, .. }) => Err(CheckError::Assertion(format!(
                "expected {} transactions for batch {} within {:?}, {}",
                expected.len(),
                batch.batch_id,
                timeout,
                last
            ))),
            Err(EventualError::Inner(e)) => Err(e.into()),
        }
    }
}
