//! Readiness probes against service targets.
//!
//! A probe issues `GET <base><health_path>` up to `attempts` times. Each
//! attempt is bounded by `attempt_timeout`; between attempts the probe sleeps
//! `backoff_step * attempt` (linear backoff). A target is ready when an
//! attempt returns a 2xx status and the payload matches the target's
//! [`ReadinessExpectation`].

use crate::check::{Check, CheckError};
use crate::session::Session;
use crate::targets::{ReadinessExpectation, ServiceTarget, TargetKind};
use crate::transport::{HttpRequest, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

/// Default number of probe attempts.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 3;

/// Default linear backoff step.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Retry policy of a readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePolicy {
    pub attempts: u32,
    pub backoff_step: Duration,
    pub attempt_timeout: Duration,
}

impl ProbePolicy {
    /// Default attempts and backoff with the given per-attempt timeout.
    pub fn with_attempt_timeout(attempt_timeout: Duration) -> Self {
        Self {
            attempts: DEFAULT_PROBE_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
            attempt_timeout,
        }
    }

    /// Sleep after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Why a single attempt did not see a ready target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotReady {
    #[error("health endpoint returned status {0}")]
    Status(u16),

    #[error("unexpected health payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Transport(TransportError),
}

/// A target failed every probe attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{target} not ready after {attempts} attempt(s): {last}")]
pub struct ReadinessFailure {
    pub target: TargetKind,
    pub attempts: u32,
    pub last: NotReady,
}

impl ReadinessFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(&self.last, NotReady::Transport(e) if e.is_timeout())
    }
}

/// Probe one target until ready or out of attempts.
#[instrument(skip_all, fields(target = %target.kind))]
pub async fn probe(session: &Session, target: &ServiceTarget) -> Result<(), ReadinessFailure> {
    let url = target.health_url();
    let url = url.as_str();
    let expectation = target.expectation;

    retry_until_ready(session.profile().probe(), target.kind, move || {
        probe_once(session, url, expectation)
    })
    .await
}

/// Run `attempt` under `policy` until it reports ready or attempts run out.
///
/// Each attempt is bounded by the policy's attempt timeout. A released
/// session ends the loop immediately.
pub async fn retry_until_ready<F, Fut>(
    policy: &ProbePolicy,
    target: TargetKind,
    mut attempt: F,
) -> Result<(), ReadinessFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), NotReady>>,
{
    let attempts = policy.attempts.max(1);
    let mut performed = 0;
    let mut last = NotReady::Transport(TransportError::Released);

    for n in 1..=attempts {
        performed = n;

        let outcome = match timeout(policy.attempt_timeout, attempt()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(NotReady::Transport(TransportError::Timeout(
                policy.attempt_timeout,
            ))),
        };

        match outcome {
            Ok(()) => {
                debug!(attempt = n, "Target ready");
                return Ok(());
            }
            Err(NotReady::Transport(TransportError::Released)) => {
                last = NotReady::Transport(TransportError::Released);
                break;
            }
            Err(reason) => {
                warn!(attempt = n, attempts, %reason, "Target not ready");
                last = reason;
            }
        }

        if n < attempts {
            sleep(policy.delay_after(n)).await;
        }
    }

    Err(ReadinessFailure {
        target,
        attempts: performed,
        last,
    })
}

/// Probe several targets concurrently over the shared client.
///
/// Results are returned in the order of `targets`.
pub async fn probe_all(
    session: &Session,
    targets: &[ServiceTarget],
) -> Vec<(TargetKind, Result<(), ReadinessFailure>)> {
    let probes = targets.iter().map(|target| async move {
        (target.kind, probe(session, target).await)
    });

    futures::future::join_all(probes).await
}

async fn probe_once(
    session: &Session,
    url: &str,
    expectation: ReadinessExpectation,
) -> Result<(), NotReady> {
    let response = session
        .send(HttpRequest::get(url))
        .await
        .map_err(NotReady::Transport)?;

    if !response.is_success() {
        return Err(NotReady::Status(response.status));
    }

    check_payload(expectation, &response.body)
}

fn check_payload(expectation: ReadinessExpectation, body: &[u8]) -> Result<(), NotReady> {
    let parse = || {
        serde_json::from_slice::<Value>(body)
            .map_err(|e| NotReady::Payload(format!("invalid JSON: {}", e)))
    };

    match expectation {
        ReadinessExpectation::SuccessStatus => Ok(()),
        ReadinessExpectation::JsonKey(key) => {
            if parse()?.get(key).is_some() {
                Ok(())
            } else {
                Err(NotReady::Payload(format!("missing '{}'", key)))
            }
        }
        ReadinessExpectation::ClusterStatusNotRed => {
            match parse()?.get("status").and_then(Value::as_str) {
                Some("red") => Err(NotReady::Payload("cluster status is red".to_string())),
                Some(_) => Ok(()),
                None => Err(NotReady::Payload("missing 'status'".to_string())),
            }
        }
    }
}

/// Check that passes when its target is ready.
pub struct ReadinessCheck {
    name: String,
    target: ServiceTarget,
}

impl ReadinessCheck {
    pub fn new(name: impl Into<String>, target: ServiceTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }
}

#[async_trait]
impl Check for ReadinessCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        probe(session, &self.target).await?;
        Ok(())
    }
}
