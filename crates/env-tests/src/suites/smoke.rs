//! Smoke tier: fast, independent reachability checks.

use crate::check::{Check, CheckError};
use crate::fixtures::{KnoxClient, SqsClient};
use crate::profile::EnvironmentProfile;
use crate::readiness::{probe_all, retry_until_ready, NotReady, ReadinessCheck};
use crate::session::Session;
use crate::targets::{ServiceTarget, TargetKind};
use async_trait::async_trait;
use tracing::info;

/// Smoke checks for `profile`: one health case per target, then the queue and
/// concurrency checks.
pub fn checks(profile: &EnvironmentProfile) -> Vec<Box<dyn Check>> {
    let mut checks: Vec<Box<dyn Check>> = ServiceTarget::deployment_order(profile)
        .into_iter()
        .map(|target| -> Box<dyn Check> {
            match target.kind {
                TargetKind::Knox => Box::new(KnoxHealthCheck),
                _ => Box::new(ReadinessCheck::new(format!("{}_health", target.name()), target)),
            }
        })
        .collect();

    checks.push(Box::new(QueueExistsCheck));
    checks.push(Box::new(ConcurrentReachabilityCheck));
    checks
}

/// Knox health through the authenticated client, retried like every other
/// readiness probe.
pub struct KnoxHealthCheck;

#[async_trait]
impl Check for KnoxHealthCheck {
    fn name(&self) -> &str {
        "knox_health"
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        let knox = KnoxClient::connect(session).await?;
        let knox = &knox;

        retry_until_ready(session.profile().probe(), TargetKind::Knox, move || async move {
            knox.health().await.map_err(NotReady::from)
        })
        .await?;
        Ok(())
    }
}

/// The Knox ingestion queue resolves to a URL.
pub struct QueueExistsCheck;

#[async_trait]
impl Check for QueueExistsCheck {
    fn name(&self) -> &str {
        "knox_ingestion_queue_exists"
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        let url = SqsClient::new(session)
            .resolve_queue(session.profile().ingestion_queue())
            .await?;
        info!(queue_url = %url, "Ingestion queue resolved");
        Ok(())
    }
}

/// Every target answers when probed at the same time over the shared pool.
pub struct ConcurrentReachabilityCheck;

#[async_trait]
impl Check for ConcurrentReachabilityCheck {
    fn name(&self) -> &str {
        "targets_reachable_concurrently"
    }

    async fn run(&self, session: &Session) -> Result<(), CheckError> {
        let targets = ServiceTarget::deployment_order(session.profile());
        let results = probe_all(session, &targets).await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(_, result)| result.err().map(|failure| failure.to_string()))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CheckError::Assertion(format!(
                "{} of {} targets not ready: {}",
                failures.len(),
                targets.len(),
                failures.join("; ")
            )))
        }
    }
}
