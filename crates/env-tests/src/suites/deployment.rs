//! Readiness of every service target in deployment order.

use crate::profile::EnvironmentProfile;
use crate::readiness::ReadinessCheck;
use crate::sequence::Sequence;
use crate::targets::ServiceTarget;

pub const SEQUENCE_NAME: &str = "deployment_order";

/// One `<target>_ready` step per target, edge first, Tax Engine last.
pub fn sequence(profile: &EnvironmentProfile) -> Sequence {
    ServiceTarget::deployment_order(profile)
        .into_iter()
        .fold(Sequence::new(SEQUENCE_NAME), |sequence, target| {
            let name = format!("{}_ready", target.name());
            sequence.step(ReadinessCheck::new(name, target))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::SkipReason;
    use crate::report::Outcome;
    use crate::session::Session;
    use crate::testing::{profile, RecordingTransport};
    use crate::transport::HttpResponse;
    use std::sync::Arc;

    #[test]
    fn test_steps_follow_deployment_order() {
        let sequence = sequence(&profile(&[]));

        assert_eq!(
            sequence.case_names(),
            [
                "deployment_order::aws_edge_ready",
                "deployment_order::search_index_ready",
                "deployment_order::relational_store_ready",
                "deployment_order::knox_ready",
                "deployment_order::alchemy_ready",
                "deployment_order::heimdall_ready",
                "deployment_order::tax_engine_ready",
            ]
        );
    }

    #[tokio::test]
    async fn test_unready_knox_skips_later_targets_without_requests() {
        let transport = Arc::new(RecordingTransport::responding(|request| {
            if request.url.starts_with("http://knox.test") {
                Ok(HttpResponse::new(503, ""))
            } else {
                Ok(HttpResponse::new(200, r#"{"services": {}, "status": "yellow"}"#))
            }
        }));
        let session = Session::with_transport(
            profile(&[("YONDA_ENABLE_SMOKE", "1"), ("YONDA_PROBE_ATTEMPTS", "2")]),
            transport.clone(),
        );

        let reports = sequence(session.profile()).run(&session).await;

        let outcomes: Vec<_> = reports.iter().map(|r| &r.outcome).collect();
        assert_eq!(outcomes[..3], [&Outcome::Passed, &Outcome::Passed, &Outcome::Passed]);
        assert!(outcomes[3].is_failure());
        let upstream = Outcome::Skipped(SkipReason::UpstreamFailed {
            check: "deployment_order::knox_ready".to_string(),
        });
        for outcome in &outcomes[4..] {
            assert_eq!(*outcome, &upstream);
        }

        // Three passing probes plus two attempts against Knox; nothing after it.
        let urls = transport.urls();
        assert_eq!(urls.len(), 5);
        assert!(urls.iter().all(|url| !url.contains("alchemy")
            && !url.contains("heimdall")
            && !url.contains("tax_engine")));
    }
}
