//! Ordered groups of dependent checks.
//!
//! Steps of a sequence run in declaration order. Once a step fails, every
//! later step of the same sequence is reported as skipped with the failing
//! step named as the reason, and is never executed. Sequences are
//! independent of each other.

use crate::check::Check;
use crate::gate::{self, Gate, SkipReason};
use crate::report::CaseReport;
use crate::runner;
use crate::session::Session;
use crate::tier::Tier;
use tracing::{info, warn};

/// An ordered, incremental group of checks.
pub struct Sequence {
    name: String,
    steps: Vec<Box<dyn Check>>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    pub fn step(mut self, check: impl Check + 'static) -> Self {
        self.steps.push(Box::new(check));
        self
    }

    /// Append an already boxed step.
    pub fn boxed_step(mut self, check: Box<dyn Check>) -> Self {
        self.steps.push(check);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Full case names of the steps, in order.
    pub fn case_names(&self) -> Vec<String> {
        self.steps.iter().map(|step| self.case_name(step.as_ref())).collect()
    }

    fn case_name(&self, step: &dyn Check) -> String {
        format!("{}::{}", self.name, step.name())
    }

    /// Run the steps in order, cascading skips after the first failure.
    pub async fn run(&self, session: &Session) -> Vec<CaseReport> {
        if let Gate::Closed(reason) = gate::evaluate(Tier::Incremental, session.profile()) {
            return self
                .steps
                .iter()
                .map(|step| {
                    CaseReport::skipped(self.case_name(step.as_ref()), Tier::Incremental, reason.clone())
                })
                .collect();
        }

        info!(sequence = %self.name, steps = self.steps.len(), "Running sequence");

        let mut reports = Vec::with_capacity(self.steps.len());
        let mut failed: Option<String> = None;

        for step in &self.steps {
            let name = self.case_name(step.as_ref());

            if let Some(upstream) = &failed {
                reports.push(CaseReport::skipped(
                    name,
                    Tier::Incremental,
                    SkipReason::UpstreamFailed {
                        check: upstream.clone(),
                    },
                ));
                continue;
            }

            let report = runner::execute(name, Tier::Incremental, step.as_ref(), session).await;
            if report.outcome.is_failure() {
                warn!(sequence = %self.name, step = %report.name, "Step failed, skipping the rest");
                failed = Some(report.name.clone());
            }
            reports.push(report);
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Outcome;
    use crate::testing::{profile, RecordingTransport, StaticCheck};
    use std::sync::Arc;

    fn enabled_session() -> Session {
        Session::with_transport(
            profile(&[("YONDA_ENABLE_SMOKE", "1")]),
            Arc::new(RecordingTransport::ok()),
        )
    }

    #[tokio::test]
    async fn test_all_steps_pass_in_order() {
        let session = enabled_session();
        let sequence = Sequence::new("flow")
            .step(StaticCheck::passing("first"))
            .step(StaticCheck::passing("second"));

        let reports = sequence.run(&session).await;

        let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["flow::first", "flow::second"]);
        assert!(reports.iter().all(|r| r.outcome == Outcome::Passed));
    }

    #[tokio::test]
    async fn test_failure_cascades_to_later_steps() {
        let session = enabled_session();
        let first = Arc::new(StaticCheck::passing("aws_edge_ready"));
        let second = Arc::new(StaticCheck::failing("knox_ready", "status 503"));
        let third = Arc::new(StaticCheck::passing("alchemy_ready"));
        let fourth = Arc::new(StaticCheck::passing("heimdall_ready"));

        let sequence = Sequence::new("deployment_order")
            .step(first.clone())
            .step(second.clone())
            .step(third.clone())
            .step(fourth.clone());

        let reports = sequence.run(&session).await;

        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].outcome, Outcome::Passed);
        assert!(reports[1].outcome.is_failure());
        let upstream = SkipReason::UpstreamFailed {
            check: "deployment_order::knox_ready".to_string(),
        };
        assert_eq!(reports[2].outcome, Outcome::Skipped(upstream.clone()));
        assert_eq!(reports[3].outcome, Outcome::Skipped(upstream));

        assert_eq!(first.runs(), 1);
        assert_eq!(second.runs(), 1);
        assert_eq!(third.runs(), 0);
        assert_eq!(fourth.runs(), 0);
    }

    #[tokio::test]
    async fn test_sequences_are_independent() {
        let session = enabled_session();
        let broken = Sequence::new("a").step(StaticCheck::failing("one", "boom"));
        let healthy = Sequence::new("b").step(StaticCheck::passing("one"));

        let _ = broken.run(&session).await;
        let reports = healthy.run(&session).await;

        assert_eq!(reports[0].outcome, Outcome::Passed);
    }

    #[tokio::test]
    async fn test_closed_gate_skips_every_step() {
        let session = Session::with_transport(profile(&[]), Arc::new(RecordingTransport::ok()));
        let step = Arc::new(StaticCheck::passing("first"));
        let sequence = Sequence::new("flow").step(step.clone()).step(StaticCheck::passing("second"));

        let reports = sequence.run(&session).await;

        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|r| r.outcome == Outcome::Skipped(SkipReason::IncrementalDisabled)));
        assert_eq!(step.runs(), 0);
        assert_eq!(sequence.case_names(), ["flow::first", "flow::second"]);
    }
}
