//! The set of cases a session runs.

use crate::check::Check;
use crate::profile::EnvironmentProfile;
use crate::sequence::Sequence;
use crate::suites::{deployment, ingestion, smoke};

/// Smoke checks plus incremental sequences, in run order.
#[derive(Default)]
pub struct TestPlan {
    smoke: Vec<Box<dyn Check>>,
    incremental: Vec<Sequence>,
}

impl TestPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The harness's standard cases for `profile`.
    pub fn standard(profile: &EnvironmentProfile) -> Self {
        let mut plan = Self::new();
        for check in smoke::checks(profile) {
            plan.smoke.push(check);
        }
        plan.incremental(deployment::sequence(profile))
            .incremental(ingestion::sequence())
    }

    /// Add a smoke check.
    pub fn smoke(mut self, check: impl Check + 'static) -> Self {
        self.smoke.push(Box::new(check));
        self
    }

    /// Add an incremental sequence.
    pub fn incremental(mut self, sequence: Sequence) -> Self {
        self.incremental.push(sequence);
        self
    }

    pub fn smoke_checks(&self) -> &[Box<dyn Check>] {
        &self.smoke
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.incremental
    }
}
