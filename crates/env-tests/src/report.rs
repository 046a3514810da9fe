//! Per-case outcomes and the session summary.

use crate::check::FailureKind;
use crate::gate::SkipReason;
use crate::profile::Environment;
use crate::tier::Tier;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed { kind: FailureKind, message: String },
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed { message, .. } => write!(f, "FAILED: {}", message),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

/// Report of one executed or skipped case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub tier: Tier,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl CaseReport {
    pub fn skipped(name: impl Into<String>, tier: Tier, reason: SkipReason) -> Self {
        Self {
            name: name.into(),
            tier,
            outcome: Outcome::Skipped(reason),
            elapsed: Duration::ZERO,
        }
    }
}

/// All case reports of one session, in execution order.
#[derive(Debug, Clone)]
pub struct SessionReport {
    environment: Environment,
    cases: Vec<CaseReport>,
}

impl SessionReport {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            cases: Vec::new(),
        }
    }

    pub fn push(&mut self, case: CaseReport) {
        self.cases.push(case);
    }

    pub fn extend(&mut self, cases: impl IntoIterator<Item = CaseReport>) {
        self.cases.extend(cases);
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn cases(&self) -> &[CaseReport] {
        &self.cases
    }

    /// Case by full name.
    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|case| case.name == name)
    }

    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::is_skip)
    }

    /// True when any non-skipped case failed.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.cases
            .iter()
            .filter(|case| predicate(&case.outcome))
            .count()
    }

    /// Emit one log line per case and a summary line.
    pub fn log_summary(&self) {
        for case in &self.cases {
            match &case.outcome {
                Outcome::Passed => info!(
                    case = %case.name,
                    tier = %case.tier,
                    elapsed_ms = case.elapsed.as_millis() as u64,
                    "passed"
                ),
                Outcome::Failed { kind, message } => error!(
                    case = %case.name,
                    tier = %case.tier,
                    kind = ?kind,
                    "failed: {}",
                    message
                ),
                Outcome::Skipped(reason) => {
                    warn!(case = %case.name, tier = %case.tier, "skipped: {}", reason)
                }
            }
        }

        info!(
            environment = %self.environment,
            passed = self.passed(),
            failed = self.failed(),
            skipped = self.skipped(),
            "Session finished"
        );
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for case in &self.cases {
            writeln!(f, "[{}] {} ... {}", case.tier, case.name, case.outcome)?;
        }
        write!(
            f,
            "{}: {} passed, {} failed, {} skipped",
            self.environment,
            self.passed(),
            self.failed(),
            self.skipped()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(name: &str, outcome: Outcome) -> CaseReport {
        CaseReport {
            name: name.to_string(),
            tier: Tier::Smoke,
            outcome,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_skips_are_not_failures() {
        let mut report = SessionReport::new(Environment::Local);
        report.push(case("smoke::knox_health", Outcome::Passed));
        report.push(case(
            "smoke::alchemy_health",
            Outcome::Skipped(SkipReason::SmokeDisabled),
        ));

        assert!(!report.has_failures());
        assert_eq!(report.passed(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn test_failure_counted() {
        let mut report = SessionReport::new(Environment::Dev);
        report.push(case(
            "smoke::aws_edge_health",
            Outcome::Failed {
                kind: FailureKind::Readiness,
                message: "aws_edge not ready".to_string(),
            },
        ));

        assert!(report.has_failures());
        assert_eq!(report.failed(), 1);
        assert!(report.case("smoke::aws_edge_health").is_some());
        assert!(report.case("smoke::missing").is_none());
    }

    #[test]
    fn test_display_lists_cases_and_totals() {
        let mut report = SessionReport::new(Environment::Local);
        report.push(case("smoke::knox_health", Outcome::Passed));

        let rendered = report.to_string();
        assert!(rendered.contains("[smoke] smoke::knox_health ... passed"));
        assert!(rendered.ends_with("local: 1 passed, 0 failed, 0 skipped"));
    }
}
