//! Test tiers and tier selection.

use clap::ValueEnum;
use std::fmt;

/// Classification of a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Shallow reachability probes, cheap enough to run liberally.
    Smoke,
    /// Deeper checks that assume the whole dependency chain is deployed.
    Incremental,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Smoke => "smoke",
            Tier::Incremental => "incremental",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tiers a run selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Selection {
    Smoke,
    Incremental,
    All,
}

impl Selection {
    pub fn includes(&self, tier: Tier) -> bool {
        matches!(
            (self, tier),
            (Selection::All, _)
                | (Selection::Smoke, Tier::Smoke)
                | (Selection::Incremental, Tier::Incremental)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_includes() {
        assert!(Selection::All.includes(Tier::Smoke));
        assert!(Selection::All.includes(Tier::Incremental));
        assert!(Selection::Smoke.includes(Tier::Smoke));
        assert!(!Selection::Smoke.includes(Tier::Incremental));
        assert!(Selection::Incremental.includes(Tier::Incremental));
        assert!(!Selection::Incremental.includes(Tier::Smoke));
    }
}
