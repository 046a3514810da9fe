//! Execution gate for test tiers.
//!
//! Decides, from the environment profile alone, whether a case of a given
//! tier may execute. A closed gate is a skip, never a failure, so runs without
//! the relevant flags stay green.
//!
//! | Tier        | Executes when                                               |
//! |-------------|-------------------------------------------------------------|
//! | smoke       | smoke enabled, and (not prod, or production opt-in)         |
//! | incremental | smoke enabled, and (not prod, or production opt-in)         |
//!
//! The production opt-in is a separate variable from the smoke flag: enabling
//! smoke never authorizes a run against `prod`.

use crate::profile::{
    Environment, EnvironmentProfile, PRODUCTION_OPT_IN_VAR, SMOKE_ENABLE_VAR,
};
use crate::tier::Tier;
use thiserror::Error;

/// Why a case was skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkipReason {
    /// Smoke tier without the smoke-enable flag.
    #[error("smoke disabled")]
    SmokeDisabled,

    /// Incremental tier without the smoke-enable flag.
    #[error("incremental disabled: {} is not set", SMOKE_ENABLE_VAR)]
    IncrementalDisabled,

    /// Any tier against `prod` without the production opt-in.
    #[error("production target requires {}", PRODUCTION_OPT_IN_VAR)]
    ProductionOptInMissing,

    /// An earlier check of the same ordered sequence failed.
    #[error("upstream check '{check}' failed")]
    UpstreamFailed { check: String },
}

/// Gate decision for one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Open,
    Closed(SkipReason),
}

/// Evaluate the gate for `tier` against the profile.
pub fn evaluate(tier: Tier, profile: &EnvironmentProfile) -> Gate {
    evaluate_flags(
        tier,
        profile.environment(),
        profile.smoke_enabled(),
        profile.production_opt_in(),
    )
}

/// Decision table over the raw inputs.
pub fn evaluate_flags(
    tier: Tier,
    environment: Environment,
    smoke_enabled: bool,
    production_opt_in: bool,
) -> Gate {
    if !smoke_enabled {
        return Gate::Closed(match tier {
            Tier::Smoke => SkipReason::SmokeDisabled,
            Tier::Incremental => SkipReason::IncrementalDisabled,
        });
    }

    if environment.is_production() && !production_opt_in {
        return Gate::Closed(SkipReason::ProductionOptInMissing);
    }

    Gate::Open
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIERS: [Tier; 2] = [Tier::Smoke, Tier::Incremental];
    const ENVIRONMENTS: [Environment; 3] = [Environment::Local, Environment::Dev, Environment::Prod];

    #[test]
    fn test_smoke_disabled_skips_smoke() {
        for environment in ENVIRONMENTS {
            for opt_in in [false, true] {
                assert_eq!(
                    evaluate_flags(Tier::Smoke, environment, false, opt_in),
                    Gate::Closed(SkipReason::SmokeDisabled)
                );
            }
        }
    }

    #[test]
    fn test_smoke_enabled_opens_outside_prod() {
        for tier in TIERS {
            for environment in [Environment::Local, Environment::Dev] {
                assert_eq!(evaluate_flags(tier, environment, true, false), Gate::Open);
            }
        }
    }

    #[test]
    fn test_prod_requires_opt_in_for_every_tier() {
        for tier in TIERS {
            assert_eq!(
                evaluate_flags(tier, Environment::Prod, true, false),
                Gate::Closed(SkipReason::ProductionOptInMissing)
            );
            assert_eq!(evaluate_flags(tier, Environment::Prod, true, true), Gate::Open);
        }
    }

    #[test]
    fn test_opt_in_alone_never_opens_gate() {
        for tier in TIERS {
            for environment in ENVIRONMENTS {
                assert_ne!(evaluate_flags(tier, environment, false, true), Gate::Open);
            }
        }
    }

    #[test]
    fn test_incremental_reason_names_missing_flag() {
        let Gate::Closed(reason) = evaluate_flags(Tier::Incremental, Environment::Dev, false, false)
        else {
            panic!("gate should be closed");
        };
        assert!(reason.to_string().contains("YONDA_ENABLE_SMOKE"));

        let Gate::Closed(reason) = evaluate_flags(Tier::Incremental, Environment::Prod, true, false)
        else {
            panic!("gate should be closed");
        };
        assert!(reason.to_string().contains("YONDA_ALLOW_PROD"));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::SmokeDisabled.to_string(), "smoke disabled");
        assert_eq!(
            SkipReason::IncrementalDisabled.to_string(),
            "incremental disabled: YONDA_ENABLE_SMOKE is not set"
        );
        assert_eq!(
            SkipReason::ProductionOptInMissing.to_string(),
            "production target requires YONDA_ALLOW_PROD"
        );
        assert_eq!(
            SkipReason::UpstreamFailed {
                check: "deployment_order::knox_ready".to_string()
            }
            .to_string(),
            "upstream check 'deployment_order::knox_ready' failed"
        );
    }
}
