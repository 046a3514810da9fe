//! Environment Verification Harness
//!
//! This crate verifies that the services of a Yonda environment (the AWS API
//! edge, the search index, the relational store and the Knox, Alchemy,
//! Heimdall and Tax Engine services) are reachable and minimally functional
//! in `local`, `dev` or `prod`.
//!
//! # Features
//!
//! - `smoke`: Fast reachability checks (30s)
//! - `incremental`: Dependency-ordered readiness and the Knox ingestion flow (2min)
//! - `all`: Enable all test categories
//!
//! # Gating
//!
//! Nothing runs unless `YONDA_ENABLE_SMOKE` is set to `1`/`true`. Against
//! `prod`, `YONDA_ALLOW_PROD` must be set as well. Gated cases are reported
//! as skipped, never as failed.
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 env-tests (no default features)
//! cargo test
//!
//! # Smoke tests against the local stack
//! YONDA_ENABLE_SMOKE=1 cargo test -p env-tests --features smoke
//!
//! # Full suite against dev, variables exported from the dev env file
//! cargo run -p env-tests -- --env-file env/dev.env --tier all
//! ```

pub mod check;
pub mod eventual;
pub mod fixtures;
pub mod gate;
pub mod plan;
pub mod profile;
pub mod readiness;
pub mod report;
pub mod runner;
pub mod sequence;
pub mod session;
pub mod suites;
pub mod targets;
pub mod tier;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use profile::{ConfigError, Environment, EnvironmentProfile};
pub use report::SessionReport;
pub use session::{run_session, Session};
pub use tier::{Selection, Tier};
