//! The concrete cases of the harness.
//!
//! - [`smoke`]: independent reachability checks, one case each.
//! - [`deployment`]: readiness of every target in deployment order.
//! - [`ingestion`]: publish NTDV1 messages and find them in Knox.

pub mod deployment;
pub mod ingestion;
pub mod smoke;
