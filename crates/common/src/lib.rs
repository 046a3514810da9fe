//! Common utilities and types shared across the Yonda verification harness.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for redacting credentials from response bodies
pub mod redact;

/// Module for identifier types used by the ingestion fixtures
pub mod types;
