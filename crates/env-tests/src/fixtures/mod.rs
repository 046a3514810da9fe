//! Typed clients for the services under test.
//!
//! Fixtures borrow the session's shared transport; none of them owns a
//! network client.

pub mod knox;
pub mod secrets;
pub mod sigv4;
pub mod sqs;

pub use knox::KnoxClient;
pub use secrets::SecretsManagerClient;
pub use sqs::SqsClient;
