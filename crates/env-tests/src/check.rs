//! The unit of work executed by a session.

use crate::fixtures::knox::KnoxClientError;
use crate::fixtures::sqs::SqsError;
use crate::readiness::ReadinessFailure;
use crate::session::Session;
use crate::transport::TransportError;
use async_trait::async_trait;
use thiserror::Error;

/// A single check against the environment.
///
/// Checks borrow the session (and through it the shared client); they never
/// own network resources.
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, session: &Session) -> Result<(), CheckError>;
}

/// Why a check body failed.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Readiness(#[from] ReadinessFailure),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Knox {0}")]
    Knox(KnoxClientError),

    #[error("SQS {0}")]
    Sqs(#[from] SqsError),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Missing precondition: {0}")]
    Precondition(String),

    #[error("Check panicked: {0}")]
    Panicked(String),
}

impl From<KnoxClientError> for CheckError {
    fn from(err: KnoxClientError) -> Self {
        match err {
            KnoxClientError::MissingApiKey => CheckError::Precondition(err.to_string()),
            other => CheckError::Knox(other),
        }
    }
}

/// Coarse classification of a failure, kept in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Readiness,
    Transport,
    Client,
    Assertion,
    Panicked,
}

impl CheckError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CheckError::Readiness(_) => FailureKind::Readiness,
            CheckError::Transport(_) => FailureKind::Transport,
            CheckError::Knox(_) | CheckError::Sqs(_) => FailureKind::Client,
            CheckError::Assertion(_) | CheckError::Precondition(_) => FailureKind::Assertion,
            CheckError::Panicked(_) => FailureKind::Panicked,
        }
    }
}
