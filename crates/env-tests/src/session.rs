//! Session-scoped ownership of the shared HTTP client.
//!
//! A [`Session`] is created once per run from the resolved profile. It owns the
//! transport and lends it to every check by reference. The transport is
//! released exactly once: by an explicit [`Session::release`] or, failing
//! that, when the session is dropped. Dropping covers failing checks, panics
//! inside check bodies and cancellation of the future that owns the session.

use crate::fixtures::knox::{self, KnoxClientError};
use crate::plan::TestPlan;
use crate::profile::EnvironmentProfile;
use crate::report::SessionReport;
use crate::runner;
use crate::tier::{Selection, Tier};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportError};
use common::secret::SecretString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// One test session: the profile plus the shared client.
pub struct Session {
    profile: EnvironmentProfile,
    transport: Arc<dyn Transport>,
    released: AtomicBool,
    knox_api_key: OnceCell<Option<SecretString>>,
}

impl Session {
    /// Open a session with a pooled HTTP client built from the profile timeout.
    pub fn open(profile: EnvironmentProfile) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(profile.timeout())?;
        Ok(Self::with_transport(profile, Arc::new(transport)))
    }

    /// Open a session over an existing transport.
    pub fn with_transport(profile: EnvironmentProfile, transport: Arc<dyn Transport>) -> Self {
        info!(
            environment = %profile.environment(),
            base_url = %profile.base_url(),
            timeout_ms = profile.timeout().as_millis() as u64,
            smoke_enabled = profile.smoke_enabled(),
            production_opt_in = profile.production_opt_in(),
            "Session opened"
        );

        Self {
            profile,
            transport,
            released: AtomicBool::new(false),
            knox_api_key: OnceCell::new(),
        }
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        &self.profile
    }

    /// Send a request through the shared client.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if self.is_released() {
            return Err(TransportError::Released);
        }
        self.transport.execute(request).await
    }

    /// Knox API key, resolved on first use and kept for the session.
    pub async fn knox_api_key(&self) -> Result<Option<SecretString>, KnoxClientError> {
        self.knox_api_key
            .get_or_try_init(|| knox::resolve_api_key(self))
            .await
            .cloned()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the shared client. Only the first call has an effect.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.release();
        info!("Shared HTTP client released");
    }

    /// Run the selected tiers of `plan`.
    ///
    /// Smoke checks run first, one at a time; then each incremental sequence
    /// in plan order. Every case is gated against the profile.
    pub async fn run(&self, plan: &TestPlan, selection: Selection) -> SessionReport {
        let mut report = SessionReport::new(self.profile.environment());

        if selection.includes(Tier::Smoke) {
            for check in plan.smoke_checks() {
                let name = format!("smoke::{}", check.name());
                report.push(runner::run_gated(name, Tier::Smoke, check.as_ref(), self).await);
            }
        }

        if selection.includes(Tier::Incremental) {
            for sequence in plan.sequences() {
                report.extend(sequence.run(self).await);
            }
        }

        report.log_summary();
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open a session, run the standard plan and release the client.
pub async fn run_session(
    profile: EnvironmentProfile,
    selection: Selection,
) -> Result<SessionReport, TransportError> {
    let session = Session::open(profile)?;
    let plan = TestPlan::standard(session.profile());

    let report = session.run(&plan, selection).await;
    session.release();

    Ok(report)
}
