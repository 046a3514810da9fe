//! Executes single checks and turns their result into a [`CaseReport`].

use crate::check::{Check, CheckError};
use crate::gate::{self, Gate};
use crate::report::{CaseReport, Outcome};
use crate::session::Session;
use crate::tier::Tier;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Run `check` if the gate for `tier` is open, otherwise report a skip.
pub async fn run_gated(
    name: String,
    tier: Tier,
    check: &dyn Check,
    session: &Session,
) -> CaseReport {
    match gate::evaluate(tier, session.profile()) {
        Gate::Open => execute(name, tier, check, session).await,
        Gate::Closed(reason) => {
            debug!(case = %name, %reason, "Gate closed");
            CaseReport::skipped(name, tier, reason)
        }
    }
}

/// Run `check` unconditionally.
///
/// A panic inside the check body is caught and reported as a failure of this
/// case; the session carries on with the next case.
pub async fn execute(name: String, tier: Tier, check: &dyn Check, session: &Session) -> CaseReport {
    let span = info_span!("case", case = %name, tier = %tier);
    let started = Instant::now();

    let result = AssertUnwindSafe(check.run(session))
        .catch_unwind()
        .instrument(span)
        .await
        .unwrap_or_else(|payload| Err(CheckError::Panicked(panic_message(payload.as_ref()))));

    let outcome = match result {
        Ok(()) => Outcome::Passed,
        Err(e) => Outcome::Failed {
            kind: e.kind(),
            message: e.to_string(),
        },
    };

    CaseReport {
        name,
        tier,
        outcome,
        elapsed: started.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
