//! Polling helpers for eventually-consistent checks.
//!
//! Used by flows whose effects become visible asynchronously, such as
//! messages published to a queue appearing in Knox search.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Fixed-interval polling schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Give up after this long.
    pub timeout: Duration,
    /// Sleep between polls.
    pub interval: Duration,
}

impl PollSchedule {
    /// Knox ingestion: search every 2s for up to 60s.
    pub const KNOX_INGESTION: PollSchedule = PollSchedule {
        timeout: Duration::from_secs(60),
        interval: Duration::from_secs(2),
    };
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The condition holds.
    Ready(T),
    /// Not there yet; the string describes what is still missing.
    Pending(String),
}

/// Polling gave up.
#[derive(Debug, Error)]
pub enum EventualError<E: fmt::Display> {
    #[error("condition not met within {timeout:?} after {polls} poll(s): {last}")]
    Timeout {
        timeout: Duration,
        polls: u32,
        last: String,
    },

    #[error("{0}")]
    Inner(E),
}

/// Poll `observe` on `schedule` until it reports [`Observation::Ready`].
///
/// An `Err` from `observe` stops polling immediately.
pub async fn wait_until<T, E, F, Fut>(
    schedule: PollSchedule,
    mut observe: F,
) -> Result<T, EventualError<E>>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T>, E>>,
{
    let deadline = Instant::now() + schedule.timeout;
    let mut polls = 0;

    loop {
        polls += 1;
        let last = match observe().await.map_err(EventualError::Inner)? {
            Observation::Ready(value) => return Ok(value),
            Observation::Pending(reason) => reason,
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(EventualError::Timeout {
                timeout: schedule.timeout,
                polls,
                last,
            });
        }

        sleep(schedule.interval.min(deadline - now)).await;
    }
}
