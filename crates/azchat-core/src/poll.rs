//! Bounded polling of assistant runs
//!
//! Runs are advanced by the remote service; the only thing we can do is
//! look at them until they stop moving or our time budget runs out.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::llm::Run;
use crate::Result;

/// How often and for how long to poll a run
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first re-poll
    pub interval: Duration,
    /// Factor applied to the delay after every poll (1.0 = fixed interval)
    pub backoff: f64,
    /// Upper bound for the delay
    pub max_interval: Duration,
    /// Total budget; exceeding it yields [`PollOutcome::TimedOut`]
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff: 1.0,
            max_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Floor for the delay between two polls of the same run
const MIN_POLL_DELAY: Duration = Duration::from_millis(10);

impl PollPolicy {
    /// Delay after `current`, grown by `backoff` and capped at `max_interval`.
    ///
    /// A backoff that is not a finite number above 1.0 keeps the delay fixed.
    fn next_delay(&self, current: Duration) -> Duration {
        if !self.backoff.is_finite() || self.backoff <= 1.0 {
            return current;
        }
        let cap = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff)
            .unwrap_or(cap)
            .min(cap)
    }
}

/// Result of polling a run
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The run reached a terminal remote status
    Finished(Run),
    /// The budget elapsed first; `last` is the most recent observation
    TimedOut { last: Run, elapsed: Duration },
}

impl PollOutcome {
    /// Status label reported to clients; `timeout` is local-only
    pub fn status(&self) -> &'static str {
        match self {
            PollOutcome::Finished(run) => run.status.as_str(),
            PollOutcome::TimedOut { .. } => "timeout",
        }
    }
}

/// Poll `fetch` until the run is terminal or `policy.timeout` elapses.
///
/// `initial` is the run as returned at creation time; if it is already
/// terminal no request is made. Errors from `fetch` end the poll.
pub async fn poll_run<F, Fut>(policy: &PollPolicy, initial: Run, mut fetch: F) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Run>>,
{
    let started = Instant::now();
    let mut delay = policy.interval.max(MIN_POLL_DELAY);
    let mut run = initial;
    let mut polls = 0u32;

    loop {
        if run.status.is_terminal() {
            debug!(
                "Run {} finished with status {} after {} polls",
                run.id,
                run.status.as_str(),
                polls
            );
            return Ok(PollOutcome::Finished(run));
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            warn!(
                "Run {} still {} after {:?}, giving up",
                run.id,
                run.status.as_str(),
                elapsed
            );
            return Ok(PollOutcome::TimedOut { last: run, elapsed });
        }

        tokio::time::sleep(delay.min(policy.timeout - elapsed)).await;
        delay = policy.next_delay(delay).max(MIN_POLL_DELAY);

        run = fetch().await?;
        polls += 1;
    }
}
