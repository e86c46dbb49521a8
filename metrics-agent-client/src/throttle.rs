use std::time::Duration;

use quanta::{Clock, Instant};
use rand::Rng as _;

/// Send interval used until the server advises one, and whenever its advice is unusable.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound on any wait, including backoff.
pub const MAX_WAIT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Upper bound (exclusive) of the random jitter added while backing off.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(15);

/// Tracks when the next send is allowed.
///
/// The server tells the client how often it may push (the wait interval). On top of that, every
/// consecutive failed send stretches the wait additively: after `n` failures the client waits
/// `n * wait_interval` plus a few seconds of jitter, so that many agents recovering from the same
/// outage do not come back in lockstep. No wait ever exceeds one hour.
#[derive(Debug)]
pub struct Throttle {
    clock: Clock,
    last_send: Option<Instant>,
    wait_interval: Duration,
    consecutive_failures: u32,
    max_jitter: Duration,
}

impl Throttle {
    /// Creates a new `Throttle` that has never sent, using the default wait interval.
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            last_send: None,
            wait_interval: DEFAULT_WAIT_INTERVAL,
            consecutive_failures: 0,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Sets the exclusive upper bound of the backoff jitter.
    ///
    /// Jitter is drawn in whole seconds, so anything under one second disables it.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns how long to wait before the next send is allowed.
    ///
    /// Returns [`Duration::ZERO`] when a send is allowed right now. This never mutates the
    /// throttle, but while backing off each call draws fresh jitter.
    pub fn wait_duration(&self) -> Duration {
        let Some(last_send) = self.last_send else {
            return Duration::ZERO;
        };

        let elapsed = self.clock.now().saturating_duration_since(last_send);
        self.effective_interval().saturating_sub(elapsed)
    }

    fn effective_interval(&self) -> Duration {
        let interval = if self.consecutive_failures > 0 {
            self.wait_interval.saturating_mul(self.consecutive_failures) + self.jitter()
        } else {
            self.wait_interval
        };

        interval.min(MAX_WAIT_INTERVAL)
    }

    fn jitter(&self) -> Duration {
        let max_secs = self.max_jitter.as_secs();
        if max_secs == 0 {
            return Duration::ZERO;
        }

        Duration::from_secs(rand::rng().random_range(0..max_secs))
    }

    /// Records that a send is being attempted now.
    pub fn record_attempt(&mut self) {
        self.last_send = Some(self.clock.now());
    }

    /// Records a failed send attempt.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Records a successful send, adopting the server-advised interval if there is one.
    pub fn record_success(&mut self, advised_interval: Option<Duration>) {
        self.wait_interval = advised_interval
            .map_or(DEFAULT_WAIT_INTERVAL, |interval| interval.min(MAX_WAIT_INTERVAL));
        self.consecutive_failures = 0;
    }

    /// Current server-advised wait interval.
    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    /// Number of failed send attempts since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Time of the last send attempt, if any.
    pub fn last_send(&self) -> Option<Instant> {
        self.last_send
    }
}
