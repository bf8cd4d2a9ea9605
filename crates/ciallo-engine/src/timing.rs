//! Cooperative cadences.
//!
//! A [`Cadence`] is a cancellable repeating task driven by whoever owns it:
//! the owner asks [`Cadence::poll`] with the current time and runs the task
//! when it answers `true`. Nothing fires on its own, so two cadences owned by
//! the same loop never run concurrently.

use std::time::{Duration, Instant};

/// Shortest accepted period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A repeating task schedule.
#[derive(Debug, Clone)]
pub struct Cadence {
    /// Time between firings
    period: Duration,
    /// Next firing time, `None` while cancelled
    next_due: Option<Instant>,
    /// Times this cadence has fired
    fired: u64,
}

impl Cadence {
    /// Creates a cancelled cadence.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            next_due: None,
            fired: 0,
        }
    }

    /// Arms the cadence so it first fires one period after `now`.
    ///
    /// Arming an armed cadence does nothing.
    pub fn arm(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now + self.period);
        }
    }

    /// Arms the cadence so it fires on the next poll.
    ///
    /// Arming an armed cadence does nothing.
    pub fn arm_immediate(&mut self, now: Instant) {
        if self.next_due.is_none() {
            self.next_due = Some(now);
        }
    }

    /// Cancels the cadence. Safe when already cancelled.
    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Returns true if the cadence is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns true (at most once per call) if the task is due.
    ///
    /// A late poll fires once and does not replay missed periods.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }

        let mut next = due + self.period;
        if next <= now {
            next = now + self.period;
        }
        self.next_due = Some(next);
        self.fired += 1;
        true
    }

    /// Next firing time, `None` while cancelled.
    #[must_use]
    pub const fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Time between firings.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Times this cadence has fired.
    #[must_use]
    pub const fn fired(&self) -> u64 {
        self.fired
    }
}
