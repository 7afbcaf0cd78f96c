//! [`ReadinessTimer`] – bounded wait between permission grant and first frame.
//!
//! A granted stream is not necessarily a usable one: the device may take a
//! while to render its first frame, or never render one at all.  The timer is
//! armed when permission is granted and cancelled when a displayable frame
//! arrives.  The owning controller polls [`ReadinessTimer::expired`] from its
//! `tick` and tears the session down once the deadline has passed.
//!
//! The timer holds no thread or task; it is a deadline compared against the
//! instant supplied by the caller, which keeps expiry deterministic in tests.

use std::time::{Duration, Instant};

/// Single-shot deadline for stream readiness.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use platecam_kernel::readiness::ReadinessTimer;
///
/// let mut timer = ReadinessTimer::new(Duration::from_secs(10));
/// let granted_at = Instant::now();
/// timer.arm(granted_at);
///
/// assert!(!timer.expired(granted_at + Duration::from_secs(5)));
/// assert!(timer.expired(granted_at + Duration::from_secs(10)));
///
/// timer.cancel();
/// assert!(!timer.expired(granted_at + Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone)]
pub struct ReadinessTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl ReadinessTimer {
    /// Create a disarmed timer with the given bound.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Start (or restart) the countdown from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    /// Disarm the timer.  No-op when it is not armed.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// `true` once `now` has reached the deadline of an armed timer.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Time left before expiry, or `None` when disarmed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_timer_is_disarmed() {
        let timer = ReadinessTimer::new(Duration::from_secs(10));
        assert!(!timer.expired(Instant::now() + Duration::from_secs(3600)));
        assert!(timer.remaining(Instant::now()).is_none());
    }

    #[test]
    fn expires_at_deadline() {
        let mut timer = ReadinessTimer::new(Duration::from_millis(100));
        let start = Instant::now();
        timer.arm(start);
        assert!(!timer.expired(start + Duration::from_millis(99)));
        assert!(timer.expired(start + Duration::from_millis(100)));
    }

    #[test]
    fn rearm_moves_deadline() {
        let mut timer = ReadinessTimer::new(Duration::from_secs(1));
        let start = Instant::now();
        timer.arm(start);
        // Re-arming later pushes the deadline out.
        timer.arm(start + Duration::from_millis(900));
        assert!(!timer.expired(start + Duration::from_millis(1500)));
        assert!(timer.expired(start + Duration::from_millis(1900)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut timer = ReadinessTimer::new(Duration::from_secs(1));
        timer.arm(Instant::now());
        timer.cancel();
        timer.cancel();
        assert!(timer.remaining(Instant::now()).is_none());
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let mut timer = ReadinessTimer::new(Duration::from_secs(2));
        let start = Instant::now();
        timer.arm(start);
        assert_eq!(
            timer.remaining(start + Duration::from_secs(1)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            timer.remaining(start + Duration::from_secs(5)),
            Some(Duration::ZERO)
        );
    }
}
