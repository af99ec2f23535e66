use std::time::Duration;

/// Exponential reconnect delay.
///
/// The first attempt of a reconnect workflow happens immediately. Each
/// failed attempt then waits `min`, `2 * min`, `4 * min`, ... never more
/// than `max`.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    min: Duration,
    max: Duration,
    next: Option<Duration>,
}

impl Backoff {
    pub(crate) fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
            next: None,
        }
    }

    /// Starts a new workflow; the next delay is zero again.
    pub(crate) fn reset(&mut self) {
        self.next = None;
    }

    /// Starts a new workflow whose first attempt was already made by the
    /// caller; the next delay is `min`.
    pub(crate) fn reset_after_attempt(&mut self) {
        self.next = Some(self.min);
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        match self.next {
            None => {
                self.next = Some(self.min);
                Duration::ZERO
            }
            Some(delay) => {
                self.next = Some(delay.saturating_mul(2).min(self.max));
                delay
            }
        }
    }
}
