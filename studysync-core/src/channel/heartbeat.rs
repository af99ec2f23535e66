use std::time::Duration;

use tokio::time::Instant;

/// Application-level heartbeat of one link.
///
/// Every ping arms its own deadline. Any heartbeat frame from the
/// coordinator clears all outstanding deadlines, not only the latest one.
#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    next_ping: Option<Instant>,
    deadlines: Vec<Instant>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_ping: None,
            deadlines: Vec::new(),
        }
    }

    /// (Re)starts the ping schedule. Outstanding deadlines are kept.
    pub(crate) fn start(&mut self, now: Instant) {
        self.next_ping = Some(now + self.interval);
    }

    pub(crate) fn stop(&mut self) {
        self.next_ping = None;
        self.deadlines.clear();
    }

    pub(crate) fn ping_due(&self, now: Instant) -> bool {
        self.next_ping.is_some_and(|at| at <= now)
    }

    /// Records a ping sent at `now` and schedules the next one.
    pub(crate) fn ping_sent(&mut self, now: Instant) {
        self.deadlines.push(now + self.timeout);
        self.next_ping = Some(now + self.interval);
    }

    /// Skips a tick without pinging (link not open).
    pub(crate) fn skip(&mut self, now: Instant) {
        self.next_ping = Some(now + self.interval);
    }

    pub(crate) fn clear_deadlines(&mut self) {
        self.deadlines.clear();
    }

    pub(crate) fn expired(&self, now: Instant) -> bool {
        self.deadlines.iter().any(|deadline| *deadline <= now)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.deadlines.len()
    }

    /// Earliest instant this monitor needs attention.
    pub(crate) fn next_wakeup(&self) -> Option<Instant> {
        self.deadlines
            .iter()
            .copied()
            .chain(self.next_ping)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HeartbeatMonitor {
        HeartbeatMonitor::new(Duration::from_secs(25), Duration::from_secs(10))
    }

    #[test]
    fn test_heartbeat_reply_clears_every_deadline() {
        let now = Instant::now();
        let mut hb = monitor();
        hb.start(now);
        hb.ping_sent(now);
        hb.ping_sent(now + Duration::from_secs(5));
        assert_eq!(hb.outstanding(), 2);

        hb.clear_deadlines();
        assert_eq!(hb.outstanding(), 0);
        assert!(!hb.expired(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_schedule_and_expiry() {
        let now = Instant::now();
        let mut hb = monitor();
        assert_eq!(hb.next_wakeup(), None);

        hb.start(now);
        assert!(!hb.ping_due(now));
        assert!(hb.ping_due(now + Duration::from_secs(25)));

        hb.ping_sent(now + Duration::from_secs(25));
        assert_eq!(hb.next_wakeup(), Some(now + Duration::from_secs(35)));
        assert!(!hb.expired(now + Duration::from_secs(34)));
        assert!(hb.expired(now + Duration::from_secs(35)));

        hb.stop();
        assert_eq!(hb.next_wakeup(), None);
        assert_eq!(hb.outstanding(), 0);
    }
}
