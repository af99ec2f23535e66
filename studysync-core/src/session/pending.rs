//! Bounded waits for coordinator confirmations (SESSION_ACK, FIXED).

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::SyncError;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

/// A caller waiting for a confirmation, with the instant it gives up.
#[derive(Debug)]
pub(crate) struct PendingWait {
    reply: Reply<()>,
    deadline: Instant,
    /// Version the mutation was sent against, if any
    sent_version: Option<u64>,
}

impl PendingWait {
    pub(crate) fn new(reply: Reply<()>, timeout: Duration, sent_version: Option<u64>) -> Self {
        Self {
            reply,
            deadline: Instant::now() + timeout,
            sent_version,
        }
    }
}

/// Holds at most one [`PendingWait`].
///
/// Exactly one of ack, fail, timeout or teardown resolves the wait; after
/// that the slot is empty again and later resolutions are no-ops.
#[derive(Debug, Default)]
pub(crate) struct PendingSlot {
    current: Option<PendingWait>,
}

impl PendingSlot {
    pub(crate) fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    pub(crate) fn arm(&mut self, wait: PendingWait) {
        debug_assert!(self.current.is_none());
        self.current = Some(wait);
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|wait| wait.deadline)
    }

    /// Resolves the pending wait, if any. Returns whether one was resolved.
    pub(crate) fn settle(&mut self, result: Result<(), SyncError>) -> bool {
        match self.current.take() {
            Some(wait) => {
                if let Some(version) = wait.sent_version {
                    tracing::debug!(version, ok = result.is_ok(), "Settled pending wait");
                }
                // Receiver may have been dropped by an impatient caller
                let _ = wait.reply.send(result);
                true
            }
            None => false,
        }
    }

    /// Rejects the wait with `error` if its deadline has passed.
    pub(crate) fn expire(&mut self, now: Instant, error: SyncError) -> bool {
        match self.deadline() {
            Some(deadline) if deadline <= now => self.settle(Err(error)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_resolves_exactly_once() {
        let (tx, rx) = oneshot::channel();
        let mut slot = PendingSlot::default();
        slot.arm(PendingWait::new(tx, Duration::from_secs(10), Some(3)));
        assert!(slot.is_pending());

        assert!(slot.settle(Err(SyncError::SessionRejected)));
        assert!(!slot.settle(Ok(())));
        assert!(!slot.is_pending());
        assert_eq!(rx.await.unwrap(), Err(SyncError::SessionRejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_only_after_deadline() {
        let (tx, rx) = oneshot::channel();
        let mut slot = PendingSlot::default();
        slot.arm(PendingWait::new(tx, Duration::from_millis(100), None));

        let timeout = || SyncError::Timeout("Timeout sending message".to_string());
        assert!(!slot.expire(Instant::now(), timeout()));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(slot.expire(Instant::now(), timeout()));
        assert_eq!(rx.await.unwrap(), Err(timeout()));
        assert_eq!(slot.deadline(), None);
    }

    #[test]
    fn test_settle_with_dropped_receiver() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let mut slot = PendingSlot::default();
        slot.current = Some(PendingWait {
            reply: tx,
            deadline: Instant::now(),
            sent_version: None,
        });
        assert!(slot.settle(Ok(())));
    }
}
