//! Error types shared by channels, the group coordinator and the request queue.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while synchronizing with the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Transport error or unexpected close of a channel
    #[error("Connection error: {0}")]
    Connection(String),
    /// Malformed frame or a patch that could not be applied
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// A mutually exclusive operation is already in flight (or used up)
    #[error("{0}")]
    Concurrency(String),
    /// No answer from the coordinator before the deadline
    #[error("{0}")]
    Timeout(String),
    /// A queued request failed after exhausting its retries
    #[error("{0}")]
    Transport(String),
    /// The channel is not open, or has not received its first sync yet
    #[error("{0}")]
    NotOpen(String),
    /// The coordinator answered a session patch with SESSION_FAIL
    #[error("Error sending message")]
    SessionRejected,
    /// The coordinator could not reassign this run to another group
    #[error("Group reassignment unsuccessful")]
    ReassignRejected,
    /// Caller input rejected before any I/O happened
    #[error("{0}")]
    InvalidInput(String),
    /// Error message sent by the coordinator in an ERROR action
    #[error("{0}")]
    Remote(String),
}

impl SyncError {
    pub fn concurrency(msg: impl Into<String>) -> Self {
        SyncError::Concurrency(msg.into())
    }

    pub fn not_open(msg: impl Into<String>) -> Self {
        SyncError::NotOpen(msg.into())
    }
}

/// Callback slot receiving an error.
pub type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// Routes errors to a caller-specific slot or the global hook.
///
/// Every reported error is also emitted as a `tracing` error event, so an
/// error is never dropped even when no callback is installed.
#[derive(Clone, Default)]
pub struct ErrorReporter {
    global: Option<ErrorCallback>,
}

impl ErrorReporter {
    pub fn new(global: Option<ErrorCallback>) -> Self {
        Self { global }
    }

    /// Reports through `specific` if set, otherwise through the global hook.
    pub fn report(&self, specific: Option<&ErrorCallback>, error: &SyncError) {
        tracing::error!("{}", error);
        if let Some(callback) = specific {
            callback(error);
        } else if let Some(callback) = &self.global {
            callback(error);
        }
    }

    pub fn report_global(&self, error: &SyncError) {
        self.report(None, error);
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("global", &self.global.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_specific_callback_wins_over_global() {
        let global_hits = Arc::new(AtomicUsize::new(0));
        let specific_hits = Arc::new(AtomicUsize::new(0));

        let g = global_hits.clone();
        let reporter = ErrorReporter::new(Some(Arc::new(move |_: &SyncError| {
            g.fetch_add(1, Ordering::SeqCst);
        })));
        let s = specific_hits.clone();
        let specific: ErrorCallback = Arc::new(move |_: &SyncError| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(Some(&specific), &SyncError::SessionRejected);
        assert_eq!(specific_hits.load(Ordering::SeqCst), 1);
        assert_eq!(global_hits.load(Ordering::SeqCst), 0);

        reporter.report(None, &SyncError::SessionRejected);
        assert_eq!(global_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_report_without_any_callback_does_not_panic() {
        let reporter = ErrorReporter::default();
        reporter.report_global(&SyncError::Connection("Batch channel error".to_string()));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            SyncError::Connection("boom".to_string()).to_string(),
            "Connection error: boom"
        );
        assert_eq!(SyncError::SessionRejected.to_string(), "Error sending message");
        assert_eq!(
            SyncError::concurrency("Can leave only once").to_string(),
            "Can leave only once"
        );
    }
}
