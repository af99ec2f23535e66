//! StudySync Core Library
//!
//! Client-side synchronization engine for study runs: replicated session
//! documents over batch and group channels, group membership, and ordered
//! delivery of result data to the coordinator.

pub mod channel;
pub mod config;
pub mod error;
pub mod group;
mod liveness;
pub mod protocol;
pub mod queue;
pub mod run;
pub mod session;
pub mod study;
pub mod transport;

pub use channel::{
    BatchCallbacks, BatchChannel, ChannelKind, ChannelSnapshot, ChannelState, SessionCallback,
    SessionHandle,
};
pub use config::{ChannelTimings, HttpPolicy, SyncConfig};
pub use error::{ErrorCallback, ErrorReporter, SyncError};
pub use group::{GroupCallbacks, GroupChannel, GroupMembership};
pub use queue::{Delivery, HttpRequest, HttpRunner, RequestQueue, RequestRunner};
pub use run::RunContext;
pub use session::{Patch, PatchOp, SessionDocument};
pub use study::{ComponentStart, EndStudy, FileContent, RunHooks, StudyRun};
pub use transport::{Transport, WebSocketTransport};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
