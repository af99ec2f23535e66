//! Batch and group channels.
//!
//! Each channel is driven by one actor task that exclusively owns the link,
//! the session document, the version and any pending wait. Callers talk to
//! it through a [`SessionHandle`] and read from the snapshot it publishes.

use std::fmt;

use crate::group::GroupMembership;
use crate::session::SessionDocument;
use crate::transport::ReadyState;

pub(crate) mod actor;
mod backoff;
mod batch;
mod handle;
mod heartbeat;

pub use batch::{BatchCallbacks, BatchChannel, SessionCallback};
pub use handle::SessionHandle;

/// Which of the two channels of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Batch,
    Group,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Batch => "batch",
            ChannelKind::Group => "group",
        }
    }

    /// Capitalized name used in error messages ("Batch channel ...").
    pub(crate) fn title(&self) -> &'static str {
        match self {
            ChannelKind::Batch => "Batch",
            ChannelKind::Group => "Group",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl From<ReadyState> for ChannelState {
    fn from(state: ReadyState) -> Self {
        match state {
            ReadyState::Connecting => ChannelState::Connecting,
            ReadyState::Open => ChannelState::Open,
            ReadyState::Closing => ChannelState::Closing,
            ReadyState::Closed => ChannelState::Closed,
        }
    }
}

/// State of a channel as of the actor's last turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub kind: ChannelKind,
    pub state: ChannelState,
    /// `None` until the first sync frame arrived
    pub version: Option<u64>,
    pub document: SessionDocument,
    /// Membership and flags; only set for group channels
    pub group: Option<GroupMembership>,
}

impl ChannelSnapshot {
    pub(crate) fn closed(kind: ChannelKind, group: Option<GroupMembership>) -> Self {
        Self {
            kind,
            state: ChannelState::Closed,
            version: None,
            document: SessionDocument::empty(),
            group,
        }
    }
}
