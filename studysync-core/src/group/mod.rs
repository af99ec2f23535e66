//! Group membership on top of a group channel.
//!
//! A [`GroupChannel`] joins a group through the coordinator, tracks who is a
//! member and whose channel is open, relays application messages between
//! members and drives the leave, reassign and fix lifecycle operations.

mod callbacks;
mod coordinator;
mod membership;

pub use callbacks::{GroupCallbacks, MemberCallback, MessageCallback, NotifyCallback};
pub use coordinator::GroupChannel;
pub(crate) use coordinator::GroupCommand;
pub use membership::GroupMembership;
