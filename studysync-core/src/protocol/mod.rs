//! Wire format of batch and group channel frames.
//!
//! ## Protocol
//!
//! Frames are JSON text messages:
//! 1. Heartbeats: `{"heartbeat": "ping" | "pong"}`
//! 2. Sync/update: `patches`, `data` and `version` (batch) or their
//!    `session*` counterparts plus `members`, `channels` and
//!    `groupResultId` (group)
//! 3. Action envelopes: `{"action": "SESSION_ACK", "memberId": .., "errorMsg": ..}`
//! 4. Application messages: `{"msg": .., "recipient": ..}`

mod frames;

pub use frames::{Action, Heartbeat, InboundFrame, MemberId, OutboundFrame};
