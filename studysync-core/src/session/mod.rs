//! Session documents replicated over channels.
//!
//! A session document is a JSON value shared by every participant of a
//! channel. It changes only through JSON-Patch operations confirmed by the
//! coordinator; the local copy is a read-only replica.

mod document;
mod patch;
pub(crate) mod pending;

pub use document::SessionDocument;
pub use patch::{
    apply_patch, escape_token, lookup, parse_pointer, pointer_for_key, Patch, PatchOp,
};
pub(crate) use patch::present;
