use std::sync::Arc;

use serde_json::Value;

use crate::channel::SessionCallback;
use crate::error::{ErrorCallback, SyncError};
use crate::session::PatchOp;

/// Receives a member ID.
pub type MemberCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Plain notification.
pub type NotifyCallback = Arc<dyn Fn() + Send + Sync>;
/// Receives an application message.
pub type MessageCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Optional handlers for group channel events. Unset slots do nothing,
/// except `on_error` which falls back to the global error hook.
///
/// Callbacks run on the channel's actor task and must not block.
#[derive(Clone, Default)]
pub struct GroupCallbacks {
    /// This run's own channel opened (argument: own member ID)
    pub on_open: Option<MemberCallback>,
    /// This run's own channel closed
    pub on_close: Option<NotifyCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_message: Option<MessageCallback>,
    pub on_member_join: Option<MemberCallback>,
    pub on_member_open: Option<MemberCallback>,
    pub on_member_leave: Option<MemberCallback>,
    pub on_member_close: Option<MemberCallback>,
    /// One call per patch of a SESSION action
    pub on_group_session: Option<SessionCallback>,
    /// Something about the group changed (membership, session, fixed)
    pub on_update: Option<NotifyCallback>,
}

impl GroupCallbacks {
    pub fn on_open(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(callback));
        self
    }

    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_message(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(callback));
        self
    }

    pub fn on_member_join(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_member_join = Some(Arc::new(callback));
        self
    }

    pub fn on_member_open(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_member_open = Some(Arc::new(callback));
        self
    }

    pub fn on_member_leave(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_member_leave = Some(Arc::new(callback));
        self
    }

    pub fn on_member_close(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_member_close = Some(Arc::new(callback));
        self
    }

    pub fn on_group_session(
        mut self,
        callback: impl Fn(&str, PatchOp) + Send + Sync + 'static,
    ) -> Self {
        self.on_group_session = Some(Arc::new(callback));
        self
    }

    pub fn on_update(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(callback));
        self
    }

    pub(crate) fn member(slot: &Option<MemberCallback>, member: &str) {
        if let Some(callback) = slot {
            callback(member);
        }
    }

    pub(crate) fn notify(slot: &Option<NotifyCallback>) {
        if let Some(callback) = slot {
            callback();
        }
    }
}
