use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;

use super::callbacks::GroupCallbacks;
use super::membership::GroupMembership;
use crate::channel::actor::{ChannelActor, ChannelCore, ChannelExtension, Command};
use crate::channel::{ChannelKind, ChannelState, SessionHandle};
use crate::config::{HttpPolicy, SyncConfig};
use crate::error::{ErrorCallback, ErrorReporter, SyncError};
use crate::protocol::{Action, InboundFrame, MemberId, OutboundFrame};
use crate::queue::{deliver, HttpRequest, PendingRequest, RequestRunner};
use crate::run::RunContext;
use crate::session::pending::{PendingSlot, PendingWait, Reply};
use crate::transport::Transport;

/// Group-specific requests handled by the group channel actor.
pub(crate) enum GroupCommand {
    Send {
        msg: Value,
        recipient: Option<MemberId>,
    },
    SetFixed {
        reply: Reply<()>,
    },
    BeginLeave {
        reply: Reply<()>,
    },
    FinishLeave {
        succeeded: bool,
    },
    BeginReassign {
        reply: Reply<()>,
    },
    FinishReassign {
        succeeded: bool,
    },
}

struct GroupExtension {
    own_member_id: MemberId,
    callbacks: GroupCallbacks,
    membership: GroupMembership,
    fix: PendingSlot,
    fix_done: bool,
    joined_once: bool,
    leaving: bool,
    left: bool,
    reassigning: bool,
    reassigned: bool,
}

impl GroupExtension {
    fn new(own_member_id: MemberId, callbacks: GroupCallbacks) -> Self {
        Self {
            own_member_id,
            callbacks,
            membership: GroupMembership::default(),
            fix: PendingSlot::default(),
            fix_done: false,
            joined_once: false,
            leaving: false,
            left: false,
            reassigning: false,
            reassigned: false,
        }
    }

    fn member_event(&mut self, action: Action, member: &str) {
        if self.membership.is_self(member) {
            // Own membership only changes through the group variables; own
            // close is reported through on_close when the link goes down
            if action == Action::Opened {
                GroupCallbacks::member(&self.callbacks.on_open, member);
            }
            return;
        }
        self.membership.apply_event(action, member);
        let slot = match action {
            Action::Opened => &self.callbacks.on_member_open,
            Action::Closed => &self.callbacks.on_member_close,
            Action::Joined => &self.callbacks.on_member_join,
            Action::Left => &self.callbacks.on_member_leave,
            _ => return,
        };
        GroupCallbacks::member(slot, member);
        GroupCallbacks::notify(&self.callbacks.on_update);
    }

    fn set_fixed(&mut self, reply: Reply<()>, core: &mut ChannelCore) {
        let refusal = if !core.is_open() {
            Some(SyncError::not_open("No open group channel"))
        } else if core.is_opening() {
            Some(SyncError::concurrency("Can't fix group if not joined yet"))
        } else if self.leaving {
            Some(SyncError::concurrency("Can't fix group during leaving"))
        } else if self.reassigning {
            Some(SyncError::concurrency("Can't fix group during reassigning"))
        } else if self.fix.is_pending() || self.fix_done {
            Some(SyncError::concurrency("Can fix group only once"))
        } else {
            None
        };
        if let Some(error) = refusal {
            let _ = reply.send(Err(error));
            return;
        }

        match core.send_frame(&OutboundFrame::Fixed) {
            Ok(()) => {
                let timeout = core.timings.sending_timeout();
                self.fix.arm(PendingWait::new(reply, timeout, None));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn begin_leave(&mut self, core: &ChannelCore) -> Result<(), SyncError> {
        if core.is_opening() || !self.joined_once {
            Err(SyncError::concurrency("Can't leave group if not joined yet"))
        } else if self.reassigning {
            Err(SyncError::concurrency("Can't leave group during reassigning"))
        } else if self.leaving || self.left {
            Err(SyncError::concurrency("Can leave only once"))
        } else {
            self.leaving = true;
            Ok(())
        }
    }

    fn begin_reassign(&mut self, core: &ChannelCore) -> Result<(), SyncError> {
        if core.is_opening() || !self.joined_once {
            Err(SyncError::concurrency("Can't reassign group if not joined yet"))
        } else if self.leaving {
            Err(SyncError::concurrency("Can't reassign group during leaving"))
        } else if self.reassigning {
            Err(SyncError::concurrency(
                "Can't reassign group twice at the same time",
            ))
        } else if self.reassigned {
            Err(SyncError::concurrency("Can reassign only once"))
        } else if !core.is_open() {
            Err(SyncError::not_open("Group channel not open"))
        } else {
            self.reassigning = true;
            Ok(())
        }
    }
}

impl ChannelExtension for GroupExtension {
    fn open_blocker(&self) -> Option<SyncError> {
        if self.leaving {
            Some(SyncError::concurrency(
                "Can't open group channel while leaving a group",
            ))
        } else if self.reassigning {
            Some(SyncError::concurrency(
                "Can't open group channel while reassigning a group",
            ))
        } else {
            None
        }
    }

    fn lifecycle_busy(&self) -> bool {
        self.leaving || self.reassigning
    }

    fn error_callback(&self) -> Option<&ErrorCallback> {
        self.callbacks.on_error.as_ref()
    }

    fn on_frame(&mut self, frame: &InboundFrame) {
        self.membership.update_vars(frame, &self.own_member_id);
    }

    fn on_synced(&mut self, core: &mut ChannelCore) {
        self.joined_once = true;
        if !self.left {
            core.auto_reconnect = true;
        }
    }

    fn on_action(&mut self, action: Action, frame: &InboundFrame, _core: &mut ChannelCore) {
        match action {
            Action::Opened | Action::Closed | Action::Joined | Action::Left => {
                if let Some(member) = frame.member_id.as_deref() {
                    self.member_event(action, member);
                }
            }
            Action::Session => {
                if let (Some(callback), Some(patches)) =
                    (&self.callbacks.on_group_session, &frame.patches)
                {
                    for patch in patches {
                        callback(&patch.path, patch.op);
                    }
                }
                GroupCallbacks::notify(&self.callbacks.on_update);
            }
            Action::Fixed => {
                if self.fix.settle(Ok(())) {
                    self.fix_done = true;
                }
                self.membership.fixed = true;
                GroupCallbacks::notify(&self.callbacks.on_update);
            }
            _ => {}
        }
    }

    fn on_message(&mut self, msg: &Value) {
        if let Some(callback) = &self.callbacks.on_message {
            callback(msg);
        }
    }

    fn on_teardown(&mut self, was_connected: bool) {
        self.membership.clear();
        self.fix.settle(Err(SyncError::Connection(
            "Group channel closed before the group was fixed".to_string(),
        )));
        if was_connected {
            GroupCallbacks::notify(&self.callbacks.on_close);
        }
    }

    fn handle_command(&mut self, command: GroupCommand, core: &mut ChannelCore) {
        match command {
            GroupCommand::Send { msg, recipient } => {
                if !core.is_open() {
                    tracing::debug!("Group channel not open, message dropped");
                    return;
                }
                if let Err(e) = core.send_frame(&OutboundFrame::Message { msg, recipient }) {
                    tracing::debug!(error = %e, "Group message not sent");
                }
            }
            GroupCommand::SetFixed { reply } => self.set_fixed(reply, core),
            GroupCommand::BeginLeave { reply } => {
                let _ = reply.send(self.begin_leave(core));
            }
            GroupCommand::FinishLeave { succeeded } => {
                self.leaving = false;
                if succeeded {
                    self.left = true;
                    core.auto_reconnect = false;
                    core.stop_closed_check();
                } else {
                    core.resume_reconnect();
                }
            }
            GroupCommand::BeginReassign { reply } => {
                let _ = reply.send(self.begin_reassign(core));
            }
            GroupCommand::FinishReassign { succeeded } => {
                self.reassigning = false;
                self.reassigned |= succeeded;
                core.resume_reconnect();
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.fix.deadline()
    }

    fn on_timer(&mut self, now: Instant, _core: &mut ChannelCore) {
        if self
            .fix
            .expire(now, SyncError::Timeout("Timeout sending message".to_string()))
        {
            tracing::warn!("No answer to the fix request in time");
        }
    }

    fn view(&self) -> Option<GroupMembership> {
        Some(self.membership.clone())
    }
}

/// The group channel of a run.
///
/// Joining is single-shot: a failed join is reported to the caller and not
/// retried. After the first successful join the channel reconnects with
/// backoff like the batch channel, until the run leaves the group.
#[derive(Clone)]
pub struct GroupChannel {
    session: SessionHandle,
    run: RunContext,
    runner: Arc<dyn RequestRunner>,
    policy: HttpPolicy,
}

impl GroupChannel {
    /// Spawns the group channel actor. Nothing is opened until [`join`](Self::join).
    pub fn spawn(
        run: &RunContext,
        config: &SyncConfig,
        transport: Arc<dyn Transport>,
        runner: Arc<dyn RequestRunner>,
        reporter: ErrorReporter,
        callbacks: GroupCallbacks,
    ) -> Self {
        let kind = ChannelKind::Group;
        let (commands, snapshot) = ChannelActor::spawn(
            kind,
            run.channel_url(kind),
            config.channel.clone(),
            transport,
            reporter,
            Box::new(GroupExtension::new(run.member_id(), callbacks)),
        );
        Self {
            session: SessionHandle::new(kind, commands, snapshot),
            run: run.clone(),
            runner,
            policy: config.http.clone(),
        }
    }

    /// Joins a group and resolves once the group session version arrived.
    pub async fn join(&self) -> Result<(), SyncError> {
        self.session.request(|reply| Command::Open { reply }).await
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Copy of the current membership.
    pub fn membership(&self) -> GroupMembership {
        self.session.snapshot().group.unwrap_or_default()
    }

    pub fn has_joined(&self) -> bool {
        self.membership().has_joined()
    }

    pub fn is_open(&self) -> bool {
        self.session.state() == ChannelState::Open
    }

    /// The channel is open and every member has an open channel.
    pub fn is_group_open(&self) -> bool {
        self.is_open() && self.membership().all_channels_open()
    }

    pub fn is_max_active_member_reached(&self, max: Option<usize>) -> bool {
        self.membership().is_max_active_member_reached(max)
    }

    pub fn is_max_active_member_open(&self, max: Option<usize>) -> bool {
        self.membership().is_max_active_member_open(max)
    }

    pub fn is_fixed(&self) -> bool {
        self.membership().fixed
    }

    pub fn member_id(&self) -> Option<MemberId> {
        self.membership().member_id
    }

    pub fn group_result_id(&self) -> Option<String> {
        self.membership().group_result_id
    }

    pub fn members(&self) -> Vec<MemberId> {
        self.membership().members.into_iter().collect()
    }

    pub fn open_channels(&self) -> Vec<MemberId> {
        self.membership().open_channels.into_iter().collect()
    }

    /// Broadcasts `msg` to every member. Dropped silently if the channel
    /// is not open.
    pub fn send(&self, msg: Value) {
        let _ = self.session.command(Command::Group(GroupCommand::Send {
            msg,
            recipient: None,
        }));
    }

    /// Sends `msg` to one member. Dropped silently if the channel is not open.
    pub fn send_to(&self, recipient: &str, msg: Value) {
        let _ = self.session.command(Command::Group(GroupCommand::Send {
            msg,
            recipient: Some(recipient.to_string()),
        }));
    }

    /// Asks the coordinator to fix the group (no new members).
    pub async fn set_fixed(&self) -> Result<(), SyncError> {
        self.session
            .request(|reply| Command::Group(GroupCommand::SetFixed { reply }))
            .await
    }

    /// Leaves the group. The coordinator closes the channel afterwards; no
    /// reconnect follows.
    pub async fn leave(&self) -> Result<(), SyncError> {
        self.session
            .request(|reply| Command::Group(GroupCommand::BeginLeave { reply }))
            .await?;

        let mut finish = FinishOnDrop {
            session: &self.session,
            finish: |succeeded| GroupCommand::FinishLeave { succeeded },
            succeeded: false,
        };
        let request = HttpRequest::get(self.run.leave_url());
        let pending = PendingRequest::new(0, request.clone(), &self.policy);
        let response = deliver(self.runner.as_ref(), &pending).await;
        let succeeded = response.is_success();
        finish.succeeded = succeeded;
        drop(finish);

        if succeeded {
            tracing::info!("Left group");
            Ok(())
        } else {
            Err(SyncError::Transport(response.failure_message(&request)))
        }
    }

    /// Asks the coordinator to move this run to another group. The channel
    /// stays open; new group variables arrive over it.
    pub async fn reassign(&self) -> Result<(), SyncError> {
        self.session
            .request(|reply| Command::Group(GroupCommand::BeginReassign { reply }))
            .await?;

        let mut finish = FinishOnDrop {
            session: &self.session,
            finish: |succeeded| GroupCommand::FinishReassign { succeeded },
            succeeded: false,
        };
        let request = HttpRequest::get(self.run.reassign_url());
        // Reassignment is not retried
        let pending = PendingRequest {
            retries: 0,
            ..PendingRequest::new(0, request.clone(), &self.policy)
        };
        let response = deliver(self.runner.as_ref(), &pending).await;
        let result = match response.status {
            Some(200) => Ok(()),
            Some(204) => Err(SyncError::ReassignRejected),
            _ => Err(SyncError::Transport(response.failure_message(&request))),
        };
        finish.succeeded = result.is_ok();
        result
    }

    /// Closes the channel for good; no reconnect follows.
    pub fn close(&self) {
        let _ = self.session.command(Command::Close);
    }
}

/// Ends a leave or reassign on the actor, also when the caller drops the
/// operation before the HTTP request finished.
struct FinishOnDrop<'a> {
    session: &'a SessionHandle,
    finish: fn(bool) -> GroupCommand,
    succeeded: bool,
}

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        let command = (self.finish)(self.succeeded);
        let _ = self.session.command(Command::Group(command));
    }
}

impl std::fmt::Debug for GroupChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupChannel")
            .field("session", &self.session)
            .field("run", &self.run)
            .finish()
    }
}
