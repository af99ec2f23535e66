//! The channel actor: connection lifecycle, heartbeat, closed-check,
//! reconnect with backoff and the session patch protocol.
//!
//! Everything a channel owns lives in [`ChannelCore`] and is touched only by
//! the actor task. One loop iteration handles exactly one command, transport
//! event or timer wakeup without awaiting, so exclusivity flags are checked
//! and set in the same turn.

use std::future::pending;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

use super::backoff::Backoff;
use super::heartbeat::HeartbeatMonitor;
use super::{ChannelKind, ChannelSnapshot, ChannelState};
use crate::config::ChannelTimings;
use crate::error::{ErrorCallback, ErrorReporter, SyncError};
use crate::group::{GroupCommand, GroupMembership};
use crate::protocol::{Action, InboundFrame, OutboundFrame};
use crate::session::pending::{PendingSlot, PendingWait, Reply};
use crate::session::{Patch, SessionDocument};
use crate::transport::{Link, ReadyState, Transport, TransportEvent};

/// Requests handled by a channel actor.
pub(crate) enum Command {
    Open { reply: Reply<()> },
    SendPatches { patches: Vec<Patch>, reply: Reply<()> },
    SetVersioning(bool),
    /// Intentional close: no reconnect afterwards
    Close,
    Group(GroupCommand),
}

/// Kind-specific behavior plugged into the actor.
pub(crate) trait ChannelExtension: Send + 'static {
    /// Error that prevents opening right now, if any.
    fn open_blocker(&self) -> Option<SyncError> {
        None
    }

    /// Whether a lifecycle operation (leave, reassign) is in flight.
    fn lifecycle_busy(&self) -> bool {
        false
    }

    fn error_callback(&self) -> Option<&ErrorCallback> {
        None
    }

    /// Called for every non-heartbeat frame before the document is updated.
    fn on_frame(&mut self, _frame: &InboundFrame) {}

    /// Called once per successful open, when the first version arrived.
    fn on_synced(&mut self, _core: &mut ChannelCore) {}

    fn on_action(&mut self, _action: Action, _frame: &InboundFrame, _core: &mut ChannelCore) {}

    fn on_message(&mut self, _msg: &Value) {}

    /// Called after the link was torn down. `was_connected` is false when
    /// the link never reached the open state.
    fn on_teardown(&mut self, _was_connected: bool) {}

    fn handle_command(&mut self, _command: GroupCommand, _core: &mut ChannelCore) {}

    /// Earliest deadline the extension needs a wakeup for.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn on_timer(&mut self, _now: Instant, _core: &mut ChannelCore) {}

    fn view(&self) -> Option<GroupMembership> {
        None
    }
}

/// State exclusively owned by one channel actor.
pub(crate) struct ChannelCore {
    pub(crate) kind: ChannelKind,
    url: String,
    pub(crate) timings: ChannelTimings,
    transport: Arc<dyn Transport>,
    pub(crate) reporter: ErrorReporter,
    link: Option<Link>,
    connected: bool,
    pub(crate) document: SessionDocument,
    pub(crate) version: Option<u64>,
    versioning: bool,
    mutation: PendingSlot,
    open_waiters: Vec<Reply<()>>,
    opening: bool,
    pub(crate) auto_reconnect: bool,
    heartbeat: HeartbeatMonitor,
    closed_check_at: Option<Instant>,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
}

impl ChannelCore {
    fn new(
        kind: ChannelKind,
        url: String,
        timings: ChannelTimings,
        transport: Arc<dyn Transport>,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            kind,
            url,
            heartbeat: HeartbeatMonitor::new(
                timings.heartbeat_interval(),
                timings.heartbeat_timeout(),
            ),
            backoff: Backoff::new(timings.backoff_min(), timings.backoff_max()),
            timings,
            transport,
            reporter,
            link: None,
            connected: false,
            document: SessionDocument::empty(),
            version: None,
            versioning: true,
            mutation: PendingSlot::default(),
            open_waiters: Vec::new(),
            opening: false,
            // The batch channel always heals itself; the group channel only
            // after its first successful join.
            auto_reconnect: kind == ChannelKind::Batch,
            closed_check_at: None,
            reconnect_at: None,
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.link
            .as_ref()
            .map_or(ChannelState::Closed, |link| link.ready_state().into())
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// An open attempt is running or scheduled.
    pub(crate) fn is_opening(&self) -> bool {
        self.opening || self.reconnect_at.is_some()
    }

    pub(crate) fn send_frame(&self, frame: &OutboundFrame) -> Result<(), SyncError> {
        let link = self.link.as_ref().ok_or_else(|| {
            SyncError::not_open(format!("No open {} channel", self.kind))
        })?;
        link.send(frame.encode()?)
    }

    pub(crate) fn stop_closed_check(&mut self) {
        self.closed_check_at = None;
    }

    /// Starts a reconnect if the channel is down and nothing else is going
    /// on. Used when a lifecycle operation that suppressed a reconnect ends.
    pub(crate) fn resume_reconnect(&mut self) {
        if self.link.is_none() && self.auto_reconnect && !self.is_opening() {
            self.backoff.reset();
            self.schedule_attempt();
        }
    }

    fn start_attempt(&mut self) {
        self.reconnect_at = None;
        self.opening = true;
        tracing::info!(channel = %self.kind, url = %self.url, "Opening channel");
        self.link = Some(self.transport.open(&self.url));
    }

    fn schedule_attempt(&mut self) {
        let delay = self.backoff.next_delay();
        tracing::info!(
            channel = %self.kind,
            delay_ms = delay.as_millis() as u64,
            "Scheduling channel open"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn next_wakeup(&self) -> Option<Instant> {
        [
            self.heartbeat.next_wakeup(),
            self.closed_check_at,
            self.mutation.deadline(),
            self.reconnect_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn settle_open_waiters(&mut self, result: Result<(), SyncError>) {
        for waiter in self.open_waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
    }
}

pub(crate) struct ChannelActor {
    core: ChannelCore,
    ext: Box<dyn ChannelExtension>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<ChannelSnapshot>,
}

impl ChannelActor {
    /// Spawns the actor task and returns its command sender and snapshot.
    pub(crate) fn spawn(
        kind: ChannelKind,
        url: String,
        timings: ChannelTimings,
        transport: Arc<dyn Transport>,
        reporter: ErrorReporter,
        ext: Box<dyn ChannelExtension>,
    ) -> (
        mpsc::UnboundedSender<Command>,
        watch::Receiver<ChannelSnapshot>,
    ) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(ChannelSnapshot::closed(kind, ext.view()));
        let actor = ChannelActor {
            core: ChannelCore::new(kind, url, timings, transport, reporter),
            ext,
            commands,
            snapshot,
        };
        tokio::spawn(actor.run());
        (commands_tx, snapshot_rx)
    }

    async fn run(mut self) {
        loop {
            let wakeup = [self.core.next_wakeup(), self.ext.deadline()]
                .into_iter()
                .flatten()
                .min();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.close_intentionally();
                        break;
                    }
                },
                event = next_event(&mut self.core.link) => self.handle_event(event),
                _ = sleep_opt(wakeup) => self.handle_timers(Instant::now()),
            }

            self.publish();
        }
        tracing::debug!(channel = %self.core.kind, "Channel actor stopped");
    }

    fn publish(&self) {
        let next = ChannelSnapshot {
            kind: self.core.kind,
            state: self.core.state(),
            version: self.core.version,
            document: self.core.document.clone(),
            group: self.ext.view(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn report(&self, error: SyncError) {
        self.core.reporter.report(self.ext.error_callback(), &error);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { reply } => self.open(reply),
            Command::SendPatches { patches, reply } => self.send_patches(patches, reply),
            Command::SetVersioning(enabled) => self.core.versioning = enabled,
            Command::Close => self.close_intentionally(),
            Command::Group(command) => self.ext.handle_command(command, &mut self.core),
        }
    }

    fn open(&mut self, reply: Reply<()>) {
        let kind = self.core.kind;
        if self.core.is_opening() {
            let _ = reply.send(Err(SyncError::concurrency(format!(
                "Can open only one {} channel at a time",
                kind
            ))));
            return;
        }
        if self.core.link.is_some() && self.core.state() != ChannelState::Closed {
            let _ = reply.send(Err(SyncError::concurrency(format!(
                "{} channel is already open",
                kind.title()
            ))));
            return;
        }
        if let Some(error) = self.ext.open_blocker() {
            let _ = reply.send(Err(error));
            return;
        }
        if self.core.link.is_some() {
            // Closed without us noticing yet
            self.teardown();
        }
        self.core.open_waiters.push(reply);
        // The attempt below is the immediate one; failures wait min, 2*min, ...
        self.core.backoff.reset_after_attempt();
        self.core.start_attempt();
    }

    fn send_patches(&mut self, patches: Vec<Patch>, reply: Reply<()>) {
        let kind = self.core.kind;
        let version = match self.core.version {
            Some(version) if self.core.is_open() => version,
            _ => {
                let _ = reply.send(Err(SyncError::not_open(format!(
                    "No open {} channel",
                    kind
                ))));
                return;
            }
        };
        if self.core.mutation.is_pending() {
            let _ = reply.send(Err(SyncError::concurrency(format!(
                "Can send only one {} session patch at a time",
                kind
            ))));
            return;
        }

        let frame = OutboundFrame::Session {
            kind,
            patches,
            version,
            versioning: self.core.versioning,
        };
        match self.core.send_frame(&frame) {
            Ok(()) => {
                tracing::debug!(channel = %kind, version, "Sent session patches");
                let timeout = self.core.timings.sending_timeout();
                self.core
                    .mutation
                    .arm(PendingWait::new(reply, timeout, Some(version)));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn handle_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Opened) => {
                let now = Instant::now();
                self.core.connected = true;
                self.core.heartbeat.start(now);
                self.core.closed_check_at = Some(now + self.core.timings.closed_check_interval());
                tracing::debug!(channel = %self.core.kind, "Link open, waiting for first sync");
            }
            Some(TransportEvent::Message(text)) => self.handle_message(&text),
            Some(TransportEvent::Error(message)) => {
                self.report(SyncError::Connection(format!(
                    "{} channel error: {}",
                    self.core.kind.title(),
                    message
                )));
                if self.core.opening {
                    self.attempt_failed();
                }
            }
            Some(TransportEvent::Closed) | None => self.handle_closed(),
        }
    }

    fn handle_closed(&mut self) {
        if self.core.opening {
            self.attempt_failed();
            return;
        }
        tracing::info!(channel = %self.core.kind, "Channel closed");
        self.teardown();
        if self.core.auto_reconnect && !self.ext.lifecycle_busy() {
            self.core.backoff.reset();
            self.core.schedule_attempt();
        }
    }

    fn attempt_failed(&mut self) {
        self.core.opening = false;
        self.teardown();
        if self.core.auto_reconnect {
            // Open waiters carry over to the next attempt
            self.core.schedule_attempt();
        } else {
            let error = SyncError::Connection(format!(
                "{} channel could not be opened",
                self.core.kind.title()
            ));
            self.core.settle_open_waiters(Err(error));
        }
    }

    /// Tears down and reopens, unless a lifecycle transition is in flight.
    fn reconnect(&mut self) {
        if self.core.is_opening() || self.ext.lifecycle_busy() {
            tracing::debug!(channel = %self.core.kind, "Reconnect skipped, lifecycle operation in flight");
            return;
        }
        self.teardown();
        if self.core.auto_reconnect {
            self.core.backoff.reset();
            self.core.schedule_attempt();
        }
    }

    fn close_intentionally(&mut self) {
        self.core.auto_reconnect = false;
        self.core.reconnect_at = None;
        if self.core.opening {
            self.core.opening = false;
            let error = SyncError::Connection(format!("{} channel closed", self.core.kind.title()));
            self.core.settle_open_waiters(Err(error));
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(link) = self.core.link.take() {
            link.close();
        }
        let was_connected = std::mem::take(&mut self.core.connected);
        self.core.document.clear();
        self.core.version = None;
        self.core.heartbeat.stop();
        self.core.closed_check_at = None;
        self.core.mutation.settle(Err(SyncError::Connection(format!(
            "{} channel closed before the coordinator answered",
            self.core.kind.title()
        ))));
        self.ext.on_teardown(was_connected);
    }

    fn handle_timers(&mut self, now: Instant) {
        if self.core.mutation.expire(
            now,
            SyncError::Timeout("Timeout sending message".to_string()),
        ) {
            tracing::warn!(channel = %self.core.kind, "No answer to session patches in time");
        }

        self.ext.on_timer(now, &mut self.core);

        if self.core.heartbeat.expired(now) {
            self.core.heartbeat.clear_deadlines();
            self.report(SyncError::Connection(format!(
                "{} channel heartbeat fail",
                self.core.kind.title()
            )));
            self.reconnect();
        } else if self.core.heartbeat.ping_due(now) {
            if self.core.is_open() {
                match self.core.send_frame(&OutboundFrame::Ping) {
                    Ok(()) => {
                        tracing::debug!(channel = %self.core.kind, "Heartbeat ping");
                        self.core.heartbeat.ping_sent(now);
                    }
                    Err(e) => {
                        tracing::debug!(channel = %self.core.kind, error = %e, "Heartbeat ping not sent");
                        self.core.heartbeat.skip(now);
                    }
                }
            } else {
                self.core.heartbeat.skip(now);
            }
        }

        if self.core.closed_check_at.is_some_and(|at| at <= now) {
            let closed = self
                .core
                .link
                .as_ref()
                .is_some_and(|link| link.ready_state() == ReadyState::Closed);
            if closed {
                self.core.closed_check_at = None;
                self.report(SyncError::Connection(format!(
                    "{} channel closed unexpectedly",
                    self.core.kind.title()
                )));
                self.reconnect();
            } else {
                self.core.closed_check_at = Some(now + self.core.timings.closed_check_interval());
            }
        }

        if self.core.reconnect_at.is_some_and(|at| at <= now) {
            self.core.start_attempt();
        }
    }

    fn handle_message(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.report(e);
                return;
            }
        };

        if frame.heartbeat.is_some() {
            self.core.heartbeat.clear_deadlines();
            return;
        }

        self.ext.on_frame(&frame);

        if let Some(patches) = &frame.patches {
            if let Err(e) = self.core.document.apply(patches) {
                self.report(e);
            }
        }
        if let Some(data) = &frame.data {
            self.core.document.replace_all(data.clone());
        }

        let synced = match frame.version {
            Some(version) => {
                self.core.version = Some(version);
                true
            }
            None => false,
        };
        if synced && self.core.opening {
            self.core.opening = false;
            self.core.backoff.reset();
            self.ext.on_synced(&mut self.core);
            tracing::info!(channel = %self.core.kind, "Channel open");
        }

        // Readers must see this frame's state before any waiter wakes up
        self.publish();
        if synced {
            self.core.settle_open_waiters(Ok(()));
        }

        if let Some(action) = frame.action {
            self.handle_action(action, &frame);
        }
        if let Some(msg) = &frame.msg {
            self.ext.on_message(msg);
        }
    }

    fn handle_action(&mut self, action: Action, frame: &InboundFrame) {
        match action {
            Action::SessionAck => {
                self.core.mutation.settle(Ok(()));
            }
            Action::SessionFail => {
                self.core.mutation.settle(Err(SyncError::SessionRejected));
            }
            Action::Error => {
                let message = frame
                    .error_msg
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.report(SyncError::Remote(message));
            }
            Action::Unknown => {
                tracing::debug!(channel = %self.core.kind, "Ignoring unknown action");
            }
            other => self.ext.on_action(other, frame, &mut self.core),
        }
    }
}

async fn next_event(link: &mut Option<Link>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.next_event().await,
        None => pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
