use std::sync::Arc;

use super::actor::{ChannelActor, ChannelCore, ChannelExtension, Command};
use super::{ChannelKind, ChannelState, SessionHandle};
use crate::config::ChannelTimings;
use crate::error::{ErrorReporter, SyncError};
use crate::protocol::{Action, InboundFrame};
use crate::run::RunContext;
use crate::session::PatchOp;
use crate::transport::Transport;

/// Receives `(path, op)` for every patch of an incoming SESSION action.
pub type SessionCallback = Arc<dyn Fn(&str, PatchOp) + Send + Sync>;

/// Optional callbacks of the batch channel.
#[derive(Clone, Default)]
pub struct BatchCallbacks {
    pub on_session: Option<SessionCallback>,
}

impl BatchCallbacks {
    pub fn on_session(mut self, callback: impl Fn(&str, PatchOp) + Send + Sync + 'static) -> Self {
        self.on_session = Some(Arc::new(callback));
        self
    }
}

struct BatchExtension {
    callbacks: BatchCallbacks,
}

impl ChannelExtension for BatchExtension {
    fn on_action(&mut self, action: Action, frame: &InboundFrame, _core: &mut ChannelCore) {
        if action != Action::Session {
            return;
        }
        if let (Some(callback), Some(patches)) = (&self.callbacks.on_session, &frame.patches) {
            for patch in patches {
                callback(&patch.path, patch.op);
            }
        }
    }
}

/// The batch channel: a session document shared by all runs of a batch.
///
/// Once opened it reconnects with backoff forever.
#[derive(Debug, Clone)]
pub struct BatchChannel {
    session: SessionHandle,
}

impl BatchChannel {
    /// Spawns the channel actor. The channel stays closed until [`open`](Self::open).
    pub fn spawn(
        run: &RunContext,
        timings: ChannelTimings,
        transport: Arc<dyn Transport>,
        reporter: ErrorReporter,
        callbacks: BatchCallbacks,
    ) -> Self {
        let kind = ChannelKind::Batch;
        let (commands, snapshot) = ChannelActor::spawn(
            kind,
            run.channel_url(kind),
            timings,
            transport,
            reporter,
            Box::new(BatchExtension { callbacks }),
        );
        Self {
            session: SessionHandle::new(kind, commands, snapshot),
        }
    }

    /// Opens the channel and resolves once the first version arrived.
    /// Failed attempts are retried with backoff.
    pub async fn open(&self) -> Result<(), SyncError> {
        self.session.request(|reply| Command::Open { reply }).await
    }

    /// Closes the channel for good; no reconnect follows.
    pub fn close(&self) {
        let _ = self.session.command(Command::Close);
    }

    pub fn state(&self) -> ChannelState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}
