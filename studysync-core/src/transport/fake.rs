//! In-memory transport for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::{Link, LinkCommand, LinkEnds, ReadyState, Transport, TransportEvent};

/// Transport whose links are driven by the test through [`FakePeer`]s.
pub(crate) struct FakeTransport {
    peers: mpsc::UnboundedSender<FakePeer>,
    opened: Arc<AtomicUsize>,
}

/// Receives one [`FakePeer`] per link the code under test opens.
pub(crate) struct FakeConnections {
    peers: mpsc::UnboundedReceiver<FakePeer>,
    opened: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn new() -> (Arc<FakeTransport>, FakeConnections) {
        let (tx, rx) = mpsc::unbounded_channel();
        let opened = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(FakeTransport {
                peers: tx,
                opened: opened.clone(),
            }),
            FakeConnections { peers: rx, opened },
        )
    }
}

impl Transport for FakeTransport {
    fn open(&self, url: &str) -> Link {
        let (link, ends) = Link::pair();
        self.opened.fetch_add(1, Ordering::SeqCst);
        let _ = self.peers.send(FakePeer {
            url: url.to_string(),
            ends,
        });
        link
    }
}

impl FakeConnections {
    pub(crate) async fn next(&mut self) -> FakePeer {
        self.peers.recv().await.expect("transport dropped")
    }

    /// Number of links opened so far.
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

/// The coordinator's side of one fake link.
pub(crate) struct FakePeer {
    pub(crate) url: String,
    ends: LinkEnds,
}

impl FakePeer {
    pub(crate) fn accept(&self) {
        self.ends.ready.set(ReadyState::Open);
        let _ = self.ends.events.send(TransportEvent::Opened);
    }

    pub(crate) fn send_json(&self, value: Value) {
        let _ = self
            .ends
            .events
            .send(TransportEvent::Message(value.to_string()));
    }

    pub(crate) fn send_text(&self, text: &str) {
        let _ = self
            .ends
            .events
            .send(TransportEvent::Message(text.to_string()));
    }

    /// Fails the link the way a refused connection does.
    pub(crate) fn fail(&self, message: &str) {
        self.ends.ready.set(ReadyState::Closed);
        let _ = self
            .ends
            .events
            .send(TransportEvent::Error(message.to_string()));
        let _ = self.ends.events.send(TransportEvent::Closed);
    }

    pub(crate) fn close(&self) {
        self.ends.ready.set(ReadyState::Closed);
        let _ = self.ends.events.send(TransportEvent::Closed);
    }

    /// Marks the link closed without delivering any event.
    pub(crate) fn drop_silently(&self) {
        self.ends.ready.set(ReadyState::Closed);
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        self.ends.ready.get()
    }

    /// Next frame the client sent, decoded as JSON. `None` once the client
    /// closed or dropped the link.
    pub(crate) async fn next_frame(&mut self) -> Option<Value> {
        match self.ends.commands.recv().await? {
            LinkCommand::Send(text) => serde_json::from_str(&text).ok(),
            LinkCommand::Close => None,
        }
    }

    /// Like `next_frame` but skips heartbeat pings.
    pub(crate) async fn next_non_ping(&mut self) -> Option<Value> {
        loop {
            let frame = self.next_frame().await?;
            if frame.get("heartbeat").is_none() {
                return Some(frame);
            }
        }
    }

    /// All frames sent so far without waiting.
    pub(crate) fn drain_frames(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(command) = self.ends.commands.try_recv() {
            if let LinkCommand::Send(text) = command {
                if let Ok(value) = serde_json::from_str(&text) {
                    frames.push(value);
                }
            }
        }
        frames
    }

    /// Whether the client closed or dropped the link. Consumes pending frames.
    pub(crate) fn close_requested(&mut self) -> bool {
        loop {
            match self.ends.commands.try_recv() {
                Ok(LinkCommand::Close) | Err(TryRecvError::Disconnected) => return true,
                Ok(LinkCommand::Send(_)) => continue,
                Err(TryRecvError::Empty) => return false,
            }
        }
    }
}
