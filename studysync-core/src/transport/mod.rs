//! Duplex transport port used by channels.
//!
//! A [`Transport`] opens a [`Link`] synchronously. The link starts in
//! `Connecting`; the transport's own task drives the handshake, keeps the
//! shared ready state current and reports [`TransportEvent`]s.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::SyncError;

#[cfg(test)]
pub(crate) mod fake;
mod websocket;

pub use websocket::WebSocketTransport;

/// Ready state of a link, mirroring the WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Ready state shared between a link and the task driving it.
#[derive(Debug, Clone)]
pub struct ReadyCell(Arc<AtomicU8>);

impl Default for ReadyCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(ReadyState::Connecting as u8)))
    }
}

impl ReadyCell {
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Event reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

/// Instruction from a link to the task driving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Send(String),
    Close,
}

/// Channel side of one connection attempt.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<LinkCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    ready: ReadyCell,
}

/// Transport side of a [`Link`].
#[derive(Debug)]
pub struct LinkEnds {
    pub commands: mpsc::UnboundedReceiver<LinkCommand>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub ready: ReadyCell,
}

impl Link {
    /// Creates a connected link/ends pair in `Connecting` state.
    pub fn pair() -> (Link, LinkEnds) {
        let (outbound, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let ready = ReadyCell::default();
        (
            Link {
                outbound,
                events,
                ready: ready.clone(),
            },
            LinkEnds {
                commands,
                events: events_tx,
                ready,
            },
        )
    }

    pub fn send(&self, text: String) -> Result<(), SyncError> {
        self.outbound
            .send(LinkCommand::Send(text))
            .map_err(|_| SyncError::Connection("Link is gone".to_string()))
    }

    /// Asks the transport to close. Idempotent.
    pub fn close(&self) {
        if !matches!(self.ready.get(), ReadyState::Closed) {
            self.ready.set(ReadyState::Closing);
        }
        let _ = self.outbound.send(LinkCommand::Close);
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready.get()
    }

    /// Next event; `None` once the transport task is gone.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Opens duplex links to the coordinator.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: &str) -> Link;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_pair_round_trip() {
        let (mut link, mut ends) = Link::pair();
        assert_eq!(link.ready_state(), ReadyState::Connecting);

        ends.ready.set(ReadyState::Open);
        ends.events.send(TransportEvent::Opened).unwrap();
        assert_eq!(link.next_event().await, Some(TransportEvent::Opened));
        assert_eq!(link.ready_state(), ReadyState::Open);

        link.send("hello".to_string()).unwrap();
        assert_eq!(
            ends.commands.recv().await,
            Some(LinkCommand::Send("hello".to_string()))
        );

        link.close();
        assert_eq!(link.ready_state(), ReadyState::Closing);
        assert_eq!(ends.commands.recv().await, Some(LinkCommand::Close));
    }

    #[tokio::test]
    async fn test_send_after_transport_gone() {
        let (mut link, ends) = Link::pair();
        drop(ends);
        assert!(link.send("x".to_string()).is_err());
        assert_eq!(link.next_event().await, None);
    }
}
