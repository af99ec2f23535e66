//! WebSocket transport backed by tokio-tungstenite.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Link, LinkCommand, LinkEnds, ReadyState, Transport, TransportEvent};

/// Opens each link as a WebSocket connection on its own tokio task.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &str) -> Link {
        let (link, ends) = Link::pair();
        tokio::spawn(drive(url.to_string(), ends));
        link
    }
}

async fn drive(url: String, ends: LinkEnds) {
    let LinkEnds {
        mut commands,
        events,
        ready,
    } = ends;

    let ws_stream = match connect_async(&url).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "WebSocket connect failed");
            ready.set(ReadyState::Closed);
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };

    // The channel may have given up on this link while we were connecting
    if ready.get() != ReadyState::Connecting {
        let (mut sender, _) = ws_stream.split();
        let _ = sender.send(Message::Close(None)).await;
        ready.set(ReadyState::Closed);
        return;
    }

    ready.set(ReadyState::Open);
    let _ = events.send(TransportEvent::Opened);

    let (mut sender, mut receiver) = ws_stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    ready.set(ReadyState::Closing);
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            message = receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Protocol-level ping/pong is answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }

    ready.set(ReadyState::Closed);
    let _ = events.send(TransportEvent::Closed);
}
