//! Socket transport
//!
//! The connection manager never touches a socket directly. It asks a
//! [`Transport`] to open one and gets back a [`TransportLink`] for outgoing
//! traffic, while the transport reports what happens to the socket as
//! [`TransportEvent`]s tagged with the attempt's generation number.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

use crate::error::{NotifyError, NotifyResult};

/// What happened to a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// Text frame received
    Message(String),
    /// Socket-level error; a `Closed` event always follows
    Error(String),
    /// Socket is gone, for whatever reason
    Closed,
}

/// Requests from the manager to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Event sink handed to a transport for one connection attempt
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event; returns `false` once the manager has stopped
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Manager-side handle to one connection attempt
///
/// Dropping the link asks the transport to close the socket.
#[derive(Debug)]
pub struct TransportLink {
    outgoing: mpsc::UnboundedSender<Outbound>,
}

impl TransportLink {
    pub fn new(outgoing: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { outgoing }
    }

    /// Queue a text frame
    pub fn send_text(&self, frame: String) -> NotifyResult<()> {
        self.outgoing
            .send(Outbound::Text(frame))
            .map_err(|_| NotifyError::TransportClosed)
    }

    /// Ask the socket to close; the transport answers with `Closed`
    pub fn close(&self) {
        let _ = self.outgoing.send(Outbound::Close);
    }
}

/// Opens sockets for the connection manager
pub trait Transport: Send + Sync {
    /// Start opening a socket to `url` without waiting for the handshake
    fn open(&self, url: Url, events: TransportEvents) -> TransportLink;
}

/// WebSocket transport backed by `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, url: Url, events: TransportEvents) -> TransportLink {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url, events, rx));
        TransportLink::new(tx)
    }
}

/// Resolves once the manager asks for a close or drops the link
async fn close_requested(outgoing: &mut mpsc::UnboundedReceiver<Outbound>) {
    while let Some(message) = outgoing.recv().await {
        match message {
            Outbound::Close => return,
            Outbound::Text(_) => {
                tracing::warn!("Dropping frame queued before the socket opened");
            }
        }
    }
}

async fn run_socket(
    url: Url,
    events: TransportEvents,
    mut outgoing: mpsc::UnboundedReceiver<Outbound>,
) {
    let generation = events.generation();
    // The query string carries the bearer token, keep it out of the logs
    tracing::debug!(
        generation,
        host = url.host_str().unwrap_or_default(),
        path = url.path(),
        "Connecting to notification socket"
    );

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        () = close_requested(&mut outgoing) => {
            tracing::debug!(generation, "Close requested before the handshake finished");
            events.emit(TransportEvent::Closed);
            return;
        }
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(err) => {
            if let tungstenite::Error::Http(response) = &err {
                tracing::error!(
                    generation,
                    status = %response.status(),
                    "Notification socket handshake rejected"
                );
            } else {
                tracing::error!(
                    generation,
                    error = %err,
                    "Failed to connect to notification socket"
                );
            }
            events.emit(TransportEvent::Error(err.to_string()));
            events.emit(TransportEvent::Closed);
            return;
        }
    };

    tracing::debug!(generation, "WebSocket handshake completed");
    events.emit(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(generation, frame = ?frame, "Server closed notification socket");
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite, binary frames are not part of the protocol
                }
                Some(Err(e)) => {
                    tracing::warn!(generation, error = %e, "Notification socket read failed");
                    events.emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
            message = outgoing.recv() => match message {
                Some(Outbound::Text(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        tracing::warn!(generation, error = %e, "Notification socket write failed");
                        events.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    tracing::debug!(generation, "Closing notification socket");
                    if let Err(e) = write.close().await {
                        tracing::debug!(generation, error = %e, "Close handshake failed");
                    }
                    break;
                }
            },
        }
    }

    events.emit(TransportEvent::Closed);
}
