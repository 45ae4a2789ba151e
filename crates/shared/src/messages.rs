//! WebSocket frame types and serialization
//!
//! Frames are JSON objects tagged by `kind`, with an optional `data` payload.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::types::Notification;

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from the client to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum OutgoingMessage {
    /// Heartbeat telling the server the session is still in use
    KeepAlive,
}

impl OutgoingMessage {
    /// Serialize into a text frame
    pub fn to_frame(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
enum IncomingKind {
    Error,
    Notification,
    Timeout,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    kind: IncomingKind,
    #[serde(default)]
    data: serde_json::Value,
}

/// Frames sent from the server to the client
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Server-side error report, payload is opaque
    Error(serde_json::Value),
    /// Notification for the connected user
    Notification(Notification),
    /// Server is dropping the session for missing heartbeats
    Timeout,
}

impl IncomingMessage {
    /// Parse a raw text frame
    ///
    /// The `kind` tag is read first, then `data` is decoded for that kind.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let envelope: Envelope = serde_json::from_str(raw)?;

        let message = match envelope.kind {
            IncomingKind::Error => IncomingMessage::Error(envelope.data),
            IncomingKind::Notification => {
                IncomingMessage::Notification(serde_json::from_value(envelope.data)?)
            }
            IncomingKind::Timeout => IncomingMessage::Timeout,
        };

        Ok(message)
    }

    /// Wire name of the frame kind
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingMessage::Error(_) => "Error",
            IncomingMessage::Notification(_) => "Notification",
            IncomingMessage::Timeout => "Timeout",
        }
    }
}
