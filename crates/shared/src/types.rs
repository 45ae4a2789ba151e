//! Common types used across the testbed notification channel

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper (integer model id on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Lifecycle state of the notification connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No connection attempt has completed yet
    #[default]
    Initial,
    /// The socket is open
    Open,
    /// The socket closed (willingly or not)
    Closed,
    /// A follow-up connection attempt is in flight
    Reconnecting,
}

impl ConnectionStatus {
    /// Whether a new `connect` must be rejected in this state
    pub fn is_busy(&self) -> bool {
        matches!(self, ConnectionStatus::Open | ConnectionStatus::Reconnecting)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Initial => "initial",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Semantic type of a pushed notification
///
/// Kinds the client does not know about are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A job changed status or produced output
    JobUpdate,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::JobUpdate => f.write_str("JobUpdate"),
            NotificationKind::Other(kind) => f.write_str(kind),
        }
    }
}

/// Kind-tagged body of a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub kind: NotificationKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Notification payload pushed by the server for a single user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: UserId,
    pub message: NotificationMessage,
}

impl Notification {
    /// Notification kind shortcut
    pub fn kind(&self) -> &NotificationKind {
        &self.message.kind
    }

    /// Decode the kind-specific data into a typed record
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.message.data)
    }
}
