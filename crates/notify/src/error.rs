//! Notification client error types

use testbed_shared::{ConnectionStatus, FrameError};

/// Client error type
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Already connected or reconnecting (status: {0})")]
    AlreadyConnected(ConnectionStatus),
    #[error("Notification service is not running")]
    ServiceStopped,
    #[error("Transport is closed")]
    TransportClosed,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Result type alias for client operations
pub type NotifyResult<T> = Result<T, NotifyError>;
