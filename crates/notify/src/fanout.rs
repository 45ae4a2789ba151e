//! Routing of inbound frames to notification subscribers

use std::sync::Arc;

use testbed_shared::{FrameError, IncomingMessage, Notification};

use crate::subscribers::Subscribers;

/// What happened to an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Notification handed to this many subscribers
    Published { recipients: usize },
    /// Server error report, logged only
    ServerError,
    /// Server announced it is dropping the session
    ServerTimeout,
}

/// Dispatches parsed frames by kind
pub struct NotificationFanout {
    notifications: Arc<Subscribers<Notification>>,
}

impl NotificationFanout {
    pub fn new() -> Self {
        Self {
            notifications: Arc::new(Subscribers::new("notifications")),
        }
    }

    /// Registry that notification subscribers attach to
    pub fn subscribers(&self) -> Arc<Subscribers<Notification>> {
        Arc::clone(&self.notifications)
    }

    /// Handle one raw text frame from the socket
    pub async fn on_message(&self, raw: &str) -> Result<Delivery, FrameError> {
        match IncomingMessage::parse(raw)? {
            IncomingMessage::Notification(notification) => {
                let user_id = notification.user_id;
                let kind = notification.kind().to_string();
                let recipients = self.notifications.publish(notification).await;

                tracing::debug!(
                    user_id = %user_id,
                    kind = %kind,
                    recipients,
                    "Notification delivered"
                );

                Ok(Delivery::Published { recipients })
            }
            IncomingMessage::Error(payload) => {
                tracing::error!(payload = %payload, "Server reported an error");
                Ok(Delivery::ServerError)
            }
            IncomingMessage::Timeout => {
                tracing::warn!("Server timed out the notification session");
                Ok(Delivery::ServerTimeout)
            }
        }
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new()
    }
}
