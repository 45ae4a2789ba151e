//! Ties the notification channel to the user's login state

use crate::error::{NotifyError, NotifyResult};
use crate::service::WebSocketService;
use crate::token::SharedToken;

/// Login/logout glue around the notification service
///
/// The service reads the token from the same [`SharedToken`] on every
/// connection attempt.
#[derive(Clone)]
pub struct AuthSession {
    token: SharedToken,
    service: WebSocketService,
}

impl AuthSession {
    pub fn new(token: SharedToken, service: WebSocketService) -> Self {
        Self { token, service }
    }

    pub fn service(&self) -> &WebSocketService {
        &self.service
    }

    /// Store the new token and open the notification channel
    ///
    /// An already active channel is left as is.
    pub async fn login(&self, token: impl Into<String>) -> NotifyResult<()> {
        self.token.set(token);

        match self.service.connect().await {
            Ok(()) => Ok(()),
            Err(NotifyError::AlreadyConnected(status)) => {
                tracing::info!(status = %status, "Notification channel already active at login");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close the notification channel and forget the token
    pub async fn logout(&self) -> NotifyResult<()> {
        self.service.disconnect().await?;
        self.token.clear();
        tracing::info!("Logged out of notification channel");
        Ok(())
    }
}
