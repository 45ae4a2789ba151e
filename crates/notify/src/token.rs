//! Bearer token supply for the notification socket
//!
//! The token is read on every connection attempt, so a login or token refresh
//! takes effect on the next `connect`.

use std::sync::{Arc, RwLock};

use url::Url;

/// Source of the bearer token used to open the socket
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Token slot shared between the auth flow and the notification service
#[derive(Debug, Clone, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(token.into());
    }

    pub fn clear(&self) {
        let mut slot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

impl TokenSource for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Endpoint URL with the token attached as the `token` query parameter
pub fn endpoint_with_token(endpoint: &Url, token: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    url
}
