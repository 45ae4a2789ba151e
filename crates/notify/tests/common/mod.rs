//! Scripted transport for driving the connection manager in tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use testbed_notify::{
    Config, ConnectionStatus, Outbound, Subscription, Transport, TransportEvent, TransportEvents,
    TransportLink,
};
use tokio::sync::{mpsc, Notify};
use url::Url;

pub const ENDPOINT: &str = "ws://testbed.local/ws";

/// Config for tests: no automatic connect, default timers
pub fn test_config() -> Config {
    let mut config = Config::new(Url::parse(ENDPOINT).unwrap());
    config.connect_on_start = false;
    config
}

/// One socket opened through [`MockTransport`]
pub struct MockSocket {
    pub url: Url,
    events: TransportEvents,
    outgoing: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outbound>>,
}

impl MockSocket {
    pub fn open(&self) {
        self.events.emit(TransportEvent::Opened);
    }

    pub fn message(&self, raw: &str) {
        self.events.emit(TransportEvent::Message(raw.to_string()));
    }

    pub fn error(&self, error: &str) {
        self.events.emit(TransportEvent::Error(error.to_string()));
    }

    pub fn close(&self) {
        self.events.emit(TransportEvent::Closed);
    }

    /// Token carried in the connection URL
    pub fn token(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    }

    /// Next frame the manager sent; `None` once the manager dropped the link
    pub async fn next_outbound(&self) -> Option<Outbound> {
        self.outgoing.lock().await.recv().await
    }

    /// Frame already queued by the manager, if any
    pub fn try_outbound(&self) -> Option<Outbound> {
        self.outgoing.try_lock().ok()?.try_recv().ok()
    }
}

/// Transport that records every open request instead of touching the network
#[derive(Clone, Default)]
pub struct MockTransport {
    sockets: Arc<Mutex<Vec<Arc<MockSocket>>>>,
    opened: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn socket(&self, index: usize) -> Option<Arc<MockSocket>> {
        self.sockets.lock().unwrap().get(index).cloned()
    }

    /// Wait until the manager has opened socket number `index`
    pub async fn wait_for_socket(&self, index: usize) -> Arc<MockSocket> {
        let wait = async {
            loop {
                let opened = self.opened.notified();
                if let Some(socket) = self.socket(index) {
                    return socket;
                }
                opened.await;
            }
        };

        tokio::time::timeout(Duration::from_secs(3600), wait)
            .await
            .unwrap_or_else(|_| panic!("socket {} was never opened", index))
    }
}

impl Transport for MockTransport {
    fn open(&self, url: Url, events: TransportEvents) -> TransportLink {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.lock().unwrap().push(Arc::new(MockSocket {
            url,
            events,
            outgoing: tokio::sync::Mutex::new(rx),
        }));
        self.opened.notify_waiters();
        TransportLink::new(tx)
    }
}

/// Receive the next status and check it
pub async fn expect_status(
    statuses: &mut Subscription<ConnectionStatus>,
    expected: ConnectionStatus,
) {
    let status = tokio::time::timeout(Duration::from_secs(3600), statuses.recv())
        .await
        .expect("timed out waiting for a status")
        .expect("status stream ended");
    assert_eq!(status, expected);
}

/// Notification frame for `user_id` with a `JobUpdate` payload
pub fn job_update_frame(user_id: i64, job_id: i64) -> String {
    serde_json::json!({
        "kind": "Notification",
        "data": {
            "userId": user_id,
            "message": {
                "kind": "JobUpdate",
                "data": { "jobId": job_id, "status": "Finished" }
            }
        }
    })
    .to_string()
}
