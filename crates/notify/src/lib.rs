//! Testbed notification client
//!
//! Keeps a WebSocket to the testbed backend open on behalf of the logged-in
//! user, reconnects with a fixed backoff table when the socket drops, and fans
//! server-pushed notifications out to subscribers.

pub mod backoff;
pub mod config;
pub mod error;
pub mod fanout;
pub mod service;
pub mod session;
pub mod subscribers;
pub mod token;
pub mod transport;

pub use backoff::BackoffSchedule;
pub use config::{Config, ConfigError};
pub use error::{NotifyError, NotifyResult};
pub use fanout::{Delivery, NotificationFanout};
pub use service::{ServiceSnapshot, WebSocketService};
pub use session::AuthSession;
pub use subscribers::{Subscribers, Subscription, SubscriptionId};
pub use token::{SharedToken, TokenSource};
pub use transport::{
    Outbound, Transport, TransportEvent, TransportEvents, TransportLink, TungsteniteTransport,
};

pub use testbed_shared::{ConnectionStatus, Notification, NotificationKind, UserId};
