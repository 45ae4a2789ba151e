//! Notification watcher for the testbed backend
//!
//! Connects to the notification socket and logs status changes, reconnect
//! countdowns and every notification pushed by the server.
//!
//! Usage:
//!   TESTBED_WS_ENDPOINT=ws://localhost:8080/ws TESTBED_TOKEN=... cargo run --bin testbed-notify
//!
//! Set `LOG_FORMAT=json` for JSON log lines and `RUST_LOG` to change the filter.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use testbed_notify::{AuthSession, Config, SharedToken, TungsteniteTransport, WebSocketService};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let connect_on_start = config.connect_on_start;

    tracing::info!(
        endpoint = %config.ws_endpoint,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        backoff = ?config.backoff.steps(),
        "Starting notification watcher"
    );

    let token = SharedToken::new(env::var("TESTBED_TOKEN").ok());
    let service = WebSocketService::spawn(
        config,
        Arc::new(TungsteniteTransport::new()),
        Arc::new(token.clone()),
    );
    let session = AuthSession::new(token, service.clone());

    let mut statuses = service.listen_connection_status().await;
    let mut countdown = service.will_reconnect_in().await;
    let mut notifications = service.listen_notifications().await;

    if !connect_on_start {
        service.connect().await?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(status) = statuses.next() => {
                tracing::info!(status = %status, "Connection status changed");
            }
            Some(seconds) = countdown.next() => {
                tracing::info!(seconds, "Reconnecting soon");
            }
            Some(notification) = notifications.next() => {
                tracing::info!(
                    user_id = %notification.user_id,
                    kind = %notification.kind(),
                    data = %notification.message.data,
                    "Notification received"
                );
            }
            result = &mut shutdown => {
                result.context("Failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    session.logout().await?;
    service.shutdown().await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
