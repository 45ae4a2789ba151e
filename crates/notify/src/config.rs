//! Client configuration

use std::env;
use std::time::Duration;

use url::Url;

use crate::backoff::BackoffSchedule;

/// Default keep-alive period in seconds
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Notification client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Notification socket endpoint (`ws://` or `wss://`)
    pub ws_endpoint: Url,
    /// Keep-alive period while the socket is open
    pub heartbeat_interval: Duration,
    /// Reconnect wait table
    pub backoff: BackoffSchedule,
    /// Start the first connection attempt as soon as the service is spawned
    pub connect_on_start: bool,
}

impl Config {
    /// Configuration with defaults for everything but the endpoint
    pub fn new(ws_endpoint: Url) -> Self {
        Self {
            ws_endpoint,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            backoff: BackoffSchedule::default(),
            connect_on_start: true,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = env::var("TESTBED_WS_ENDPOINT")
            .map_err(|_| ConfigError::Missing("TESTBED_WS_ENDPOINT"))?;

        Ok(Self {
            ws_endpoint: parse_endpoint(&endpoint)?,
            heartbeat_interval: {
                let secs = env::var("TESTBED_WS_HEARTBEAT_SECS")
                    .unwrap_or_else(|_| DEFAULT_HEARTBEAT_SECS.to_string())
                    .parse()
                    .unwrap_or(DEFAULT_HEARTBEAT_SECS);
                if secs == 0 {
                    return Err(ConfigError::Invalid(
                        "TESTBED_WS_HEARTBEAT_SECS must be at least 1",
                    ));
                }
                Duration::from_secs(secs)
            },
            backoff: match env::var("TESTBED_WS_BACKOFF_SECS") {
                Ok(raw) => parse_schedule(&raw)?,
                Err(_) => BackoffSchedule::default(),
            },
            connect_on_start: env::var("TESTBED_WS_CONNECT_ON_START")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::InvalidEndpoint(format!(
            "unsupported scheme '{}', expected ws or wss",
            other
        ))),
    }
}

fn parse_schedule(raw: &str) -> Result<BackoffSchedule, ConfigError> {
    let steps = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| ConfigError::InvalidSchedule(format!("'{}' is not a number", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    BackoffSchedule::new(steps)
        .ok_or_else(|| ConfigError::InvalidSchedule("schedule is empty".to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid backoff schedule: {0}")]
    InvalidSchedule(String),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
