//! Notification connection manager
//!
//! [`WebSocketService`] is a cheap, cloneable handle. All connection state is
//! owned by a single background task that processes one thing at a time:
//! a command from a handle, an event from the transport, a keep-alive tick or
//! a reconnect countdown tick. Status, countdown and notification values are
//! published to subscriber registries the handles read from directly.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use testbed_shared::{ConnectionStatus, Notification, OutgoingMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use url::Url;

use crate::backoff::BackoffSchedule;
use crate::config::Config;
use crate::error::{NotifyError, NotifyResult};
use crate::fanout::NotificationFanout;
use crate::subscribers::{Subscribers, Subscription};
use crate::token::{endpoint_with_token, TokenSource};
use crate::transport::{Transport, TransportEvent, TransportEvents, TransportLink};

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Point-in-time view of the manager state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    /// Current connection status
    pub status: ConnectionStatus,
    /// Position in the backoff table
    pub backoff_index: usize,
    /// Whether a reconnect countdown is running
    pub reconnect_pending: bool,
    /// Whether the last closure was requested through `disconnect`
    pub willingly_closed: bool,
    /// Number of connection attempts started so far
    pub generation: u64,
}

enum Command {
    Connect {
        reply: oneshot::Sender<NotifyResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<ServiceSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the notification connection manager
#[derive(Clone)]
pub struct WebSocketService {
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<Subscribers<ConnectionStatus>>,
    notifications: Arc<Subscribers<Notification>>,
    countdown: Arc<Subscribers<u64>>,
}

impl WebSocketService {
    /// Start the manager task
    ///
    /// When `config.connect_on_start` is set the first connection attempt is
    /// made right away. Must be called from within a tokio runtime.
    pub fn spawn(
        config: Config,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let status = Arc::new(Subscribers::with_replay(
            "connection_status",
            ConnectionStatus::Initial,
        ));
        let countdown = Arc::new(Subscribers::new("reconnect_countdown"));
        let fanout = NotificationFanout::new();
        let notifications = fanout.subscribers();

        let manager = ConnectionManager {
            endpoint: config.ws_endpoint,
            heartbeat_period: config.heartbeat_interval,
            backoff: config.backoff,
            transport,
            tokens,
            fanout,
            status: ConnectionStatus::Initial,
            status_subscribers: Arc::clone(&status),
            countdown_subscribers: Arc::clone(&countdown),
            commands: commands_rx,
            events_tx,
            events: events_rx,
            link: None,
            generation: 0,
            willingly_closed: false,
            heartbeat: None,
            countdown: None,
        };

        tokio::spawn(manager.run(config.connect_on_start));

        Self {
            commands: commands_tx,
            status,
            notifications,
            countdown,
        }
    }

    /// Open the notification socket
    ///
    /// Fails with [`NotifyError::AlreadyConnected`] while the socket is open or
    /// a follow-up attempt is in flight. Returns once the attempt has started,
    /// not when the socket is open; watch the status stream for that.
    pub async fn connect(&self) -> NotifyResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply })?;
        rx.await.map_err(|_| NotifyError::ServiceStopped)?
    }

    /// Manual reconnect, same rules as [`connect`](Self::connect)
    pub async fn reconnect(&self) -> NotifyResult<()> {
        self.connect().await
    }

    /// Close the socket without scheduling a reconnect
    pub async fn disconnect(&self) -> NotifyResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply })?;
        rx.await.map_err(|_| NotifyError::ServiceStopped)
    }

    /// Stop the manager task, closing any open socket
    pub async fn shutdown(&self) -> NotifyResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        rx.await.map_err(|_| NotifyError::ServiceStopped)
    }

    pub async fn snapshot(&self) -> NotifyResult<ServiceSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        rx.await.map_err(|_| NotifyError::ServiceStopped)
    }

    /// Latest published connection status
    pub async fn status(&self) -> ConnectionStatus {
        self.status.latest().await.unwrap_or_default()
    }

    /// Subscribe to notifications pushed by the server
    pub async fn listen_notifications(&self) -> Subscription<Notification> {
        self.notifications.subscribe().await
    }

    /// Subscribe to status changes; the current status is delivered first
    pub async fn listen_connection_status(&self) -> Subscription<ConnectionStatus> {
        self.status.subscribe().await
    }

    /// Subscribe to the reconnect countdown, one value per second
    pub async fn will_reconnect_in(&self) -> Subscription<u64> {
        self.countdown.subscribe().await
    }

    fn send(&self, command: Command) -> NotifyResult<()> {
        self.commands
            .send(command)
            .map_err(|_| NotifyError::ServiceStopped)
    }
}

/// Running reconnect countdown
struct Countdown {
    interval: Interval,
    wait_secs: u64,
    elapsed_secs: u64,
}

impl Countdown {
    fn start(wait_secs: u64) -> Self {
        Self {
            interval: time::interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK),
            wait_secs,
            elapsed_secs: 0,
        }
    }

    /// Count one second, returning the seconds left
    fn tick(&mut self) -> u64 {
        self.elapsed_secs += 1;
        self.wait_secs.saturating_sub(self.elapsed_secs)
    }
}

enum Wake {
    Command(Command),
    Transport(u64, TransportEvent),
    Heartbeat,
    CountdownTick,
}

struct ConnectionManager {
    endpoint: Url,
    heartbeat_period: Duration,
    backoff: BackoffSchedule,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
    fanout: NotificationFanout,

    status: ConnectionStatus,
    status_subscribers: Arc<Subscribers<ConnectionStatus>>,
    countdown_subscribers: Arc<Subscribers<u64>>,

    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,

    /// Link to the current attempt's socket
    link: Option<TransportLink>,
    /// Bumped on every attempt; events tagged with an older value are stale
    generation: u64,
    willingly_closed: bool,
    heartbeat: Option<Interval>,
    countdown: Option<Countdown>,
}

impl ConnectionManager {
    async fn run(mut self, connect_on_start: bool) {
        tracing::info!(endpoint = %self.endpoint, "Notification service started");

        if connect_on_start {
            if let Err(e) = self.connect().await {
                tracing::warn!(error = %e, "Initial connection attempt failed");
            }
        }

        loop {
            // Transport events first: they describe what already happened to the socket
            let wake = tokio::select! {
                biased;
                Some((generation, event)) = self.events.recv() => Wake::Transport(generation, event),
                command = self.commands.recv() => match command {
                    Some(command) => Wake::Command(command),
                    None => break,
                },
                () = next_tick(self.heartbeat.as_mut()) => Wake::Heartbeat,
                () = next_tick(self.countdown.as_mut().map(|c| &mut c.interval)) => Wake::CountdownTick,
            };

            match wake {
                Wake::Command(command) => {
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Wake::Transport(generation, event) => {
                    self.handle_transport_event(generation, event).await
                }
                Wake::Heartbeat => self.send_keep_alive(),
                Wake::CountdownTick => self.countdown_tick().await,
            }
        }

        if let Some(link) = self.link.take() {
            link.close();
        }
        tracing::info!("Notification service stopped");
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn connect(&mut self) -> NotifyResult<()> {
        // Cleared even when rejected: a close still in flight after `disconnect`
        // then schedules a reconnect instead of leaving the channel down
        self.willingly_closed = false;

        if self.status.is_busy() {
            tracing::warn!(status = %self.status, "Connect rejected, connection already active");
            return Err(NotifyError::AlreadyConnected(self.status));
        }

        if self.status != ConnectionStatus::Initial {
            self.set_status(ConnectionStatus::Reconnecting).await;
        }
        if self.countdown.take().is_some() {
            tracing::debug!("Reconnect countdown cancelled");
        }

        let token = self.tokens.token();
        if token.is_none() {
            tracing::warn!("Connecting without a bearer token");
        }
        let url = endpoint_with_token(&self.endpoint, token.as_deref());

        self.generation += 1;
        tracing::info!(
            generation = self.generation,
            endpoint = %self.endpoint,
            "Opening notification connection"
        );

        let events = TransportEvents::new(self.generation, self.events_tx.clone());
        let link = self.transport.open(url, events);
        if let Some(previous) = self.link.replace(link) {
            previous.close();
        }

        Ok(())
    }

    fn disconnect(&mut self) {
        self.willingly_closed = true;

        match self.link.as_ref() {
            Some(link) => {
                tracing::info!(generation = self.generation, "Closing notification connection");
                link.close();
            }
            None => tracing::debug!("Disconnect requested without an active connection"),
        }

        if self.countdown.is_some() {
            tracing::warn!("Reconnect countdown still running after disconnect");
        }
    }

    async fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "Ignoring event from a superseded connection"
            );
            return;
        }

        match event {
            TransportEvent::Opened => self.on_open().await,
            TransportEvent::Message(raw) => {
                if let Err(e) = self.fanout.on_message(&raw).await {
                    tracing::warn!(error = %e, frame_len = raw.len(), "Dropping malformed frame");
                }
            }
            TransportEvent::Error(error) => {
                tracing::warn!(generation, error = %error, "Notification socket error");
            }
            TransportEvent::Closed => self.on_close().await,
        }
    }

    async fn on_open(&mut self) {
        self.backoff.reset();
        self.countdown = None;

        let mut heartbeat =
            time::interval_at(Instant::now() + self.heartbeat_period, self.heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(heartbeat);

        tracing::info!(generation = self.generation, "Notification connection open");
        self.set_status(ConnectionStatus::Open).await;
    }

    async fn on_close(&mut self) {
        self.heartbeat = None;
        self.link = None;

        if self.willingly_closed {
            tracing::info!(generation = self.generation, "Notification connection closed");
        } else {
            let wait_secs = self.backoff.current_secs();
            self.backoff.advance();
            self.countdown = Some(Countdown::start(wait_secs));
            tracing::warn!(
                generation = self.generation,
                wait_secs,
                backoff_index = self.backoff.index(),
                "Notification connection lost, reconnect scheduled"
            );
        }

        self.set_status(ConnectionStatus::Closed).await;
    }

    fn send_keep_alive(&self) {
        let Some(link) = self.link.as_ref() else {
            return;
        };

        let frame = match OutgoingMessage::KeepAlive.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode keep-alive");
                return;
            }
        };

        match link.send_text(frame) {
            Ok(()) => tracing::trace!(generation = self.generation, "Keep-alive sent"),
            Err(e) => tracing::warn!(error = %e, "Failed to send keep-alive"),
        }
    }

    async fn countdown_tick(&mut self) {
        let Some(countdown) = self.countdown.as_mut() else {
            return;
        };

        let remaining = countdown.tick();
        self.countdown_subscribers.publish(remaining).await;

        if remaining == 0 {
            self.countdown = None;
            if let Err(e) = self.connect().await {
                tracing::warn!(error = %e, "Scheduled reconnect failed");
            }
        }
    }

    async fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            tracing::debug!(from = %self.status, to = %status, "Connection status changed");
        }
        self.status = status;
        self.status_subscribers.publish(status).await;
    }

    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            status: self.status,
            backoff_index: self.backoff.index(),
            reconnect_pending: self.countdown.is_some(),
            willingly_closed: self.willingly_closed,
            generation: self.generation,
        }
    }
}

/// Next tick of an optional timer; never resolves when there is none
async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
