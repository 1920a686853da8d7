//! Connection lifecycle for the change feed.
//!
//! A single supervisor task owns the open channel. It reads feed messages,
//! hands notifications to the [`EventRouter`], and reconnects with a fixed
//! backoff: a short delay after a graceful close, a longer one after an
//! error. There is only ever one reconnect deadline; scheduling a new one
//! replaces the previous.
//!
//! A second task probes the feed periodically, connected or not, and
//! records round-trip latency. A failed probe is logged and nothing else.

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::feed::{ChangeFeed, ChannelSpec, FeedChannel, FeedMessage};
use crate::notify::{Notice, Notifier};
use crate::router::EventRouter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// State of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub status: ConnectionStatus,
    pub is_healthy: bool,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ProbeResult {
    last_ping_at: Option<DateTime<Utc>>,
    latency_ms: Option<u64>,
}

#[derive(Debug)]
struct Shared {
    status: watch::Sender<ConnectionStatus>,
    probe: RwLock<ProbeResult>,
    reconnect_attempts: AtomicU64,
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(from = %previous, to = %status, "connection status changed");
        }
    }
}

enum Command {
    Connect { done: oneshot::Sender<ConnectionStatus> },
    Stop,
}

struct Running {
    commands: mpsc::UnboundedSender<Command>,
    supervisor: JoinHandle<()>,
    probe: JoinHandle<()>,
}

/// Owns the feed connection and its health.
pub struct ConnectionManager {
    feed: Arc<dyn ChangeFeed>,
    router: Arc<EventRouter>,
    notifier: Arc<dyn Notifier>,
    config: RealtimeConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("channel", &self.config.channel_name)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        router: Arc<EventRouter>,
        notifier: Arc<dyn Notifier>,
        config: RealtimeConfig,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            feed,
            router,
            notifier,
            config,
            shared: Arc::new(Shared {
                status,
                probe: RwLock::new(ProbeResult::default()),
                reconnect_attempts: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the supervisor and probe tasks and performs the first connect.
    ///
    /// A failed first connect is not an error: the returned status is
    /// [`ConnectionStatus::Error`] and a retry is already scheduled.
    pub async fn start(&self) -> RealtimeResult<ConnectionStatus> {
        let done = {
            let mut running = self.running();
            if running.is_some() {
                return Err(RealtimeError::AlreadyRunning);
            }

            let (commands, inbox) = mpsc::unbounded_channel();
            let supervisor = Supervisor {
                feed: Arc::clone(&self.feed),
                router: Arc::clone(&self.router),
                notifier: Arc::clone(&self.notifier),
                shared: Arc::clone(&self.shared),
                spec: ChannelSpec::for_resources(
                    self.config.channel_name.clone(),
                    &self.config.resources,
                    self.config.tenant_id.as_ref(),
                    &self.config.tenant_column,
                ),
                config: self.config.clone(),
            };
            let supervisor = tokio::spawn(supervisor.run(inbox));
            let probe = tokio::spawn(probe_loop(
                Arc::clone(&self.feed),
                Arc::clone(&self.shared),
                self.config.health_check_interval(),
                self.config.handshake_timeout(),
            ));

            let (tx, rx) = oneshot::channel();
            // The supervisor was just spawned and holds the receiver.
            let _ = commands.send(Command::Connect { done: tx });
            *running = Some(Running {
                commands,
                supervisor,
                probe,
            });
            rx
        };
        info!(channel = %self.config.channel_name, "realtime connection manager started");
        done.await.map_err(|_| RealtimeError::NotRunning)
    }

    /// Tears down the current channel and connects again right away.
    /// Any scheduled retry is dropped.
    pub async fn reconnect(&self) -> RealtimeResult<ConnectionStatus> {
        let (tx, rx) = oneshot::channel();
        {
            let running = self.running();
            let running = running.as_ref().ok_or(RealtimeError::NotRunning)?;
            running
                .commands
                .send(Command::Connect { done: tx })
                .map_err(|_| RealtimeError::NotRunning)?;
        }
        rx.await.map_err(|_| RealtimeError::NotRunning)
    }

    /// Closes the channel, cancels the retry and the probe, and waits for the
    /// supervisor to exit. Stopping a stopped manager is a no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running().take() else {
            return;
        };
        running.probe.abort();
        if running.commands.send(Command::Stop).is_err() {
            running.supervisor.abort();
        }
        if let Err(e) = running.supervisor.await {
            if !e.is_cancelled() {
                warn!(error = %e, "connection supervisor exited abnormally");
            }
        }
        self.shared.set_status(ConnectionStatus::Disconnected);
        info!(channel = %self.config.channel_name, "realtime connection manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        let status = self.status();
        let probe = *self.shared.probe.read().unwrap_or_else(PoisonError::into_inner);
        ConnectionHealth {
            status,
            is_healthy: status == ConnectionStatus::Connected,
            last_ping_at: probe.last_ping_at,
            latency_ms: probe.latency_ms,
        }
    }

    /// Number of automatic reconnect attempts made so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.shared.reconnect_attempts.load(Ordering::Relaxed)
    }
}

struct Supervisor {
    feed: Arc<dyn ChangeFeed>,
    router: Arc<EventRouter>,
    notifier: Arc<dyn Notifier>,
    shared: Arc<Shared>,
    spec: ChannelSpec,
    config: RealtimeConfig,
}

impl Supervisor {
    async fn run(self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        let mut channel: Option<FeedChannel> = None;
        let mut retry_at: Option<Instant> = None;

        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(Command::Connect { done }) => {
                        retry_at = None;
                        self.teardown(&mut channel).await;
                        let status = self.connect(&mut channel, &mut retry_at).await;
                        let _ = done.send(status);
                    }
                    Some(Command::Stop) | None => {
                        self.teardown(&mut channel).await;
                        break;
                    }
                },

                message = next_message(&mut channel) => match message {
                    Some(FeedMessage::Notification(notification)) => {
                        if let Err(e) = self.router.route(notification).await {
                            debug!(error = %e, "notification not dispatched");
                        }
                    }
                    Some(FeedMessage::Closed) | None => {
                        channel = None;
                        self.shared.set_status(ConnectionStatus::Disconnected);
                        info!(channel = %self.spec.name, retry_in_ms = self.config.graceful_retry_ms, "feed channel closed, reconnecting");
                        retry_at = Some(Instant::now() + self.config.graceful_retry());
                    }
                    Some(FeedMessage::Failed(reason)) => {
                        channel = None;
                        self.fail(&reason, &mut retry_at);
                    }
                },

                () = wait_until(retry_at) => {
                    retry_at = None;
                    let attempt = self.shared.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(attempt, "reconnecting to feed");
                    self.connect(&mut channel, &mut retry_at).await;
                }
            }
        }

        self.shared.set_status(ConnectionStatus::Disconnected);
        debug!(channel = %self.spec.name, "connection supervisor exited");
    }

    async fn connect(&self, channel: &mut Option<FeedChannel>, retry_at: &mut Option<Instant>) -> ConnectionStatus {
        self.shared.set_status(ConnectionStatus::Connecting);
        let resources = self.spec.resources();
        match tokio::time::timeout(self.config.handshake_timeout(), self.feed.open_channel(&self.spec)).await {
            Ok(Ok(opened)) => {
                *channel = Some(opened);
                self.shared.set_status(ConnectionStatus::Connected);
                info!(channel = %self.spec.name, resources = resources.len(), "subscribed to change feed");
            }
            Ok(Err(e)) => self.fail(&e.to_string(), retry_at),
            Err(_) => self.fail(&RealtimeError::Timeout.to_string(), retry_at),
        }
        *self.shared.status.borrow()
    }

    fn fail(&self, reason: &str, retry_at: &mut Option<Instant>) {
        self.shared.set_status(ConnectionStatus::Error);
        warn!(channel = %self.spec.name, %reason, retry_in_ms = self.config.error_retry_ms, "feed connection error");
        self.notifier.notify(Notice::error(
            "Realtime connection error",
            format!("Live updates are unavailable: {reason}. Retrying shortly."),
        ));
        *retry_at = Some(Instant::now() + self.config.error_retry());
    }

    async fn teardown(&self, channel: &mut Option<FeedChannel>) {
        if channel.take().is_some() {
            if let Err(e) = self.feed.close_channel(&self.spec.name).await {
                debug!(error = %e, "closing feed channel failed");
            }
        }
        self.shared.set_status(ConnectionStatus::Disconnected);
    }
}

async fn next_message(channel: &mut Option<FeedChannel>) -> Option<FeedMessage> {
    match channel {
        Some(channel) => channel.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Pings the feed every `every`, whatever the connection status, so latency
/// stays known through an outage. Each ping is bounded by `timeout`.
async fn probe_loop(feed: Arc<dyn ChangeFeed>, shared: Arc<Shared>, every: Duration, timeout: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let started = Instant::now();
        match tokio::time::timeout(timeout, feed.ping()).await {
            Ok(Ok(())) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                *shared.probe.write().unwrap_or_else(PoisonError::into_inner) = ProbeResult {
                    last_ping_at: Some(Utc::now()),
                    latency_ms: Some(latency_ms),
                };
                trace!(latency_ms, "health probe succeeded");
            }
            Ok(Err(e)) => warn!(error = %e, "health probe failed"),
            Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "health probe timed out"),
        }
    }
}
