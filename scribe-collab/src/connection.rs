//! Connection manager: the single duplex channel to the collaboration backend.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect, automatic reconnect)
//! - Exponential backoff with a bounded attempt budget
//! - Heartbeat pings while a link is up
//! - Fire-and-forget sends through a per-link outbox
//!
//! The socket itself lives in a background "link driver" task. The manager
//! only sees the driver through a FIFO of [`TransportEvent`]s, and its
//! [`ConnectionState`] changes when those events are handled, so the state a
//! caller observes always matches the order in which events were processed.
//!
//! ```text
//!  ConnectionManager                       link driver (tokio task)
//!  ─────────────────                       ────────────────────────
//!  send(msg) ──► Outbox ──────────────────► WebSocket text frame
//!  handle(ev) ◄── TransportEvent FIFO ◄───── Opened / Frame / Closed / Failed / GaveUp
//!  disconnect() ──► shutdown signal ──────► close + exit
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reconnection and liveness settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Reconnect automatically after a drop or a failed attempt
    pub reconnection: bool,
    /// Consecutive failed attempts tolerated before giving up
    pub reconnection_attempts: u32,
    /// Delay before the first reconnection attempt
    pub reconnection_delay: Duration,
    /// Upper bound for the exponential backoff
    pub reconnection_delay_max: Duration,
    /// Time allowed for one connection attempt
    pub connect_timeout: Duration,
    /// Interval between WebSocket pings while connected; zero disables pings
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnection: true,
            reconnection_attempts: 5,
            reconnection_delay: Duration::from_millis(1000),
            reconnection_delay_max: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(25),
        }
    }
}

impl ConnectionConfig {
    /// Backoff before reconnection attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.reconnection_delay
            .saturating_mul(1u32 << exponent)
            .min(self.reconnection_delay_max)
    }
}

/// Connectivity errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("no Tokio runtime available to drive the connection")]
    NoRuntime,
    #[error("connection attempt {attempt} failed: {reason}")]
    AttemptFailed { attempt: u32, reason: String },
    #[error("failed to reconnect after {attempts} attempts")]
    ReconnectFailed { attempts: u32 },
    #[error("channel unavailable")]
    ChannelUnavailable,
}

/// Sending half of one established link.
///
/// Sends never wait: frames are queued for the link driver's writer.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl Outbox {
    /// Create an outbox and the receiver a link writer consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, msg: ClientMessage) -> Result<(), ConnectionError> {
        self.tx.send(msg).map_err(|_| ConnectionError::ChannelUnavailable)
    }

    /// Whether the link behind this outbox has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Events produced by the link driver, in the order they happened.
#[derive(Debug)]
pub enum TransportEvent {
    /// A link was established; outgoing frames go through the outbox.
    Opened(Outbox),
    /// The link dropped.
    Closed { reason: Option<String> },
    /// A decoded frame from the backend.
    Frame(ServerMessage),
    /// A frame that could not be decoded.
    Malformed(ProtocolError),
    /// One connection attempt failed; the driver will retry.
    Failed { attempt: u32, reason: String },
    /// The retry budget is exhausted; the driver has stopped.
    GaveUp { attempts: u32 },
}

/// What a handled [`TransportEvent`] means to the session layer.
#[derive(Debug)]
pub enum ConnectionSignal {
    /// The channel became available.
    Up,
    /// The channel is no longer available.
    Down,
    Frame(ServerMessage),
    Malformed(ProtocolError),
    /// A recoverable connectivity error; retries continue.
    Error(ConnectionError),
    /// The driver gave up; manual `connect` is required.
    Terminal(ConnectionError),
}

/// Owns the channel to the backend.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: ConnectionState,
    outbox: Option<Outbox>,
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    address: Option<String>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            outbox: None,
            events_rx: None,
            shutdown_tx: None,
            address: None,
        }
    }

    /// Start driving a link to `address` in the background.
    ///
    /// No-op while a link driver is already running. Must be called from
    /// within a Tokio runtime.
    pub fn connect(&mut self, address: &str) -> Result<(), ConnectionError> {
        if self.is_driving() {
            log::debug!("connect({address}) ignored: link already active");
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        handle.spawn(run_link(
            address.to_string(),
            self.config.clone(),
            events_tx,
            shutdown_rx,
        ));

        log::info!("Connecting to {address}");
        self.events_rx = Some(events_rx);
        self.shutdown_tx = Some(shutdown_tx);
        self.address = Some(address.to_string());
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Terminate the channel. No reconnection happens until the next `connect`.
    ///
    /// Returns `true` if the channel was up.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.state == ConnectionState::Connected;
        if let Some(shutdown) = self.shutdown_tx.take() {
            let _ = shutdown.send(true);
        }
        self.events_rx = None;
        self.outbox = None;
        if self.state != ConnectionState::Disconnected {
            log::info!("Disconnected from {}", self.address.as_deref().unwrap_or("backend"));
        }
        self.state = ConnectionState::Disconnected;
        was_connected
    }

    /// Wait for the next event from the link driver.
    ///
    /// Returns `None` when no driver is running. Cancel-safe.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events_rx.as_mut()?.recv().await
    }

    /// Apply a transport event to the connection state.
    pub fn handle(&mut self, event: TransportEvent) -> ConnectionSignal {
        match event {
            TransportEvent::Opened(outbox) => {
                log::info!("Connected to {}", self.address.as_deref().unwrap_or("backend"));
                self.outbox = Some(outbox);
                self.state = ConnectionState::Connected;
                ConnectionSignal::Up
            }
            TransportEvent::Closed { reason } => {
                match reason {
                    Some(reason) => log::warn!("Connection lost: {reason}"),
                    None => log::info!("Connection closed by backend"),
                }
                self.outbox = None;
                if self.config.reconnection && self.events_rx.is_some() {
                    self.state = ConnectionState::Reconnecting;
                } else {
                    // The driver exits after reporting the drop; only `connect` starts a new one.
                    self.stop_driver();
                }
                ConnectionSignal::Down
            }
            TransportEvent::Frame(msg) => ConnectionSignal::Frame(msg),
            TransportEvent::Malformed(err) => ConnectionSignal::Malformed(err),
            TransportEvent::Failed { attempt, reason } => {
                log::warn!("Connection attempt {attempt} failed: {reason}");
                if self.config.reconnection && self.events_rx.is_some() {
                    self.state = ConnectionState::Reconnecting;
                }
                ConnectionSignal::Error(ConnectionError::AttemptFailed { attempt, reason })
            }
            TransportEvent::GaveUp { attempts } => {
                log::error!("Giving up after {attempts} connection attempts");
                self.stop_driver();
                ConnectionSignal::Terminal(ConnectionError::ReconnectFailed { attempts })
            }
        }
    }

    /// Queue a message on the current link.
    pub fn send(&self, msg: ClientMessage) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::ChannelUnavailable);
        }
        match &self.outbox {
            Some(outbox) => outbox.send(msg),
            None => Err(ConnectionError::ChannelUnavailable),
        }
    }

    /// Connected with a live outbox.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
            && self.outbox.as_ref().is_some_and(|o| !o.is_closed())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_driving(&self) -> bool {
        self.events_rx.is_some()
    }

    /// Forget a driver that has already exited.
    fn stop_driver(&mut self) {
        self.shutdown_tx = None;
        self.events_rx = None;
        self.outbox = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown_tx.take() {
            let _ = shutdown.send(true);
        }
    }
}

enum LinkEnd {
    Shutdown,
    Dropped(Option<String>),
}

/// Link driver: connect, pump frames, reconnect with backoff.
async fn run_link(
    address: String,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let attempt = tokio::select! {
            result = tokio::time::timeout(
                config.connect_timeout,
                tokio_tungstenite::connect_async(address.as_str()),
            ) => result,
            _ = shutdown.changed() => return,
        };

        match attempt {
            Ok(Ok((ws_stream, _))) => {
                failures = 0;
                let (outbox, out_rx) = Outbox::channel();
                if events.send(TransportEvent::Opened(outbox)).is_err() {
                    return;
                }

                match pump(ws_stream, out_rx, &events, &mut shutdown, &config).await {
                    LinkEnd::Shutdown => return,
                    LinkEnd::Dropped(reason) => {
                        if events.send(TransportEvent::Closed { reason }).is_err() {
                            return;
                        }
                    }
                }

                if !config.reconnection {
                    return;
                }
            }
            Ok(Err(e)) => {
                failures += 1;
                let failed = TransportEvent::Failed {
                    attempt: failures,
                    reason: e.to_string(),
                };
                if events.send(failed).is_err() {
                    return;
                }
            }
            Err(_) => {
                failures += 1;
                let failed = TransportEvent::Failed {
                    attempt: failures,
                    reason: format!("timed out after {:?}", config.connect_timeout),
                };
                if events.send(failed).is_err() {
                    return;
                }
            }
        }

        if failures > 0 && (!config.reconnection || failures > config.reconnection_attempts) {
            let _ = events.send(TransportEvent::GaveUp { attempts: failures });
            return;
        }

        let delay = config.reconnect_delay(failures + 1);
        log::debug!("Reconnecting to {address} in {delay:?}");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Move frames between one WebSocket and the session until the link ends.
async fn pump<S>(
    ws_stream: S,
    mut out_rx: mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
    config: &ConnectionConfig,
) -> LinkEnd
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut ws_writer, mut ws_reader) = ws_stream.split();
    let mut heartbeat = if config.heartbeat_interval.is_zero() {
        None
    } else {
        let mut interval = tokio::time::interval(config.heartbeat_interval);
        interval.tick().await; // first tick completes immediately
        Some(interval)
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = ws_writer.send(Message::Close(None)).await;
                return LinkEnd::Shutdown;
            }

            outgoing = out_rx.recv() => {
                let Some(msg) = outgoing else {
                    // Every outbox handle is gone: nobody can send on this link anymore.
                    let _ = ws_writer.send(Message::Close(None)).await;
                    return LinkEnd::Shutdown;
                };
                match msg.encode() {
                    Ok(text) => {
                        log::trace!("-> {}", msg.event_name());
                        if let Err(e) = ws_writer.send(Message::Text(text.into())).await {
                            return LinkEnd::Dropped(Some(e.to_string()));
                        }
                    }
                    Err(e) => log::error!("Dropping unencodable {} message: {e}", msg.event_name()),
                }
            }

            incoming = ws_reader.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => match ServerMessage::decode(text.as_str()) {
                        Ok(msg) => TransportEvent::Frame(msg),
                        Err(e) => TransportEvent::Malformed(e),
                    },
                    Some(Ok(Message::Binary(_))) => {
                        TransportEvent::Malformed(ProtocolError::UnexpectedFrame("binary"))
                    }
                    Some(Ok(Message::Close(_))) | None => return LinkEnd::Dropped(None),
                    Some(Err(e)) => return LinkEnd::Dropped(Some(e.to_string())),
                    Some(Ok(_)) => continue,
                };
                if events.send(event).is_err() {
                    let _ = ws_writer.send(Message::Close(None)).await;
                    return LinkEnd::Shutdown;
                }
            }

            _ = async {
                match heartbeat.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Err(e) = ws_writer.send(Message::Ping(Vec::<u8>::new().into())).await {
                    return LinkEnd::Dropped(Some(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert!(config.reconnection);
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.reconnection_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = ConnectionConfig::default();
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(2), Duration::from_millis(2000));
        assert_eq!(config.reconnect_delay(3), Duration::from_millis(4000));
        assert_eq!(config.reconnect_delay(4), Duration::from_millis(5000));
        assert_eq!(config.reconnect_delay(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_initial_state() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
        assert!(manager.address().is_none());
    }

    #[test]
    fn test_connect_without_runtime_fails() {
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        assert_eq!(manager.connect("ws://127.0.0.1:9"), Err(ConnectionError::NoRuntime));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_requires_connection() {
        let manager = ConnectionManager::new(ConnectionConfig::default());
        let msg = ClientMessage::Watch { path: "a".into() };
        assert_eq!(manager.send(msg), Err(ConnectionError::ChannelUnavailable));
    }

    #[test]
    fn test_opened_and_closed_transitions() {
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        let (outbox, mut rx) = Outbox::channel();

        assert!(matches!(manager.handle(TransportEvent::Opened(outbox)), ConnectionSignal::Up));
        assert!(manager.is_connected());

        manager.send(ClientMessage::Watch { path: "a".into() }).unwrap();
        assert_eq!(rx.try_recv().unwrap(), ClientMessage::Watch { path: "a".into() });

        let signal = manager.handle(TransportEvent::Closed { reason: Some("reset".into()) });
        assert!(matches!(signal, ConnectionSignal::Down));
        assert!(!manager.is_connected());
        // No driver was started, so there is nothing to reconnect.
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_closed_outbox_is_not_connected() {
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        let (outbox, rx) = Outbox::channel();
        manager.handle(TransportEvent::Opened(outbox));
        drop(rx);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_gave_up_is_terminal() {
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        let signal = manager.handle(TransportEvent::GaveUp { attempts: 6 });
        match signal {
            ConnectionSignal::Terminal(ConnectionError::ReconnectFailed { attempts }) => {
                assert_eq!(attempts, 6)
            }
            other => panic!("Expected Terminal, got {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_unreachable_backend_gives_up() {
        let config = ConnectionConfig {
            reconnection_attempts: 2,
            reconnection_delay: Duration::from_millis(5),
            reconnection_delay_max: Duration::from_millis(10),
            connect_timeout: Duration::from_millis(500),
            ..ConnectionConfig::default()
        };
        // Bind then drop a listener so the port refuses connections.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let mut manager = ConnectionManager::new(config);
        manager.connect(&format!("ws://{addr}")).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let mut failures = 0;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), manager.recv())
                .await
                .expect("driver should report within timeout")
                .expect("driver should still be running");
            match manager.handle(event) {
                ConnectionSignal::Error(_) => {
                    failures += 1;
                    assert_eq!(manager.state(), ConnectionState::Reconnecting);
                }
                ConnectionSignal::Terminal(ConnectionError::ReconnectFailed { attempts }) => {
                    assert_eq!(attempts, 3);
                    break;
                }
                other => panic!("Unexpected signal {other:?}"),
            }
        }
        assert_eq!(failures, 3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_without_reconnection_allows_new_connect() {
        let config = ConnectionConfig {
            reconnection: false,
            ..ConnectionConfig::default()
        };
        let mut manager = ConnectionManager::new(config);
        manager.connect("ws://127.0.0.1:9").unwrap();
        let (outbox, _rx) = Outbox::channel();
        manager.handle(TransportEvent::Opened(outbox));

        let signal = manager.handle(TransportEvent::Closed { reason: None });
        assert!(matches!(signal, ConnectionSignal::Down));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.recv().await.is_none());

        manager.connect("ws://127.0.0.1:10").unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.address(), Some("ws://127.0.0.1:10"));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let mut manager = ConnectionManager::new(ConnectionConfig::default());
        manager.connect("ws://127.0.0.1:9").unwrap();
        manager.connect("ws://127.0.0.1:10").unwrap();
        assert_eq!(manager.address(), Some("ws://127.0.0.1:9"));
        assert!(!manager.disconnect());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
