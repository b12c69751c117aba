//! Connection manager — the reconnection state machine
//!
//! Owns the single logical persistent connection. A driver task holds the
//! socket handles, so at most one socket is ever open for the logical
//! connection; reconnect attempts are strictly sequential.

use super::connector::{ChannelConnector, ChannelError, ChannelHandles};
use super::frames::{ChannelAnswer, InboundFrame, OutboundFrame};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Capacity of the driver command channel
const CMD_CAPACITY: usize = 32;

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 256;

/// Current status of the logical connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected and not attempting to connect (initial, or after an
    /// explicit disconnect)
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Open and ready to exchange frames
    Connected,
    /// Connection lost; a reconnect is scheduled
    Reconnecting { attempt: u32 },
    /// Reconnect attempts exhausted
    Error,
}

/// Reconnect schedule: capped exponential backoff with random jitter
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_interval: Duration,
    pub max_interval: Duration,
    /// Upper bound of the uniform random delay added to each backoff
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic part of the delay before reconnect `attempt` (1-indexed)
    pub(crate) fn backoff_base(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }

    /// Full delay before reconnect `attempt`, with jitter applied
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base(attempt);
        if self.jitter.is_zero() {
            return base;
        }
        let jitter_ms = (rand::random::<f64>() * self.jitter.as_millis() as f64) as u64;
        base + Duration::from_millis(jitter_ms)
    }
}

/// Events delivered to subscribers, in the order they occur
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Status(ConnectionStatus),
    Price(f64),
    Answer(ChannelAnswer),
}

/// Commands from the public API to the driver task
enum DriverCommand {
    Send(OutboundFrame),
    Disconnect,
}

/// Why one socket's I/O loop ended
enum IoOutcome {
    /// `disconnect()` was requested, or the manager was dropped
    Teardown,
    /// The socket closed unexpectedly; the driver should reconnect
    SocketClosed,
}

/// Owns the single logical persistent connection to the backend.
///
/// `connect()` is idempotent while a driver is alive; `disconnect()`
/// suppresses auto-reconnect and cancels any pending reconnect timer.
/// Status changes, price updates, and chat answers are broadcast to
/// subscribers via [`subscribe`](ConnectionManager::subscribe).
pub struct ConnectionManager {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn ChannelConnector>,
    status: Arc<RwLock<ConnectionStatus>>,
    last_error: Arc<RwLock<Option<String>>>,
    events: broadcast::Sender<ChannelEvent>,
    /// Live driver's command sender; a closed sender means the driver exited
    driver: Mutex<Option<mpsc::Sender<DriverCommand>>>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            url: url.into(),
            policy,
            connector,
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            last_error: Arc::new(RwLock::new(None)),
            events,
            driver: Mutex::new(None),
        }
    }

    /// Production wiring over tokio-tungstenite
    pub fn with_websocket(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self::new(url, policy, Arc::new(super::connector::WsConnector::new()))
    }

    /// Open the connection. No-op while a driver is already connecting,
    /// connected, or reconnecting — a second socket is never opened.
    pub fn connect(&self) {
        let mut slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = slot.as_ref() {
            if !tx.is_closed() {
                debug!("connect() ignored, driver already active");
                return;
            }
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CAPACITY);
        *slot = Some(cmd_tx);
        drop(slot);

        let driver = DriverContext {
            url: self.url.clone(),
            policy: self.policy.clone(),
            connector: Arc::clone(&self.connector),
            status: Arc::clone(&self.status),
            last_error: Arc::clone(&self.last_error),
            events: self.events.clone(),
        };
        tokio::spawn(driver.run(cmd_rx));
    }

    /// Tear down the connection and suppress auto-reconnect. Always
    /// permitted; cancels a pending reconnect timer.
    pub fn disconnect(&self) {
        let taken = {
            let mut slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        match taken {
            Some(tx) if !tx.is_closed() => {
                // Dropping tx afterwards also closes the command channel, so
                // the driver still tears down if this race loses.
                let _ = tx.try_send(DriverCommand::Disconnect);
            }
            _ => {
                set_status(&self.status, &self.events, ConnectionStatus::Disconnected);
            }
        }
    }

    /// Send a frame on the live socket
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), ChannelError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ChannelError::NotConnected);
        }
        let tx = {
            let slot = self.driver.lock().unwrap_or_else(|e| e.into_inner());
            slot.clone()
        };
        match tx {
            Some(tx) => tx
                .send(DriverCommand::Send(frame))
                .await
                .map_err(|_| ChannelError::NotConnected),
            None => Err(ChannelError::NotConnected),
        }
    }

    /// Subscribe to status/price/answer events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn set_status(
    status: &RwLock<ConnectionStatus>,
    events: &broadcast::Sender<ChannelEvent>,
    next: ConnectionStatus,
) {
    {
        let mut guard = status.write().unwrap_or_else(|e| e.into_inner());
        if *guard == next {
            return;
        }
        debug!(from = ?*guard, to = ?next, "channel status change");
        *guard = next.clone();
    }
    // Fire-and-forget; no subscribers is fine
    let _ = events.send(ChannelEvent::Status(next));
}

/// Everything the driver task needs, detached from the manager so the
/// manager itself can be dropped independently
struct DriverContext {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn ChannelConnector>,
    status: Arc<RwLock<ConnectionStatus>>,
    last_error: Arc<RwLock<Option<String>>>,
    events: broadcast::Sender<ChannelEvent>,
}

impl DriverContext {
    fn set_status(&self, next: ConnectionStatus) {
        set_status(&self.status, &self.events, next);
    }

    fn record_error(&self, message: Option<String>) {
        let mut guard = self.last_error.write().unwrap_or_else(|e| e.into_inner());
        *guard = message;
    }

    async fn run(self, mut cmd_rx: mpsc::Receiver<DriverCommand>) {
        // Consecutive failed reconnects; reset on every successful open
        let mut attempt: u32 = 0;

        loop {
            self.set_status(ConnectionStatus::Connecting);

            match self.connector.connect(&self.url).await {
                Ok(handles) => {
                    info!(url = %self.url, "channel connected");
                    attempt = 0;
                    self.record_error(None);
                    self.set_status(ConnectionStatus::Connected);

                    match self.io_loop(handles, &mut cmd_rx).await {
                        IoOutcome::Teardown => {
                            self.set_status(ConnectionStatus::Disconnected);
                            return;
                        }
                        IoOutcome::SocketClosed => {}
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, "channel dial failed: {}", e);
                    self.record_error(Some(e.to_string()));
                }
            }

            attempt += 1;
            if attempt > self.policy.max_attempts {
                error!(
                    max_attempts = self.policy.max_attempts,
                    "channel reconnect attempts exhausted"
                );
                self.set_status(ConnectionStatus::Error);
                return;
            }

            self.set_status(ConnectionStatus::Reconnecting { attempt });
            let delay = self.policy.backoff_delay(attempt);
            info!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "channel reconnect scheduled"
            );

            // Sleep, but stay responsive to disconnect — it cancels the
            // pending reconnect.
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    cmd = cmd_rx.recv() => match cmd {
                        Some(DriverCommand::Disconnect) | None => {
                            debug!("reconnect cancelled by disconnect");
                            self.set_status(ConnectionStatus::Disconnected);
                            return;
                        }
                        Some(DriverCommand::Send(_)) => {
                            debug!("dropping outbound frame while reconnecting");
                        }
                    }
                }
            }
        }
    }

    /// Drive one socket until it closes or teardown is requested
    async fn io_loop(
        &self,
        mut handles: ChannelHandles,
        cmd_rx: &mut mpsc::Receiver<DriverCommand>,
    ) -> IoOutcome {
        loop {
            tokio::select! {
                inbound = handles.inbound.recv() => match inbound {
                    Some(raw) => self.handle_frame(&raw, &handles.outbound).await,
                    None => {
                        info!("channel closed");
                        return IoOutcome::SocketClosed;
                    }
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(DriverCommand::Send(frame)) => {
                        if handles.outbound.send(frame.encode()).await.is_err() {
                            return IoOutcome::SocketClosed;
                        }
                    }
                    Some(DriverCommand::Disconnect) | None => {
                        return IoOutcome::Teardown;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, raw: &str, outbound: &mpsc::Sender<String>) {
        match InboundFrame::parse(raw) {
            Some(InboundFrame::Ping) => {
                // Keep-alive: answered on the same channel, never surfaced
                let _ = outbound.send(OutboundFrame::Pong.encode()).await;
            }
            Some(InboundFrame::Pong) => {}
            Some(InboundFrame::PriceUpdate(price)) => {
                let _ = self.events.send(ChannelEvent::Price(price));
            }
            Some(InboundFrame::ChatAnswer(answer)) => {
                let _ = self.events.send(ChannelEvent::Answer(answer));
            }
            None => {
                warn!(frame = %raw, "dropping malformed channel frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeConnector, RemoteSide};

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            base_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(400),
            jitter: Duration::ZERO,
        }
    }

    fn manager(
        script: Vec<bool>,
        policy: ReconnectPolicy,
    ) -> (
        Arc<ConnectionManager>,
        Arc<FakeConnector>,
        mpsc::UnboundedReceiver<RemoteSide>,
    ) {
        let (connector, remotes) = FakeConnector::new(script);
        let manager = Arc::new(ConnectionManager::new(
            "ws://test/ws",
            policy,
            connector.clone() as Arc<dyn ChannelConnector>,
        ));
        (manager, connector, remotes)
    }

    /// Poll for a status, sleeping between checks (lets paused time advance)
    async fn wait_for_status(
        manager: &ConnectionManager,
        pred: impl Fn(&ConnectionStatus) -> bool,
    ) {
        for _ in 0..400 {
            if pred(&manager.status()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for status, last = {:?}", manager.status());
    }

    /// Poll for a status without sleeping (keeps paused time frozen)
    async fn spin_for_status(
        manager: &ConnectionManager,
        pred: impl Fn(&ConnectionStatus) -> bool,
    ) {
        for _ in 0..2000 {
            if pred(&manager.status()) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("spun out waiting for status, last = {:?}", manager.status());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = fast_policy(10);
        assert_eq!(policy.backoff_base(1), Duration::from_millis(50));
        assert_eq!(policy.backoff_base(2), Duration::from_millis(100));
        assert_eq!(policy.backoff_base(3), Duration::from_millis(200));
        assert_eq!(policy.backoff_base(4), Duration::from_millis(400));
        assert_eq!(policy.backoff_base(5), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = ReconnectPolicy {
            jitter: Duration::from_millis(100),
            ..fast_policy(3)
        };
        for _ in 0..100 {
            let delay = policy.backoff_delay(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_idempotent_single_socket() {
        let (manager, connector, _remotes) = manager(vec![true], fast_policy(3));

        manager.connect();
        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        manager.connect();

        assert_eq!(connector.dials(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_exhaustion_reaches_error() {
        let (manager, connector, _remotes) = manager(vec![], fast_policy(3));

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Error).await;

        // Initial dial plus three reconnect attempts
        assert_eq!(connector.dials(), 4);
        assert!(manager.last_error().is_some());

        // No timer left pending: nothing further happens
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.dials(), 4);
        assert_eq!(manager.status(), ConnectionStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_open_resets_attempt_counter() {
        // Refuse twice, accept, then refuse forever
        let (manager, connector, mut remotes) = manager(vec![false, false, true], fast_policy(3));

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        assert_eq!(connector.dials(), 3);
        assert!(manager.last_error().is_none());

        // Drop the socket: the counter restarts from 1, so the driver gets a
        // full fresh budget before giving up.
        let remote = remotes.recv().await.unwrap();
        drop(remote);
        wait_for_status(&manager, |s| *s == ConnectionStatus::Error).await;
        assert_eq!(connector.dials(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_reconnecting_cancels_timer() {
        let policy = ReconnectPolicy {
            base_interval: Duration::from_secs(60),
            ..fast_policy(5)
        };
        let (manager, connector, mut remotes) = manager(vec![true], policy);

        manager.connect();
        spin_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;

        // Unexpected close → reconnecting (time is frozen while we spin, so
        // the backoff timer cannot fire)
        let remote = remotes.recv().await.unwrap();
        drop(remote);
        spin_for_status(&manager, |s| {
            matches!(s, ConnectionStatus::Reconnecting { attempt: 1 })
        })
        .await;

        manager.disconnect();
        spin_for_status(&manager, |s| *s == ConnectionStatus::Disconnected).await;

        // The pending reconnect was cancelled and never re-triggers
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.dials(), 1);
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_then_reconnect_allowed() {
        let (manager, connector, _remotes) = manager(vec![true, true], fast_policy(3));

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        manager.disconnect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Disconnected).await;

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        assert_eq!(connector.dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_answered_with_pong_not_surfaced() {
        let (manager, _connector, mut remotes) = manager(vec![true], fast_policy(3));
        let mut events = manager.subscribe();

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        let mut remote = remotes.recv().await.unwrap();

        remote.to_client.send("ping".into()).await.unwrap();
        assert_eq!(remote.from_client.recv().await.unwrap(), "pong");

        // Keep-alives never reach subscribers; only the status events do
        while let Ok(event) = events.try_recv() {
            assert!(matches!(event, ChannelEvent::Status(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_dispatch_and_malformed_drop() {
        let (manager, _connector, mut remotes) = manager(vec![true], fast_policy(3));

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        let remote = remotes.recv().await.unwrap();
        let mut events = manager.subscribe();

        remote
            .to_client
            .send(r#"{"type":"price_update","data":{"price":64000.0}}"#.into())
            .await
            .unwrap();
        // Malformed frame is logged and dropped, not dispatched
        remote
            .to_client
            .send(r#"{"type":"price_update"#.into())
            .await
            .unwrap();
        remote
            .to_client
            .send("Gamma measures delta change.".into())
            .await
            .unwrap();

        let first = loop {
            match events.recv().await.unwrap() {
                ChannelEvent::Status(_) => continue,
                other => break other,
            }
        };
        assert!(matches!(first, ChannelEvent::Price(p) if p == 64000.0));

        match events.recv().await.unwrap() {
            ChannelEvent::Answer(answer) => {
                assert_eq!(answer.answer, "Gamma measures delta change.");
                assert!(answer.id.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connected_channel() {
        let (manager, _connector, mut remotes) = manager(vec![true], fast_policy(3));

        let err = manager.send(OutboundFrame::Pong).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));

        manager.connect();
        wait_for_status(&manager, |s| *s == ConnectionStatus::Connected).await;
        let mut remote = remotes.recv().await.unwrap();

        manager
            .send(OutboundFrame::LegacyChat("What is Vega?".into()))
            .await
            .unwrap();
        assert_eq!(
            remote.from_client.recv().await.unwrap(),
            "chat:What is Vega?"
        );
    }
}
