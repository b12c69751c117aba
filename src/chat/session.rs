//! Chat session state — ordered message log + aggregate status
//!
//! The session owns the log exclusively: the UI reads snapshots and issues
//! commands, it never mutates messages directly. Each message is resolved at
//! most once; resolutions for cleared messages are dropped silently.

use super::selector::TransportSelector;
use super::types::{AnswerTransport, ChatMessage, Resolution, SessionStatus};
use crate::backend::{BackendApi, ScreenState};
use crate::channel::{ChannelEvent, ConnectionManager, ConnectionStatus};
use crate::http::RequestError;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

struct SessionInner {
    messages: Vec<ChatMessage>,
    status: SessionStatus,
    /// Sends/probes currently awaiting resolution; channel-only status
    /// transitions are suppressed while nonzero
    in_flight: usize,
}

/// View-model of one chat session.
///
/// Tracks the ordered log of exchanged messages and the aggregate
/// [`SessionStatus`], independent of which transport served each message.
pub struct ChatSession {
    selector: Arc<TransportSelector>,
    manager: Arc<ConnectionManager>,
    api: Arc<BackendApi>,
    inner: RwLock<SessionInner>,
}

impl ChatSession {
    /// Create the session and start watching channel status transitions
    pub fn new(
        selector: Arc<TransportSelector>,
        manager: Arc<ConnectionManager>,
        api: Arc<BackendApi>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            selector,
            manager: Arc::clone(&manager),
            api,
            inner: RwLock::new(SessionInner {
                messages: Vec::new(),
                status: SessionStatus::Idle,
                in_flight: 0,
            }),
        });

        let weak = Arc::downgrade(&session);
        let mut events = manager.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Status(status)) => match weak.upgrade() {
                        Some(session) => session.on_channel_status(status),
                        None => break,
                    },
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session status watcher lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        session
    }

    /// Production wiring: reqwest transport + tokio-tungstenite channel
    pub fn from_config(config: &crate::Config) -> Arc<Self> {
        let api = Arc::new(BackendApi::new(
            crate::http::ResilientClient::with_reqwest(),
            config.base_url.clone(),
            config.retry.clone(),
        ));
        let manager = Arc::new(ConnectionManager::with_websocket(
            config.channel_url.clone(),
            config.reconnect.clone(),
        ));
        let selector = TransportSelector::new(Arc::clone(&manager), Arc::clone(&api), config.chat.clone());
        Self::new(selector, manager, api)
    }

    /// The connection manager owning the persistent channel
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Submit a message: appends it to the log, delegates to the transport
    /// selector, and applies the single resolution.
    ///
    /// Returns the resolved message, or None when the log was cleared while
    /// the exchange was in flight (the late resolution is dropped).
    pub async fn send(&self, text: &str, screen_state: &ScreenState) -> Option<ChatMessage> {
        let message = ChatMessage::new(Some(text.to_string()));
        let id = message.id;
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.messages.push(message);
            inner.status = SessionStatus::Loading;
            inner.in_flight += 1;
        }

        let outcome = self.selector.send_chat(id, text, screen_state).await;
        self.apply_resolution(id, outcome)
    }

    /// Atomically empty the message log and reset status to idle
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.messages.clear();
        inner.status = SessionStatus::Idle;
    }

    /// Probe the backend and reconnect the persistent channel.
    ///
    /// The probe outcome drives the status; the channel reconnect is
    /// attempted regardless.
    pub async fn retry_connection(&self) -> SessionStatus {
        {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.status = SessionStatus::Loading;
            inner.in_flight += 1;
        }

        self.manager.connect();

        let status = match self.api.health().await {
            Ok(health) if health.available => SessionStatus::Online,
            Ok(_) => SessionStatus::Fallback,
            // Transient failure: degraded/offline mode, not a hard error
            Err(e) if e.is_transient() => {
                debug!("health probe failed: {}", e);
                SessionStatus::Fallback
            }
            Err(e) => {
                warn!("health probe rejected: {}", e);
                SessionStatus::Error
            }
        };

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.in_flight -= 1;
        inner.status = status.clone();
        status
    }

    /// Snapshot of the message log, in submission order
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .messages
            .clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .status
            .clone()
    }

    fn apply_resolution(
        &self,
        id: Uuid,
        outcome: Result<Resolution, RequestError>,
    ) -> Option<ChatMessage> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        inner.in_flight -= 1;

        let Some(entry) = inner.messages.iter_mut().find(|m| m.id == id) else {
            debug!(%id, "dropping resolution for cleared message");
            return None;
        };

        match outcome {
            Ok(resolution) => {
                entry.answer = resolution.answer;
                // A resolved answer without a score counts as confident
                entry.confidence = resolution.confidence.or(Some(1.0));
                entry.error = resolution.error;
                entry.transport = Some(resolution.transport);
                inner.status = if entry.is_soft_failure() {
                    SessionStatus::Fallback
                } else {
                    SessionStatus::Online
                };
            }
            Err(err) => {
                entry.answer = err.user_message().to_string();
                entry.error = true;
                entry.transport = Some(AnswerTransport::RequestFallback);
                inner.status = SessionStatus::Error;
            }
        }

        Some(entry.clone())
    }

    /// Channel-only transitions: surfaced while no exchange is in flight and
    /// no more specific loading/error state is active
    fn on_channel_status(&self, status: ConnectionStatus) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.in_flight > 0
            || matches!(inner.status, SessionStatus::Loading | SessionStatus::Error)
        {
            return;
        }

        match status {
            ConnectionStatus::Connected => {
                inner.status = SessionStatus::ChannelConnected;
            }
            ConnectionStatus::Disconnected
            | ConnectionStatus::Reconnecting { .. }
            | ConnectionStatus::Error => {
                inner.status = SessionStatus::ChannelDisconnected;
            }
            ConnectionStatus::Connecting => {}
        }
    }
}
