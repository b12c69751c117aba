//! Transport selection — persistent channel first, HTTP fallback
//!
//! Each chat message resolves exactly once: a pending-answer registry keyed
//! by message id is claimed atomically by whichever path wins (channel
//! answer or timeout-triggered fallback); the loser's result is discarded.

use super::types::{AnswerTransport, ChatSettings, Resolution};
use crate::backend::{BackendApi, ScreenState};
use crate::channel::{ChannelAnswer, ChannelEvent, ConnectionManager, OutboundFrame};
use crate::http::RequestError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Channel sends awaiting an answer, in submission order
#[derive(Default)]
struct PendingAnswers {
    by_id: HashMap<Uuid, oneshot::Sender<ChannelAnswer>>,
    order: VecDeque<Uuid>,
}

impl PendingAnswers {
    fn register(&mut self, id: Uuid) -> oneshot::Receiver<ChannelAnswer> {
        let (tx, rx) = oneshot::channel();
        self.by_id.insert(id, tx);
        self.order.push_back(id);
        rx
    }

    /// Claim the entry for `id`, or the oldest pending entry for legacy
    /// answers that carry no id. Returns None when nothing matches (late or
    /// unsolicited answer).
    fn claim(&mut self, id: Option<Uuid>) -> Option<oneshot::Sender<ChannelAnswer>> {
        let id = match id {
            Some(id) => id,
            None => loop {
                let oldest = self.order.front().copied()?;
                if self.by_id.contains_key(&oldest) {
                    break oldest;
                }
                // Entry was abandoned; drop the stale order slot
                self.order.pop_front();
            },
        };
        self.order.retain(|pending| *pending != id);
        self.by_id.remove(&id)
    }

    /// Drop the entry for `id` (timeout or send failure), so a late answer
    /// finds nothing to resolve
    fn abandon(&mut self, id: Uuid) {
        self.by_id.remove(&id);
        self.order.retain(|pending| *pending != id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Routes a chat message through whichever transport is currently best,
/// with a single guaranteed terminal outcome per message.
pub struct TransportSelector {
    manager: Arc<ConnectionManager>,
    api: Arc<BackendApi>,
    settings: ChatSettings,
    pending: Mutex<PendingAnswers>,
}

impl TransportSelector {
    /// Create the selector and start its channel-answer listener
    pub fn new(
        manager: Arc<ConnectionManager>,
        api: Arc<BackendApi>,
        settings: ChatSettings,
    ) -> Arc<Self> {
        let selector = Arc::new(Self {
            manager: Arc::clone(&manager),
            api,
            settings,
            pending: Mutex::new(PendingAnswers::default()),
        });

        let weak = Arc::downgrade(&selector);
        let mut events = manager.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Answer(answer)) => match weak.upgrade() {
                        Some(selector) => selector.resolve_channel_answer(answer),
                        None => break,
                    },
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "channel answer listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        selector
    }

    /// Resolve `id`'s message: over the channel when connected (bounded
    /// wait), otherwise — or on timeout — through the resilient request
    /// client. Exactly one path produces the returned resolution.
    pub async fn send_chat(
        &self,
        id: Uuid,
        message: &str,
        screen_state: &ScreenState,
    ) -> Result<Resolution, RequestError> {
        if self.settings.prefer_persistent_channel && self.manager.is_connected() {
            if let Some(resolution) = self.send_over_channel(id, message, screen_state).await {
                return Ok(resolution);
            }
            debug!(%id, "no channel answer in time, falling back to HTTP");
        }

        self.send_fallback(message, screen_state).await
    }

    async fn send_over_channel(
        &self,
        id: Uuid,
        message: &str,
        screen_state: &ScreenState,
    ) -> Option<Resolution> {
        let receiver = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.register(id)
        };

        let frame = if self.settings.legacy_text_frames {
            OutboundFrame::LegacyChat(message.to_string())
        } else {
            let screen = serde_json::to_value(screen_state).unwrap_or_default();
            OutboundFrame::chat(id, message, &screen)
        };

        if self.manager.send(frame).await.is_err() {
            self.abandon(id);
            return None;
        }

        match tokio::time::timeout(self.settings.answer_timeout, receiver).await {
            Ok(Ok(answer)) => Some(Resolution {
                answer: answer.answer,
                confidence: answer.confidence,
                error: false,
                transport: AnswerTransport::PersistentChannel,
            }),
            // Listener dropped the sender (manager torn down) or timeout:
            // claim the entry back so a late answer is discarded
            Ok(Err(_)) | Err(_) => {
                self.abandon(id);
                None
            }
        }
    }

    async fn send_fallback(
        &self,
        message: &str,
        screen_state: &ScreenState,
    ) -> Result<Resolution, RequestError> {
        let response = self.api.chat(message, screen_state).await?;
        Ok(Resolution {
            answer: response.answer,
            confidence: response.confidence,
            error: false,
            transport: AnswerTransport::RequestFallback,
        })
    }

    fn resolve_channel_answer(&self, answer: ChannelAnswer) {
        let claimed = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.claim(answer.id)
        };
        match claimed {
            // Receiver side may already be gone; either way the entry is spent
            Some(tx) => {
                let _ = tx.send(answer);
            }
            None => {
                debug!(id = ?answer.id, "discarding late or unsolicited channel answer");
            }
        }
    }

    fn abandon(&self, id: Uuid) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.abandon(id);
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
