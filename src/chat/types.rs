//! Chat types — messages, session status, transport resolution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Chat behavior settings
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Route chat over the persistent channel when it is connected.
    /// `false` gives the HTTP-only behavior.
    pub prefer_persistent_channel: bool,
    /// Send chat as legacy `chat:<message>` text frames instead of JSON
    /// commands
    pub legacy_text_frames: bool,
    /// How long to wait for a channel answer before falling back to HTTP
    pub answer_timeout: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            prefer_persistent_channel: true,
            legacy_text_frames: false,
            answer_timeout: Duration::from_secs(10),
        }
    }
}

/// Which transport produced a message's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerTransport {
    PersistentChannel,
    RequestFallback,
}

/// Aggregate connectivity/health indicator presented to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Loading,
    Online,
    /// Degraded: low/zero-confidence answer or soft failure
    Fallback,
    /// Hard failure of the most recent exchange
    Error,
    ChannelConnected,
    ChannelDisconnected,
}

/// One user/assistant exchange turn.
///
/// Created when the user submits a message, mutated exactly once when the
/// resolution arrives. The whole log clears atomically; entries are never
/// deleted individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Outgoing user text; None for system entries
    pub question: Option<String>,
    /// Empty until resolved
    pub answer: String,
    pub confidence: Option<f64>,
    pub error: bool,
    pub transport: Option<AnswerTransport>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(question: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question,
            answer: String::new(),
            confidence: None,
            error: false,
            transport: None,
            created_at: Utc::now(),
        }
    }

    /// A resolved answer with confidence 0 is a soft failure: not a hard
    /// error, but it depresses the session status below `Online`.
    pub fn is_soft_failure(&self) -> bool {
        self.error || self.confidence == Some(0.0)
    }
}

/// Terminal outcome of one message's transport exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub answer: String,
    pub confidence: Option<f64>,
    pub error: bool,
    pub transport: AnswerTransport,
}
