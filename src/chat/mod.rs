//! Chat layer — transport selection and session state
//!
//! Provides:
//! - `TransportSelector` — routes each message over the persistent channel
//!   when connected, falling back to HTTP, with exactly-once resolution
//! - `ChatSession` — ordered message log plus the aggregate status the UI
//!   renders

mod selector;
mod session;
mod types;

pub use selector::TransportSelector;
pub use session::ChatSession;
pub use types::{AnswerTransport, ChatMessage, ChatSettings, Resolution, SessionStatus};
