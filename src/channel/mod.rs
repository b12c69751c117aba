//! Persistent channel to the backend
//!
//! This module provides:
//! - `InboundFrame` / `OutboundFrame` — the recognized wire frames
//! - `ChannelConnector` — injected socket provider (tokio-tungstenite in
//!   production, in-memory fakes in tests)
//! - `ConnectionManager` — the reconnection state machine owning the single
//!   logical connection and broadcasting channel events

mod connector;
mod frames;
mod manager;

pub use connector::{ChannelConnector, ChannelError, ChannelHandles, WsConnector};
pub use frames::{ChannelAnswer, InboundFrame, OutboundFrame};
pub use manager::{ChannelEvent, ConnectionManager, ConnectionStatus, ReconnectPolicy};
