//! Injected socket provider
//!
//! The connection manager never touches a WebSocket directly — it receives a
//! pair of frame handles from a `ChannelConnector`. The production connector
//! bridges tokio-tungstenite text frames through pump tasks; tests hand the
//! manager in-memory channels instead.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

/// Capacity of the outbound frame channel (bounded, applies backpressure)
const OUTBOUND_CAPACITY: usize = 32;

/// Capacity of the inbound frame channel (bounded, frames can be bursty)
const INBOUND_CAPACITY: usize = 256;

/// Channel-layer failures
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("channel is not connected")]
    NotConnected,
}

/// Paired frame handles for one live socket.
///
/// Dropping `outbound` closes the socket; `inbound` yielding `None` means the
/// socket closed.
pub struct ChannelHandles {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens one socket per call. Implementations perform exactly one dial;
/// reconnect policy lives in the manager.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<ChannelHandles, ChannelError>;
}

/// Production connector over tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<ChannelHandles, ChannelError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!(%url, "websocket opened");

        let (mut ws_sink, mut ws_source) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_CAPACITY);

        // Writer pump: outbound frames → socket. Ends when the manager drops
        // its sender, which closes the socket.
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                    warn!("websocket send failed: {}", e);
                    break;
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader pump: socket text frames → inbound channel. Dropping the
        // sender on close/error signals the manager.
        tokio::spawn(async move {
            while let Some(message) = ws_source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by remote");
                        break;
                    }
                    // Protocol-level ping/pong is handled by tungstenite;
                    // binary frames are not part of this protocol.
                    Ok(_) => {}
                    Err(e) => {
                        warn!("websocket read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(ChannelHandles {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
