//! Shared test fakes: a scripted HTTP transport and an in-memory channel
//! connector, so the retry loop, the connection state machine, and the chat
//! layers can be driven deterministically without a network stack.

use crate::channel::{ChannelConnector, ChannelError, ChannelHandles};
use crate::http::{HttpTransport, RawResponse, RequestDescriptor, TransportFailure};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// HTTP
// ============================================================================

/// Transport that replays a scripted sequence of attempt outcomes.
/// Once the script runs out, every further attempt is a network failure.
pub(crate) struct ScriptedTransport {
    outcomes: Mutex<Vec<Result<RawResponse, TransportFailure>>>,
    attempts: AtomicU32,
}

impl ScriptedTransport {
    pub(crate) fn new(outcomes: Vec<Result<RawResponse, TransportFailure>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, _request: &RequestDescriptor) -> Result<RawResponse, TransportFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return Err(TransportFailure::Network("script exhausted".into()));
        }
        outcomes.remove(0)
    }
}

/// Successful attempt outcome
pub(crate) fn http_ok(status: u16, body: &str) -> Result<RawResponse, TransportFailure> {
    Ok(RawResponse {
        status,
        body: body.to_string(),
    })
}

// ============================================================================
// Channel
// ============================================================================

/// The far side of a fake socket, handed to the test on each accepted dial
pub(crate) struct RemoteSide {
    pub(crate) to_client: mpsc::Sender<String>,
    pub(crate) from_client: mpsc::Receiver<String>,
}

/// Connector that accepts or refuses dials per a script (refuses once the
/// script runs out) and hands the test the remote side of each accepted
/// socket.
pub(crate) struct FakeConnector {
    script: Mutex<VecDeque<bool>>,
    dials: AtomicU32,
    remotes: mpsc::UnboundedSender<RemoteSide>,
}

impl FakeConnector {
    pub(crate) fn new(
        script: Vec<bool>,
    ) -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<RemoteSide>) {
        let (remotes, remotes_rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                script: Mutex::new(script.into()),
                dials: AtomicU32::new(0),
                remotes,
            }),
            remotes_rx,
        )
    }

    pub(crate) fn dials(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<ChannelHandles, ChannelError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let accept = self.script.lock().unwrap().pop_front().unwrap_or(false);
        if !accept {
            return Err(ChannelError::Connect("refused".into()));
        }

        let (in_tx, in_rx) = mpsc::channel(32);
        let (out_tx, out_rx) = mpsc::channel(32);
        let _ = self.remotes.send(RemoteSide {
            to_client: in_tx,
            from_client: out_rx,
        });
        Ok(ChannelHandles {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
