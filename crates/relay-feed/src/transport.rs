//! Feed connections.
//!
//! A session only ever sees a split frame sink and frame stream; where they
//! come from is behind [`FeedConnector`]. [`WsConnector`] dials a real
//! WebSocket; the test-only `memory::MemoryConnector` hands out scripted
//! in-process connections.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::errors::FeedError;

/// Outgoing half of a feed connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Incoming half of a feed connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Outgoing half shared between the session and its liveness monitor.
pub type SharedSink = Arc<Mutex<FrameSink>>;

/// An established, split connection.
pub struct FeedConnection {
    /// Frames written to the feed.
    pub sink: FrameSink,
    /// Frames read from the feed.
    pub stream: FrameStream,
}

impl std::fmt::Debug for FeedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnection").finish_non_exhaustive()
    }
}

/// Opens connections to the feed.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Establish a new connection.
    async fn connect(&self) -> Result<FeedConnection, FeedError>;

    /// Where this connector dials, for logging.
    fn endpoint(&self) -> &str;
}

// ─── WebSocket ──────────────────────────────────────────────────────────────

/// Dials a `ws://` or `wss://` endpoint with `tokio-tungstenite`.
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector for `url`, giving up on the opening handshake after
    /// `connect_timeout`.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<FeedConnection, FeedError> {
        let (ws, response) = tokio::time::timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| {
                FeedError::Connect(format!(
                    "handshake with {} timed out after {}ms",
                    self.url,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| FeedError::Connect(format!("{}: {e}", self.url)))?;
        debug!(url = %self.url, status = %response.status(), "feed connected");

        let (sink, stream) = ws.split();
        Ok(FeedConnection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

// ─── In-memory ──────────────────────────────────────────────────────────────
