//! Session-level failures.
//!
//! Every variant ends the current session and is handed to the supervisor,
//! which logs it and engages backoff. Per-notification problems never show
//! up here.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Why a feed session ended.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The connection could not be established.
    #[error("failed to connect to feed: {0}")]
    Connect(String),

    /// The connection was closed by the peer or the stream ended.
    #[error("feed connection closed{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed {
        /// Close reason, when the peer sent one.
        reason: Option<String>,
    },

    /// Reading from or writing to the connection failed.
    #[error("feed transport error: {0}")]
    Transport(String),

    /// No pong arrived in time after a liveness probe.
    #[error("liveness probe timed out after {timeout_ms}ms")]
    LivenessTimeout {
        /// The pong deadline that elapsed.
        timeout_ms: u64,
    },

    /// The feed answered the subscribe request with an error.
    #[error("subscription rejected ({code}): {message}")]
    SubscribeRejected {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the feed.
        message: String,
    },

    /// The subscription was not confirmed in time.
    #[error("subscription not confirmed within {timeout_ms}ms")]
    SubscribeTimeout {
        /// The confirmation deadline that elapsed.
        timeout_ms: u64,
    },

    /// The feed sent something the handshake could not interpret.
    #[error("feed protocol error: {0}")]
    Protocol(String),

    /// The liveness monitor task died without reporting an outcome.
    #[error("liveness monitor failed: {0}")]
    MonitorFailed(String),
}

impl FeedError {
    /// Short failure class, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Closed { .. } => "closed",
            Self::Transport(_) => "transport",
            Self::LivenessTimeout { .. } => "liveness",
            Self::SubscribeRejected { .. } => "rejected",
            Self::SubscribeTimeout { .. } => "subscribe_timeout",
            Self::Protocol(_) => "protocol",
            Self::MonitorFailed(_) => "monitor",
        }
    }
}

impl From<tungstenite::Error> for FeedError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed { reason: None }
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_display_with_and_without_reason() {
        assert_eq!(
            FeedError::Closed { reason: None }.to_string(),
            "feed connection closed"
        );
        assert_eq!(
            FeedError::Closed {
                reason: Some("going away".into())
            }
            .to_string(),
            "feed connection closed: going away"
        );
    }

    #[test]
    fn liveness_display() {
        let err = FeedError::LivenessTimeout { timeout_ms: 10_000 };
        assert_eq!(err.to_string(), "liveness probe timed out after 10000ms");
        assert_eq!(err.kind(), "liveness");
    }

    #[test]
    fn tungstenite_close_maps_to_closed() {
        let err: FeedError = tungstenite::Error::ConnectionClosed.into();
        assert_eq!(err, FeedError::Closed { reason: None });
        let err: FeedError = tungstenite::Error::AlreadyClosed.into();
        assert_eq!(err.kind(), "closed");
    }

    #[test]
    fn other_tungstenite_errors_are_transport() {
        let err: FeedError =
            tungstenite::Error::Io(std::io::ErrorKind::ConnectionReset.into()).into();
        assert_eq!(err.kind(), "transport");
    }
}
