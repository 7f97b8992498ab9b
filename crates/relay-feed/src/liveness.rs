//! Ping/pong liveness probing for an open feed connection.
//!
//! The monitor alternates between two states: idle for `ping_interval`, then
//! send a ping and wait up to `pong_timeout` for the reader to report a pong.
//! A pong only counts if it arrives after the ping that is being waited on.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::errors::FeedError;
use crate::transport::SharedSink;

/// Probe timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LivenessConfig {
    /// Idle time between a pong (or connection start) and the next ping.
    pub ping_interval: Duration,
    /// How long to wait for a pong after each ping.
    pub pong_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// How the monitor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessOutcome {
    /// No pong arrived within the deadline.
    TimedOut,
    /// Sending the ping failed; the connection is already gone.
    ConnectionClosed(String),
    /// Stopped by the owning session.
    Cancelled,
}

impl LivenessOutcome {
    /// The session failure this outcome represents, if any.
    pub fn into_error(self, config: &LivenessConfig) -> Option<FeedError> {
        match self {
            Self::TimedOut => Some(FeedError::LivenessTimeout {
                timeout_ms: duration_ms(config.pong_timeout),
            }),
            Self::ConnectionClosed(reason) => Some(FeedError::Closed {
                reason: Some(reason),
            }),
            Self::Cancelled => None,
        }
    }
}

/// Probe the connection until it stops answering or `cancel` fires.
///
/// `pongs` must be notified (with `notify_waiters`) by whoever reads the
/// connection each time a pong frame arrives.
pub async fn run_liveness(
    sink: SharedSink,
    pongs: Arc<Notify>,
    config: LivenessConfig,
    cancel: CancellationToken,
) -> LivenessOutcome {
    loop {
        tokio::select! {
            () = time::sleep(config.ping_interval) => {}
            () = cancel.cancelled() => return LivenessOutcome::Cancelled,
        }

        // Register for the pong before the ping leaves.
        let pong = pongs.notified();
        tokio::pin!(pong);
        let _ = pong.as_mut().enable();

        let sent = tokio::select! {
            result = async { sink.lock().await.send(Message::Ping(Bytes::new())).await } => result,
            () = cancel.cancelled() => return LivenessOutcome::Cancelled,
        };
        if let Err(e) = sent {
            debug!(error = %e, "liveness ping could not be sent");
            return LivenessOutcome::ConnectionClosed(e.to_string());
        }
        trace!("liveness ping sent");

        tokio::select! {
            result = time::timeout(config.pong_timeout, pong) => {
                if result.is_err() {
                    return LivenessOutcome::TimedOut;
                }
                trace!("pong received");
            }
            () = cancel.cancelled() => return LivenessOutcome::Cancelled,
        }
    }
}

/// A running monitor task, owned by one session.
///
/// Dropping the guard cancels and aborts the task, so the monitor never
/// outlives the session that started it.
pub struct LivenessMonitor {
    config: LivenessConfig,
    cancel: CancellationToken,
    task: Option<JoinHandle<LivenessOutcome>>,
}

impl LivenessMonitor {
    /// Spawn a monitor over `sink`.
    pub fn spawn(sink: SharedSink, pongs: Arc<Notify>, config: LivenessConfig) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_liveness(sink, pongs, config, cancel.clone()));
        Self::from_task(config, cancel, task)
    }

    fn from_task(
        config: LivenessConfig,
        cancel: CancellationToken,
        task: JoinHandle<LivenessOutcome>,
    ) -> Self {
        Self {
            config,
            cancel,
            task: Some(task),
        }
    }

    /// Wait for the monitor to report a failure.
    ///
    /// Pending forever once the monitor has been cancelled or stopped, so it
    /// can sit in a `select!` loop. A monitor task that panicked is a
    /// failure: the connection would otherwise go unprobed.
    pub async fn failed(&mut self) -> FeedError {
        let Some(task) = self.task.as_mut() else {
            return std::future::pending().await;
        };
        let joined = task.await;
        self.task = None;
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "liveness monitor task failed");
                return FeedError::MonitorFailed(e.to_string());
            }
        };
        match outcome.into_error(&self.config) {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// Cancel the monitor and wait until it has exited.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
