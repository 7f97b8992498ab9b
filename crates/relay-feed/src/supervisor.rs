//! Reconnect supervision.
//!
//! The supervisor runs sessions back to back forever. After a failure it
//! enters a retry phase of at most `max_retries` delayed attempts; when those
//! are used up it logs the exhaustion and starts over with an immediate
//! attempt. A session that got its subscription confirmed resets the phase.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{RetryConfig, SubscriptionHandle, retry};
use relay_pipeline::Pipeline;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::session::{Session, SessionConfig};
use crate::transport::FeedConnector;

/// Observable supervisor state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// A session is connecting or negotiating its subscription.
    Connecting,
    /// The subscription is confirmed and notifications are flowing.
    Active {
        /// Handle assigned by the feed.
        handle: SubscriptionHandle,
    },
    /// Waiting before retry `attempt` (0-indexed).
    BackingOff {
        /// Retry attempt about to be made.
        attempt: u32,
        /// Delay before it.
        delay: Duration,
    },
}

/// What follows a failed session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NextStep {
    /// Sleep, then make retry `attempt` (0-indexed).
    Retry {
        /// Retry attempt to make.
        attempt: u32,
    },
    /// Retries are exhausted; connect again right away.
    Restart,
}

/// Decide what to do after a session fails.
///
/// `last_retry` is the retry attempt the failed session was (`None` for an
/// immediate attempt); `was_active` is whether it confirmed a subscription.
pub fn next_step(last_retry: Option<u32>, was_active: bool, max_retries: u32) -> NextStep {
    let next = if was_active {
        0
    } else {
        last_retry.map_or(0, |n| n.saturating_add(1))
    };
    if next < max_retries.max(1) {
        NextStep::Retry { attempt: next }
    } else {
        NextStep::Restart
    }
}

/// Runs sessions until shutdown.
pub struct Supervisor {
    config: Arc<SessionConfig>,
    retry: RetryConfig,
    connector: Arc<dyn FeedConnector>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    state: Arc<watch::Sender<SupervisorState>>,
}

impl Supervisor {
    /// Create a supervisor; nothing connects until [`Self::run`].
    pub fn new(
        config: SessionConfig,
        retry: RetryConfig,
        connector: Arc<dyn FeedConnector>,
        pipeline: Arc<Pipeline>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Connecting);
        Self {
            config: Arc::new(config),
            retry,
            connector,
            pipeline,
            shutdown,
            state: Arc::new(state),
        }
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    fn new_session(&self) -> Session {
        Session::new(
            self.config.clone(),
            self.connector.clone(),
            self.pipeline.clone(),
            self.shutdown.clone(),
        )
        .with_state(self.state.clone())
    }

    /// Supervise sessions until the shutdown token is cancelled.
    pub async fn run(&self) {
        let mut next_retry: Option<u32> = None;
        info!(
            endpoint = self.connector.endpoint(),
            target = %self.config.target,
            max_retries = self.retry.max_retries,
            "supervisor started"
        );

        while !self.shutdown.is_cancelled() {
            if let Some(attempt) = next_retry {
                let delay = retry::backoff_delay(attempt, &self.retry);
                let _ = self.state.send_replace(SupervisorState::BackingOff { attempt, delay });
                info!(
                    attempt = attempt + 1,
                    max_retries = self.retry.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconnecting"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.shutdown.cancelled() => break,
                }
            }

            let _ = self.state.send_replace(SupervisorState::Connecting);
            let mut session = self.new_session();
            let Err(err) = session.run().await else {
                break;
            };

            metrics::counter!("relay_session_failures_total", "kind" => err.kind()).increment(1);
            match next_retry {
                None => warn!(error = %err, kind = err.kind(), "connection error"),
                Some(attempt) => warn!(
                    attempt = attempt + 1,
                    error = %err,
                    kind = err.kind(),
                    "reconnection attempt failed"
                ),
            }

            next_retry = match next_step(next_retry, session.was_active(), self.retry.max_retries) {
                NextStep::Retry { attempt } => Some(attempt),
                NextStep::Restart => {
                    metrics::counter!("relay_retry_exhausted_total").increment(1);
                    error!(
                        max_retries = self.retry.max_retries,
                        "max retries reached, restarting connection cycle"
                    );
                    None
                }
            };
        }

        info!("supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::logging::capture_logs;
    use relay_core::{Signature, SubscriptionTarget};
    use relay_pipeline::{Delivery, PipelineError, RecordSink, RecordSource};
    use serde_json::{Value, json};
    use tokio::time::Instant;

    use super::*;
    use crate::errors::FeedError;
    use crate::transport::FeedConnection;
    use crate::transport::memory::{MemoryConnector, Peer};

    #[test]
    fn first_failure_starts_retry_phase() {
        assert_eq!(next_step(None, false, 5), NextStep::Retry { attempt: 0 });
    }

    #[test]
    fn retries_advance_until_exhausted() {
        assert_eq!(next_step(Some(0), false, 5), NextStep::Retry { attempt: 1 });
        assert_eq!(next_step(Some(3), false, 5), NextStep::Retry { attempt: 4 });
        assert_eq!(next_step(Some(4), false, 5), NextStep::Restart);
    }

    #[test]
    fn activation_resets_phase() {
        assert_eq!(next_step(Some(3), true, 5), NextStep::Retry { attempt: 0 });
        assert_eq!(next_step(None, true, 5), NextStep::Retry { attempt: 0 });
    }

    #[test]
    fn single_retry_budget() {
        assert_eq!(next_step(None, false, 1), NextStep::Retry { attempt: 0 });
        assert_eq!(next_step(Some(0), false, 1), NextStep::Restart);
    }

    #[test]
    fn zero_budget_still_retries_once() {
        assert_eq!(next_step(None, false, 0), NextStep::Retry { attempt: 0 });
    }

    // ─── Driven supervisor ──────────────────────────────────────────────

    /// Refuses every attempt, recording when it was made, and requests
    /// shutdown after `limit` attempts.
    struct RefusingConnector {
        attempts: Mutex<Vec<Instant>>,
        limit: usize,
        shutdown: CancellationToken,
    }

    #[async_trait]
    impl FeedConnector for RefusingConnector {
        async fn connect(&self) -> Result<FeedConnection, FeedError> {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            if attempts.len() >= self.limit {
                self.shutdown.cancel();
            }
            Err(FeedError::Connect("connection refused".into()))
        }

        fn endpoint(&self) -> &str {
            "ws://refused"
        }
    }

    struct NoopSource;

    #[async_trait]
    impl RecordSource for NoopSource {
        async fn fetch(&self, _signature: &Signature) -> Result<Value, PipelineError> {
            Ok(json!({}))
        }
    }

    struct NoopSink;

    #[async_trait]
    impl RecordSink for NoopSink {
        async fn deliver(&self, _body: Vec<u8>) -> Result<Delivery, PipelineError> {
            Ok(Delivery { status: 200 })
        }
    }

    fn pipeline() -> Arc<Pipeline> {
        Arc::new(Pipeline::new(Arc::new(NoopSource), Arc::new(NoopSink)))
    }

    fn session_config() -> SessionConfig {
        SessionConfig::new(
            SubscriptionTarget::new("Vote111111111111111111111111111111111111111").unwrap(),
        )
    }

    fn retry_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 100,
            max_delay_ms: 60_000,
        }
    }

    fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn assert_between(gap: Duration, low_ms: u64, high_ms: u64) {
        assert!(
            gap >= Duration::from_millis(low_ms) && gap <= Duration::from_millis(high_ms),
            "gap {gap:?} outside [{low_ms}ms, {high_ms}ms]"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_then_restarts_immediately() {
        let shutdown = CancellationToken::new();
        let connector = Arc::new(RefusingConnector {
            attempts: Mutex::new(Vec::new()),
            limit: 9,
            shutdown: shutdown.clone(),
        });
        let supervisor = Supervisor::new(
            session_config(),
            retry_config(3),
            connector.clone(),
            pipeline(),
            shutdown,
        );
        let (logs, _guard) = capture_logs();

        supervisor.run().await;

        let attempts = connector.attempts.lock().clone();
        assert_eq!(attempts.len(), 9);
        let gaps = gaps(&attempts);
        // Cycle: immediate attempt, then retries 0..3 with growing delays.
        for cycle in gaps.chunks(4) {
            assert_between(cycle[0], 100, 200);
            assert_between(cycle[1], 200, 300);
            assert_between(cycle[2], 400, 500);
            if let Some(restart) = cycle.get(3) {
                assert_eq!(*restart, Duration::ZERO);
            }
        }
        assert_eq!(logs.count_messages("max retries reached"), 2);
        assert_eq!(logs.count_messages("reconnection attempt failed"), 6);
        assert!(logs.has_message("supervisor stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_backoff_stops_promptly() {
        let shutdown = CancellationToken::new();
        let connector = Arc::new(MemoryConnector::new());
        let supervisor = Supervisor::new(
            session_config(),
            RetryConfig {
                max_retries: 5,
                base_delay_ms: 60_000,
                max_delay_ms: 600_000,
            },
            connector.clone(),
            pipeline(),
            shutdown.clone(),
        );
        let mut states = supervisor.subscribe();
        let start = Instant::now();

        let stopper = async {
            states
                .wait_for(|s| matches!(s, SupervisorState::BackingOff { attempt: 0, .. }))
                .await
                .unwrap();
            shutdown.cancel();
        };
        let ((), ()) = tokio::join!(supervisor.run(), stopper);

        assert_eq!(connector.attempts(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    /// Confirm the subscription, then hang up.
    async fn confirm_then_close(mut peer: Peer, handle: u64) {
        let request = peer.recv_json().await.unwrap();
        peer.send_json(&json!({"jsonrpc": "2.0", "result": handle, "id": request["id"]}));
        peer.hang_up();
        // Keep the write side open until the session lets go of it.
        while peer.recv().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn active_session_resets_backoff() {
        let shutdown = CancellationToken::new();
        let connector = Arc::new(MemoryConnector::new());
        connector.push_refusal("refused");
        connector.push_refusal("refused");
        let peer = connector.push_connection();
        connector.push_refusal("refused");

        let supervisor = Supervisor::new(
            session_config(),
            retry_config(5),
            connector.clone(),
            pipeline(),
            shutdown.clone(),
        );
        let mut states = supervisor.subscribe();

        let observer = async {
            let _ = tokio::spawn(confirm_then_close(peer, 5));
            let mut seen = Vec::new();
            while seen.len() < 5 {
                states.changed().await.unwrap();
                let state = states.borrow_and_update().clone();
                if !matches!(state, SupervisorState::Connecting) {
                    seen.push(state);
                }
            }
            shutdown.cancel();
            seen
        };
        let ((), seen) = tokio::join!(supervisor.run(), observer);

        let attempts: Vec<Option<u32>> = seen
            .iter()
            .map(|s| match s {
                SupervisorState::BackingOff { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        // refused → retry 0 refused → retry 1 active → closed → retry 0 again.
        assert_eq!(attempts, vec![Some(0), Some(1), None, Some(0), Some(1)]);
        assert_eq!(
            seen[2],
            SupervisorState::Active {
                handle: SubscriptionHandle(5)
            }
        );
    }
}
