//! One connection's lifetime: connect, subscribe, consume, tear down.
//!
//! A [`Session`] is built fresh for every attempt and run exactly once. Its
//! `run` only returns `Ok` when shutdown was requested; every other exit is
//! a [`FeedError`] for the supervisor to back off on.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_core::{Commitment, Notification, SubscriptionHandle, SubscriptionTarget};
use relay_pipeline::Pipeline;
use relay_settings::{RelaySettings, SettingsError};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinSet;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::FeedError;
use crate::liveness::{LivenessConfig, LivenessMonitor};
use crate::protocol::{self, FeedMessage};
use crate::supervisor::SupervisorState;
use crate::transport::{FeedConnection, FeedConnector, FrameStream, SharedSink};

const SUBSCRIBE_REQUEST_ID: u64 = 1;
const UNSUBSCRIBE_REQUEST_ID: u64 = 2;

/// Immutable per-process session parameters.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Address the subscription is filtered on.
    pub target: SubscriptionTarget,
    /// Commitment requested with the subscription.
    pub commitment: Commitment,
    /// Probe timing for the liveness monitor.
    pub liveness: LivenessConfig,
    /// Deadline for the subscription confirmation.
    pub subscribe_timeout: Duration,
    /// Bound on the best-effort unsubscribe.
    pub unsubscribe_timeout: Duration,
    /// Grace period for in-flight deliveries on exit.
    pub drain_timeout: Duration,
}

impl SessionConfig {
    /// Defaults for everything but the target.
    pub fn new(target: SubscriptionTarget) -> Self {
        Self {
            target,
            commitment: Commitment::default(),
            liveness: LivenessConfig::default(),
            subscribe_timeout: Duration::from_secs(10),
            unsubscribe_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(10),
        }
    }

    /// Build from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Result<Self, SettingsError> {
        Ok(Self {
            target: settings.target()?,
            commitment: settings.commitment,
            liveness: LivenessConfig {
                ping_interval: settings.ping_interval(),
                pong_timeout: settings.pong_timeout(),
            },
            subscribe_timeout: Duration::from_millis(settings.feed.subscribe_timeout_ms),
            unsubscribe_timeout: Duration::from_millis(settings.feed.unsubscribe_timeout_ms),
            drain_timeout: Duration::from_millis(settings.feed.drain_timeout_ms),
        })
    }
}

/// A single subscription attempt.
pub struct Session {
    config: Arc<SessionConfig>,
    connector: Arc<dyn FeedConnector>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    state: Option<Arc<watch::Sender<SupervisorState>>>,
    handle: Option<SubscriptionHandle>,
    dispatched: u64,
}

impl Session {
    /// Create a session; nothing happens until [`Self::run`].
    pub fn new(
        config: Arc<SessionConfig>,
        connector: Arc<dyn FeedConnector>,
        pipeline: Arc<Pipeline>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            connector,
            pipeline,
            shutdown,
            state: None,
            handle: None,
            dispatched: 0,
        }
    }

    /// Publish `Active` on `state` once the subscription is confirmed.
    #[must_use]
    pub fn with_state(mut self, state: Arc<watch::Sender<SupervisorState>>) -> Self {
        self.state = Some(state);
        self
    }

    /// Handle assigned by the feed, once confirmed.
    pub fn handle(&self) -> Option<SubscriptionHandle> {
        self.handle
    }

    /// Whether the subscription was ever confirmed.
    pub fn was_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Notifications handed to the pipeline so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Run the session to completion.
    ///
    /// Teardown happens on every exit: the liveness monitor is stopped, the
    /// subscription is released if one was confirmed, and in-flight
    /// deliveries get `drain_timeout` to finish. Teardown problems never
    /// replace the error that ended the session.
    pub async fn run(&mut self) -> Result<(), FeedError> {
        let connection = tokio::select! {
            result = self.connector.connect() => result?,
            () = self.shutdown.cancelled() => return Ok(()),
        };
        let FeedConnection { sink, mut stream } = connection;
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let pongs = Arc::new(Notify::new());
        debug!(endpoint = self.connector.endpoint(), "feed connection open");

        let mut monitor = LivenessMonitor::spawn(sink.clone(), pongs.clone(), self.config.liveness);
        let mut deliveries = JoinSet::new();

        let result = self
            .drive(&sink, &mut stream, &pongs, &mut monitor, &mut deliveries)
            .await;

        monitor.stop().await;
        if let Some(handle) = self.handle {
            self.unsubscribe(&sink, handle).await;
        }
        self.drain(&mut deliveries).await;
        let _ = time::timeout(self.config.unsubscribe_timeout, async {
            sink.lock().await.send(Message::Close(None)).await
        })
        .await;

        info!(
            dispatched = self.dispatched,
            handle = ?self.handle,
            "feed session ended"
        );
        result
    }

    async fn drive(
        &mut self,
        sink: &SharedSink,
        stream: &mut FrameStream,
        pongs: &Notify,
        monitor: &mut LivenessMonitor,
        deliveries: &mut JoinSet<bool>,
    ) -> Result<(), FeedError> {
        let request =
            protocol::subscribe_request(SUBSCRIBE_REQUEST_ID, &self.config.target, self.config.commitment);
        sink.lock().await.send(Message::text(request)).await?;

        let Some(handle) = self.await_confirmation(stream, pongs, monitor).await? else {
            return Ok(());
        };
        self.handle = Some(handle);
        if let Some(state) = &self.state {
            let _ = state.send_replace(SupervisorState::Active { handle });
        }
        info!(
            %handle,
            target = %self.config.target,
            commitment = %self.config.commitment,
            "subscription active"
        );

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                err = monitor.failed() => return Err(err),
                frame = stream.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedError::Closed { reason: None }),
                    };
                    self.on_frame(message, pongs, deliveries)?;
                }
                Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "delivery task failed");
                    }
                }
            }
        }
    }

    /// Wait for the reply to the subscribe request. `None` means shutdown.
    async fn await_confirmation(
        &mut self,
        stream: &mut FrameStream,
        pongs: &Notify,
        monitor: &mut LivenessMonitor,
    ) -> Result<Option<SubscriptionHandle>, FeedError> {
        let timeout = self.config.subscribe_timeout;
        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            let frame = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(None),
                err = monitor.failed() => return Err(err),
                () = &mut deadline => {
                    return Err(FeedError::SubscribeTimeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                frame = stream.next() => frame,
            };

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Pong(_))) => {
                    pongs.notify_waiters();
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(FeedError::Closed {
                        reason: frame.map(|f| f.reason.as_str().to_owned()),
                    });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(FeedError::Closed { reason: None }),
            };

            match protocol::decode(text.as_str()).map_err(|e| FeedError::Protocol(e.to_string()))? {
                FeedMessage::Response { id, result } if id == SUBSCRIBE_REQUEST_ID => {
                    let handle = result.as_u64().ok_or_else(|| {
                        FeedError::Protocol(format!("subscription id is not an integer: {result}"))
                    })?;
                    return Ok(Some(SubscriptionHandle(handle)));
                }
                FeedMessage::ErrorResponse { id, code, message }
                    if id.is_none_or(|id| id == SUBSCRIBE_REQUEST_ID) =>
                {
                    return Err(FeedError::SubscribeRejected { code, message });
                }
                other => debug!(message = ?other, "ignoring message before confirmation"),
            }
        }
    }

    fn on_frame(
        &mut self,
        message: Message,
        pongs: &Notify,
        deliveries: &mut JoinSet<bool>,
    ) -> Result<(), FeedError> {
        match message {
            Message::Text(text) => match protocol::decode(text.as_str()) {
                Ok(FeedMessage::Notification(notification)) => self.dispatch(notification, deliveries),
                Ok(other) => debug!(message = ?other, "ignoring feed message"),
                Err(e) => warn!(error = %e, "skipping undecodable feed message"),
            },
            Message::Pong(_) => pongs.notify_waiters(),
            Message::Close(frame) => {
                return Err(FeedError::Closed {
                    reason: frame.map(|f| f.reason.as_str().to_owned()),
                });
            }
            // Pings are answered by the transport.
            Message::Ping(_) | Message::Binary(_) | Message::Frame(_) => {}
        }
        Ok(())
    }

    fn dispatch(&mut self, notification: Notification, deliveries: &mut JoinSet<bool>) {
        if self.handle.is_some_and(|h| h != notification.subscription) {
            debug!(
                subscription = %notification.subscription,
                "notification for a different subscription"
            );
        }
        self.dispatched += 1;
        let pipeline = self.pipeline.clone();
        let _ = deliveries.spawn(async move { pipeline.handle(notification).await });
    }

    async fn unsubscribe(&self, sink: &SharedSink, handle: SubscriptionHandle) {
        let request = protocol::unsubscribe_request(UNSUBSCRIBE_REQUEST_ID, handle);
        let sent = time::timeout(self.config.unsubscribe_timeout, async {
            sink.lock().await.send(Message::text(request)).await
        })
        .await;
        match sent {
            Ok(Ok(())) => debug!(%handle, "unsubscribed"),
            Ok(Err(e)) => debug!(%handle, error = %e, "unsubscribe failed"),
            Err(_) => debug!(%handle, "unsubscribe timed out"),
        }
    }

    async fn drain(&self, deliveries: &mut JoinSet<bool>) {
        if deliveries.is_empty() {
            return;
        }
        let drained = time::timeout(self.config.drain_timeout, async {
            while deliveries.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(abandoned = deliveries.len(), "in-flight deliveries aborted");
            deliveries.abort_all();
        }
    }
}
