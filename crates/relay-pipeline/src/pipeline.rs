//! Enrich-and-forward for a single notification.

use std::sync::Arc;

use relay_core::Notification;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::traits::{Delivery, RecordSink, RecordSource};

/// Resolves each notification's transaction and forwards it.
///
/// Cheap to share: the session spawns one `handle` call per notification
/// against an `Arc<Pipeline>`.
pub struct Pipeline {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
}

impl Pipeline {
    /// Create a pipeline from a lookup source and a delivery sink.
    pub fn new(source: Arc<dyn RecordSource>, sink: Arc<dyn RecordSink>) -> Self {
        Self { source, sink }
    }

    /// Run extract → lookup → serialize → forward for one notification.
    ///
    /// No retries: a failed step drops the notification.
    pub async fn process(&self, notification: &Notification) -> Result<Delivery, PipelineError> {
        let signature = notification.signature()?;
        let record = self.source.fetch(&signature).await?;
        let body = serde_json::to_vec(&record)?;
        self.sink.deliver(body).await
    }

    /// [`Self::process`] with every failure logged and contained.
    ///
    /// Returns whether the record reached the destination.
    pub async fn handle(&self, notification: Notification) -> bool {
        metrics::counter!("relay_notifications_total").increment(1);
        match self.process(&notification).await {
            Ok(delivery) => {
                metrics::counter!("relay_forwarded_total").increment(1);
                debug!(
                    signature = %notification.signature,
                    slot = notification.slot,
                    status = delivery.status,
                    "record forwarded"
                );
                true
            }
            Err(e) => {
                metrics::counter!("relay_notification_failures_total", "stage" => e.stage())
                    .increment(1);
                warn!(
                    signature = %notification.signature,
                    slot = notification.slot,
                    stage = e.stage(),
                    error = %e,
                    "error processing transaction"
                );
                false
            }
        }
    }
}
