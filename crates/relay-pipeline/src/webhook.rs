//! Webhook delivery using `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::errors::PipelineError;
use crate::rpc::http_client;
use crate::traits::{Delivery, RecordSink};

/// POSTs records to a fixed URL.
///
/// The response status is recorded in the returned [`Delivery`] but never
/// turned into an error; only transport failures are.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    /// Create a sink for `url`.
    ///
    /// Fails only if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
        })
    }

    /// Destination URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RecordSink for WebhookSink {
    async fn deliver(&self, body: Vec<u8>) -> Result<Delivery, PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::Forward(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(status, url = %self.url, "webhook responded");
        Ok(Delivery { status })
    }
}
