//! Seams between the pipeline and its two external endpoints.

use async_trait::async_trait;
use relay_core::Signature;
use serde_json::Value;

use crate::errors::PipelineError;

/// Resolves a record reference to the full record.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the record for `signature`.
    ///
    /// A missing record is [`PipelineError::NotFound`], not `Ok(Value::Null)`.
    async fn fetch(&self, signature: &Signature) -> Result<Value, PipelineError>;
}

/// Outcome of a delivery that reached the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// HTTP status returned by the destination (not acted upon).
    pub status: u16,
}

/// Receives serialized records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver one JSON-encoded record.
    async fn deliver(&self, body: Vec<u8>) -> Result<Delivery, PipelineError>;
}
