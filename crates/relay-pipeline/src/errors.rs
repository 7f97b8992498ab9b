//! Per-notification pipeline errors.
//!
//! None of these leave the pipeline: [`crate::Pipeline::handle`] logs them
//! and the session keeps consuming.

use relay_core::CoreError;
use thiserror::Error;

/// Why a single notification was dropped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The notification's record reference could not be parsed.
    #[error("malformed record reference: {0}")]
    InvalidReference(#[from] CoreError),

    /// The lookup request failed at the transport or HTTP level.
    #[error("lookup request failed for {signature}: {message}")]
    Lookup {
        /// Signature being resolved.
        signature: String,
        /// Transport or status description.
        message: String,
    },

    /// The lookup API has no record for the reference.
    #[error("transaction not found: {signature}")]
    NotFound {
        /// Signature being resolved.
        signature: String,
    },

    /// The lookup API answered with a JSON-RPC error object.
    #[error("lookup RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the API.
        message: String,
    },

    /// The lookup response did not have the JSON-RPC shape.
    #[error("malformed lookup response: {0}")]
    MalformedResponse(String),

    /// The record could not be serialized for transport.
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The webhook POST failed at the transport level.
    #[error("webhook delivery failed: {0}")]
    Forward(String),
}

impl PipelineError {
    /// Pipeline step that failed, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "extract",
            Self::Lookup { .. } | Self::NotFound { .. } | Self::Rpc { .. } | Self::MalformedResponse(_) => {
                "lookup"
            }
            Self::Serialize(_) => "serialize",
            Self::Forward(_) => "forward",
        }
    }
}
