//! `getTransaction` lookup over HTTP JSON-RPC using `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{Commitment, Signature};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::errors::PipelineError;
use crate::traits::RecordSource;

/// Options sent with every lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupOptions {
    /// Transaction encoding (`json`, `jsonParsed`, `base64`, ...).
    pub encoding: String,
    /// Commitment level.
    pub commitment: Commitment,
    /// Highest transaction version accepted; `None` means legacy only.
    pub max_supported_transaction_version: Option<u8>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            encoding: "json".to_string(),
            commitment: Commitment::Confirmed,
            max_supported_transaction_version: Some(0),
        }
    }
}

impl LookupOptions {
    fn config_object(&self) -> Value {
        let mut config = json!({
            "encoding": self.encoding,
            "commitment": self.commitment.as_str(),
        });
        if let Some(version) = self.max_supported_transaction_version {
            config["maxSupportedTransactionVersion"] = json!(version);
        }
        config
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

const USER_AGENT: &str = concat!("tx-relay/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the lookup source and the webhook sink.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Transaction lookup backed by a JSON-RPC endpoint.
pub struct RpcRecordSource {
    client: reqwest::Client,
    url: String,
    options: LookupOptions,
    next_id: AtomicU64,
}

impl RpcRecordSource {
    /// Create a lookup client for `url`.
    ///
    /// Fails only if the HTTP client cannot be built (TLS backend setup).
    pub fn new(
        url: impl Into<String>,
        options: LookupOptions,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            options,
            next_id: AtomicU64::new(1),
        })
    }

    /// The JSON-RPC request body for `signature`.
    pub fn request_body(&self, id: u64, signature: &Signature) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "getTransaction",
            "params": [signature.as_str(), self.options.config_object()],
        })
    }
}

#[async_trait]
impl RecordSource for RpcRecordSource {
    async fn fetch(&self, signature: &Signature) -> Result<Value, PipelineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let lookup_err = |message: String| PipelineError::Lookup {
            signature: signature.to_string(),
            message,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&self.request_body(id, signature))
            .send()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(lookup_err(format!("HTTP {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| lookup_err(format!("failed to read response body: {e}")))?;
        let parsed: RpcResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::MalformedResponse(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(PipelineError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        match parsed.result {
            Some(Value::Null) | None => Err(PipelineError::NotFound {
                signature: signature.to_string(),
            }),
            Some(record) => {
                debug!(%signature, "transaction resolved");
                Ok(record)
            }
        }
    }
}
