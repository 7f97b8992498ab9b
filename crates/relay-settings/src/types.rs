//! Settings types with compiled defaults.

use std::time::Duration;

use relay_core::logging::LogFormat;
use relay_core::{Commitment, RetryConfig, SubscriptionTarget};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the relay.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Commitment level for both the subscription and the lookup.
    pub commitment: Commitment,
    /// Feed (WebSocket) connection settings.
    pub feed: FeedSettings,
    /// Ping/pong liveness probing.
    pub liveness: LivenessSettings,
    /// Reconnect backoff.
    pub retry: RetryConfig,
    /// Transaction lookup API.
    pub lookup: LookupSettings,
    /// Webhook destination.
    pub webhook: WebhookSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Feed endpoint and session timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedSettings {
    /// WebSocket URL of the feed (`ws://` or `wss://`).
    pub ws_url: String,
    /// Address the subscription is filtered on.
    pub target: String,
    /// Bound on the WebSocket opening handshake.
    pub connect_timeout_ms: u64,
    /// How long to wait for the subscription confirmation.
    pub subscribe_timeout_ms: u64,
    /// Bound on the best-effort unsubscribe during teardown.
    pub unsubscribe_timeout_ms: u64,
    /// Grace period for in-flight deliveries when a session ends.
    pub drain_timeout_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            target: String::new(),
            connect_timeout_ms: 10_000,
            subscribe_timeout_ms: 10_000,
            unsubscribe_timeout_ms: 2_000,
            drain_timeout_ms: 10_000,
        }
    }
}

/// Liveness probe timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessSettings {
    /// Idle time between probes.
    pub ping_interval_ms: u64,
    /// How long a pong may take before the connection is declared dead.
    pub pong_timeout_ms: u64,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
        }
    }
}

/// `getTransaction` lookup settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupSettings {
    /// HTTP JSON-RPC URL.
    pub rpc_url: String,
    /// Transaction encoding requested from the API.
    pub encoding: String,
    /// Highest transaction version the relay accepts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_supported_transaction_version: Option<u8>,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            encoding: "json".to_string(),
            max_supported_transaction_version: Some(0),
            timeout_ms: 30_000,
        }
    }
}

/// Webhook destination.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookSettings {
    /// Destination URL for POSTed records.
    pub url: String,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl RelaySettings {
    /// Check required values and ranges.
    ///
    /// Absence of any endpoint or of the target is startup-fatal.
    pub fn validate(&self) -> Result<()> {
        if self.feed.target.trim().is_empty() {
            return Err(SettingsError::Missing {
                key: "feed.target",
                env: "PUBKEY",
            });
        }
        require_url(&self.feed.ws_url, "feed.wsUrl", "SOLANA_RPC_WS_URL", &["ws://", "wss://"])?;
        require_url(
            &self.lookup.rpc_url,
            "lookup.rpcUrl",
            "SOLANA_RPC_HTTP_URL",
            &["http://", "https://"],
        )?;
        require_url(&self.webhook.url, "webhook.url", "WEBHOOK_URL", &["http://", "https://"])?;

        if self.retry.max_retries == 0 {
            return Err(SettingsError::InvalidValue(
                "retry.maxRetries must be at least 1".into(),
            ));
        }
        if self.retry.base_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "retry.baseDelayMs must be positive".into(),
            ));
        }
        let worst_case = self.retry.worst_case_delay_ms();
        if self.retry.max_delay_ms < worst_case {
            return Err(SettingsError::InvalidValue(format!(
                "retry.maxDelayMs ({}) is below the last retry's delay ({worst_case} ms)",
                self.retry.max_delay_ms
            )));
        }
        if self.liveness.ping_interval_ms == 0 || self.liveness.pong_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "liveness intervals must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The validated subscription target.
    pub fn target(&self) -> Result<SubscriptionTarget> {
        SubscriptionTarget::new(self.feed.target.clone())
            .map_err(|e| SettingsError::InvalidValue(e.to_string()))
    }

    /// Interval between liveness probes.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.liveness.ping_interval_ms)
    }

    /// Pong deadline after each probe.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness.pong_timeout_ms)
    }
}

fn require_url(
    value: &str,
    key: &'static str,
    env: &'static str,
    schemes: &[&str],
) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SettingsError::Missing { key, env });
    }
    if !schemes.iter().any(|s| value.starts_with(s)) {
        return Err(SettingsError::InvalidValue(format!(
            "{key} must start with one of {schemes:?}, got '{value}'"
        )));
    }
    Ok(())
}
