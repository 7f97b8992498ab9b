//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::fmt;
use std::path::{Path, PathBuf};

use relay_core::Commitment;
use relay_core::logging::LogFormat;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Resolve the default settings file path (`~/.tx-relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tx-relay").join("settings.json")
}

/// An environment override that was rejected and left the previous value in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredOverride {
    /// Variable name.
    pub key: &'static str,
    /// Raw value as found in the environment.
    pub value: String,
    /// What was wrong with it.
    pub reason: String,
}

impl IgnoredOverride {
    /// Emit the warning for this override.
    pub fn log(&self) {
        tracing::warn!(
            key = self.key,
            value = %self.value,
            reason = %self.reason,
            "invalid env var, ignoring"
        );
    }
}

impl fmt::Display for IgnoredOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}='{}' ignored: {}", self.key, self.value, self.reason)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<(RelaySettings, Vec<IgnoredOverride>)> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error. The result is
/// not validated, see [`RelaySettings::validate`]. Rejected overrides are
/// returned instead of logged, since loading usually runs before the log
/// subscriber exists.
pub fn load_settings_from_path(path: &Path) -> Result<(RelaySettings, Vec<IgnoredOverride>)> {
    let mut settings = load_file_layer(path)?;
    let ignored = apply_env_overrides(&mut settings);
    Ok((settings, ignored))
}

/// Defaults with the settings file (if any) merged on top.
pub fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
#[must_use = "ignored overrides should be reported"]
pub fn apply_env_overrides(settings: &mut RelaySettings) -> Vec<IgnoredOverride> {
    apply_overrides_from(settings, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable source.
///
/// Endpoint variables keep the names the deployment already uses
/// (`PUBKEY`, `SOLANA_RPC_WS_URL`, `SOLANA_RPC_HTTP_URL`, `WEBHOOK_URL`).
/// Invalid tuning values are skipped (file/default wins) and returned.
#[must_use = "ignored overrides should be reported"]
pub fn apply_overrides_from<F>(settings: &mut RelaySettings, var: F) -> Vec<IgnoredOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let ignored = std::cell::RefCell::new(Vec::new());
    let reject = |key: &'static str, value: &str, reason: String| {
        ignored.borrow_mut().push(IgnoredOverride {
            key,
            value: value.to_owned(),
            reason,
        });
    };
    let string = |name: &str| var(name).filter(|v| !v.trim().is_empty());
    let number = |name: &'static str, min: u64, max: u64| {
        let raw = var(name)?;
        let parsed = parse_u64_range(&raw, min, max);
        if parsed.is_none() {
            reject(name, &raw, format!("expected an integer in {min}..={max}"));
        }
        parsed
    };

    // ── Endpoints ───────────────────────────────────────────────────
    if let Some(v) = string("PUBKEY") {
        settings.feed.target = v;
    }
    if let Some(v) = string("SOLANA_RPC_WS_URL") {
        settings.feed.ws_url = v;
    }
    if let Some(v) = string("SOLANA_RPC_HTTP_URL") {
        settings.lookup.rpc_url = v;
    }
    if let Some(v) = string("WEBHOOK_URL") {
        settings.webhook.url = v;
    }

    // ── Tuning ──────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_COMMITMENT") {
        match v.parse::<Commitment>() {
            Ok(c) => settings.commitment = c,
            Err(e) => reject("RELAY_COMMITMENT", &v, e.to_string()),
        }
    }
    if let Some(v) = number("RELAY_MAX_RETRIES", 1, 100) {
        #[allow(clippy::cast_possible_truncation)]
        let retries = v as u32;
        settings.retry.max_retries = retries;
    }
    if let Some(v) = number("RELAY_BASE_DELAY_MS", 1, 600_000) {
        settings.retry.base_delay_ms = v;
    }
    if let Some(v) = number("RELAY_MAX_DELAY_MS", 1, u64::MAX) {
        settings.retry.max_delay_ms = v;
    }
    if let Some(v) = number("RELAY_PING_INTERVAL_MS", 100, 3_600_000) {
        settings.liveness.ping_interval_ms = v;
    }
    if let Some(v) = number("RELAY_PONG_TIMEOUT_MS", 100, 600_000) {
        settings.liveness.pong_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("RELAY_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(f) => settings.logging.format = f,
            None => reject("RELAY_LOG_FORMAT", &v, "expected compact or json".to_owned()),
        }
    }

    ignored.into_inner()
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (`compact` or `json`, case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.trim().to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // -- deep_merge --

    #[test]
    fn deep_merge_nested_objects() {
        let merged = deep_merge(
            json!({"feed": {"wsUrl": "", "subscribeTimeoutMs": 10000}}),
            json!({"feed": {"wsUrl": "ws://localhost:8900"}}),
        );
        assert_eq!(merged["feed"]["wsUrl"], "ws://localhost:8900");
        assert_eq!(merged["feed"]["subscribeTimeoutMs"], 10000);
    }

    #[test]
    fn deep_merge_skips_null() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null, "b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    // -- file layer --

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_file_layer(&dir.path().join("absent.json")).unwrap();
        assert_eq!(s.liveness.ping_interval_ms, 30_000);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"commitment": "finalized", "retry": {"maxRetries": 3}, "webhook": {"url": "http://sink"}}"#,
        )
        .unwrap();

        let s = load_file_layer(&path).unwrap();
        assert_eq!(s.commitment, Commitment::Finalized);
        assert_eq!(s.retry.max_retries, 3);
        assert_eq!(s.retry.base_delay_ms, 1000);
        assert_eq!(s.webhook.url, "http://sink");
        assert_eq!(s.webhook.timeout_ms, 30_000);
    }

    #[test]
    fn invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_file_layer(&path).is_err());
    }

    // -- env overrides --

    #[test]
    fn endpoint_env_vars_override() {
        let mut s = RelaySettings::default();
        let ignored = apply_overrides_from(
            &mut s,
            env(&[
                ("PUBKEY", "Vote111111111111111111111111111111111111111"),
                ("SOLANA_RPC_WS_URL", "wss://rpc.example/ws"),
                ("SOLANA_RPC_HTTP_URL", "https://rpc.example"),
                ("WEBHOOK_URL", "https://hooks.example/tx"),
            ]),
        );
        assert_eq!(s.feed.target, "Vote111111111111111111111111111111111111111");
        assert_eq!(s.feed.ws_url, "wss://rpc.example/ws");
        assert_eq!(s.lookup.rpc_url, "https://rpc.example");
        assert_eq!(s.webhook.url, "https://hooks.example/tx");
        assert!(ignored.is_empty());
        s.validate().unwrap();
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut s = RelaySettings::default();
        s.webhook.url = "http://from-file".into();
        let ignored = apply_overrides_from(&mut s, env(&[("WEBHOOK_URL", "  ")]));
        assert!(ignored.is_empty());
        assert_eq!(s.webhook.url, "http://from-file");
    }

    #[test]
    fn tuning_env_vars_override() {
        let mut s = RelaySettings::default();
        let _ = apply_overrides_from(
            &mut s,
            env(&[
                ("RELAY_COMMITMENT", "processed"),
                ("RELAY_MAX_RETRIES", "8"),
                ("RELAY_BASE_DELAY_MS", "250"),
                ("RELAY_MAX_DELAY_MS", "90000"),
                ("RELAY_PING_INTERVAL_MS", "15000"),
                ("RELAY_PONG_TIMEOUT_MS", "5000"),
                ("RELAY_LOG_LEVEL", "debug"),
                ("RELAY_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(s.commitment, Commitment::Processed);
        assert_eq!(s.retry.max_retries, 8);
        assert_eq!(s.retry.base_delay_ms, 250);
        assert_eq!(s.retry.max_delay_ms, 90_000);
        assert_eq!(s.liveness.ping_interval_ms, 15_000);
        assert_eq!(s.liveness.pong_timeout_ms, 5_000);
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_tuning_values_keep_previous() {
        let mut s = RelaySettings::default();
        let ignored = apply_overrides_from(
            &mut s,
            env(&[
                ("RELAY_MAX_RETRIES", "0"),
                ("RELAY_BASE_DELAY_MS", "soon"),
                ("RELAY_COMMITMENT", "eventually"),
                ("RELAY_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(s.retry.max_retries, 5);
        assert_eq!(s.retry.base_delay_ms, 1000);
        assert_eq!(s.commitment, Commitment::Confirmed);
        assert_eq!(s.logging.format, LogFormat::Compact);

        let keys: Vec<&str> = ignored.iter().map(|i| i.key).collect();
        assert_eq!(
            keys,
            vec!["RELAY_COMMITMENT", "RELAY_MAX_RETRIES", "RELAY_BASE_DELAY_MS", "RELAY_LOG_FORMAT"]
        );
        assert_eq!(ignored[1].value, "0");
        assert_eq!(
            ignored[1].to_string(),
            "RELAY_MAX_RETRIES='0' ignored: expected an integer in 1..=100"
        );
    }

    #[test]
    fn ignored_override_logs_a_warning() {
        let (logs, _guard) = relay_core::logging::capture_logs();
        let mut s = RelaySettings::default();
        let ignored = apply_overrides_from(&mut s, env(&[("RELAY_PONG_TIMEOUT_MS", "5")]));
        // Nothing is logged while applying.
        assert!(logs.events().is_empty());

        for entry in &ignored {
            entry.log();
        }
        let events = logs.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, tracing::Level::WARN);
        assert_eq!(events[0].field("key"), Some("RELAY_PONG_TIMEOUT_MS"));
    }

    // -- parsing --

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range(" 10 ", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
    }

    #[test]
    fn parse_log_format_names() {
        assert_eq!(parse_log_format("text"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("Json"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("yaml"), None);
    }
}
