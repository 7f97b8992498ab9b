//! Reconnect backoff configuration and delay calculation.
//!
//! The supervisor owns the async loop; this module holds the pure pieces:
//!
//! - [`RetryConfig`]: retry budget and base delay
//! - [`calculate_backoff_delay_with_random`]: deterministic delay for a given jitter sample
//! - [`backoff_delay`]: the same with a fresh random sample

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of retries after the first failed session.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default cap on a single delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Configuration for the reconnect retry phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retry attempts before the supervisor restarts its outer loop (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in ms (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl RetryConfig {
    /// Longest uncapped delay the retry budget can produce:
    /// `base_delay * (2^(max_retries - 1) + 1)`, saturating.
    ///
    /// A `max_delay_ms` below this clips the tail of the backoff curve.
    #[must_use]
    pub fn worst_case_delay_ms(&self) -> u64 {
        let last = self.max_retries.max(1) - 1;
        let exponential = 1u64.checked_shl(last).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(exponential.saturating_add(1))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Backoff delay for a given jitter sample.
///
/// Formula: `min(max_delay, base_delay * (2^attempt + random))`
///
/// # Arguments
///
/// * `attempt`: zero-based retry index
/// * `base_delay_ms`: base delay in milliseconds
/// * `max_delay_ms`: cap on the result
/// * `random`: jitter sample in `[0.0, 1.0)`
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    random: f64,
) -> u64 {
    let exponential = (1u64 << attempt.min(31)) as f64;
    let jitter = random.clamp(0.0, 1.0);
    let delay = (base_delay_ms as f64) * (exponential + jitter);

    (delay.round().max(0.0) as u64).min(max_delay_ms)
}

/// Backoff delay for `attempt` with a fresh uniform jitter sample.
#[must_use]
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let random: f64 = rand::random();
    Duration::from_millis(calculate_backoff_delay_with_random(
        attempt,
        config.base_delay_ms,
        config.max_delay_ms,
        random,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
