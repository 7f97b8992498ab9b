//! Domain types for the subscribe-enrich-forward relay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;

/// Decoded size of a transaction signature.
const SIGNATURE_BYTES: usize = 64;
/// Shortest base58 encoding of a 64-byte signature (all leading zero bytes).
const MIN_SIGNATURE_LEN: usize = 64;
/// Longest base58 encoding of a 64-byte signature.
const MAX_SIGNATURE_LEN: usize = 88;

// ─────────────────────────────────────────────────────────────────────────────
// Subscription target
// ─────────────────────────────────────────────────────────────────────────────

/// Address the feed is filtered on (`mentions` filter).
///
/// Opaque to the relay; fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionTarget(String);

impl SubscriptionTarget {
    /// Wrap a target address, rejecting empty input.
    pub fn new(value: impl Into<String>) -> Result<Self, CoreError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(CoreError::EmptyTarget);
        }
        Ok(Self(value))
    }

    /// The raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription handle
// ─────────────────────────────────────────────────────────────────────────────

/// Server-assigned subscription id, required to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commitment
// ─────────────────────────────────────────────────────────────────────────────

/// Delivery-commitment level requested from the feed and the lookup API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Seen by the connected node, may be rolled back.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted; will not be rolled back.
    Finalized,
}

impl Commitment {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            _ => Err(CoreError::InvalidCommitment(s.to_owned())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature
// ─────────────────────────────────────────────────────────────────────────────

/// A validated transaction signature (base58 text form).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Parse a base58 signature string that decodes to exactly 64 bytes.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let invalid = |reason| CoreError::InvalidSignature {
            value: value.to_owned(),
            reason,
        };
        if value.is_empty() {
            return Err(invalid("empty"));
        }
        if !(MIN_SIGNATURE_LEN..=MAX_SIGNATURE_LEN).contains(&value.len()) {
            return Err(invalid("wrong length for a 64-byte signature"));
        }
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|_| invalid("not base58"))?;
        if bytes.len() != SIGNATURE_BYTES {
            return Err(invalid("does not decode to 64 bytes"));
        }
        Ok(Self(value.to_owned()))
    }

    /// The base58 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Signature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification
// ─────────────────────────────────────────────────────────────────────────────

/// A single feed event referencing a transaction.
///
/// The signature is kept as received; the pipeline validates it so a bad
/// reference only fails that one notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Subscription the event was delivered on.
    pub subscription: SubscriptionHandle,
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Raw signature text from the feed.
    pub signature: String,
    /// Transaction error, `None` when the transaction succeeded.
    pub err: Option<Value>,
    /// Program log lines.
    pub logs: Vec<String>,
}

impl Notification {
    /// Extract and validate the record reference.
    pub fn signature(&self) -> Result<Signature, CoreError> {
        Signature::parse(&self.signature)
    }
}
