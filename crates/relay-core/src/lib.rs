//! # relay-core
//!
//! Foundation types shared by the tx-relay crates:
//!
//! - [`types`]: subscription target, signatures, handles, notifications
//! - [`errors`]: validation errors for the domain types
//! - [`retry`]: reconnect backoff configuration and delay math
//! - [`logging`]: `tracing` subscriber setup and test capture

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod retry;
pub mod types;

pub use errors::CoreError;
pub use retry::RetryConfig;
pub use types::{Commitment, Notification, Signature, SubscriptionHandle, SubscriptionTarget};
