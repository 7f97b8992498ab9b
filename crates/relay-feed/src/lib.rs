//! # relay-feed
//!
//! Keeps a `logsSubscribe` subscription alive and hands every notification
//! to the enrichment pipeline.
//!
//! - [`transport`]: the [`FeedConnector`] seam and its WebSocket implementation
//! - [`protocol`]: JSON-RPC request builders and frame decoding
//! - [`liveness`]: ping/pong probing of an open connection
//! - [`session`]: one connect → subscribe → consume → teardown cycle
//! - [`supervisor`]: reconnects with bounded exponential backoff, forever
//! - [`shutdown`]: process-wide cancellation

#![deny(unsafe_code)]

pub mod errors;
pub mod liveness;
pub mod protocol;
pub mod session;
pub mod shutdown;
pub mod supervisor;
pub mod transport;

pub use errors::FeedError;
pub use liveness::{LivenessConfig, LivenessOutcome};
pub use session::{Session, SessionConfig};
pub use shutdown::ShutdownCoordinator;
pub use supervisor::{Supervisor, SupervisorState};
pub use transport::{FeedConnection, FeedConnector, WsConnector};
