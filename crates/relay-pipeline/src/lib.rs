//! # relay-pipeline
//!
//! Turns one feed notification into one webhook delivery:
//!
//! 1. extract the transaction signature
//! 2. resolve the full transaction via `getTransaction`
//! 3. serialize it to JSON
//! 4. POST it to the webhook
//!
//! Every step can fail for that notification alone; [`Pipeline::handle`]
//! logs the failure and returns, it never propagates.

#![deny(unsafe_code)]

pub mod errors;
pub mod pipeline;
pub mod rpc;
pub mod traits;
pub mod webhook;

pub use errors::PipelineError;
pub use pipeline::Pipeline;
pub use rpc::{LookupOptions, RpcRecordSource};
pub use traits::{Delivery, RecordSink, RecordSource};
pub use webhook::WebhookSink;
