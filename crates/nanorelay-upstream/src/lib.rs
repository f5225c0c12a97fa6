//! nanorelay-upstream: reconnecting WebSocket client for the node feed.

pub mod backoff;
pub mod client;
pub mod error;

pub use client::{UpstreamClient, UpstreamHandle, UpstreamHandler};
pub use error::{Result, UpstreamError};
