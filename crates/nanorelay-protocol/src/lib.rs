//! nanorelay-protocol: JSON shapes exchanged with downstream clients and
//! with the upstream node.

pub mod actions;
pub mod frames;

pub use frames::{ClientAction, SubscriptionOptions, UpstreamEvent, UpstreamRequest};
