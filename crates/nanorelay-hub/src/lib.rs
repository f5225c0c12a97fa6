//! nanorelay-hub: the subscription multiplexing core.
//!
//! - [`membership::MembershipIndex`]: client ⇄ account index
//! - [`driver::SubscriptionDriver`]: first/last-listener transitions → node updates
//! - [`fanout`]: recipient selection for filtered delivery
//! - [`listen_all::ListenAllSet`]: unfiltered side channel
//! - [`hub::RelayHub`]: owns all of the above plus the client queues

pub mod driver;
pub mod fanout;
pub mod hub;
pub mod listen_all;
pub mod membership;
pub mod registry;

pub use driver::{SubscriptionDriver, UpstreamSink};
pub use hub::{HubStats, RelayHub};
pub use membership::MembershipIndex;
