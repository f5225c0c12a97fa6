//! Bridges the two node connections into the hub.

use std::sync::Arc;

use nanorelay_hub::RelayHub;
use nanorelay_protocol::UpstreamRequest;
use nanorelay_upstream::UpstreamHandler;
use tracing::{debug, info};

/// Account-filtered feed: subscribes with the tracked accounts and fans
/// events out by account.
pub struct FilteredFeed {
    pub hub: Arc<RelayHub>,
}

impl UpstreamHandler for FilteredFeed {
    fn on_open(&self) -> Vec<UpstreamRequest> {
        let requests = self.hub.filtered_open_requests();
        info!(
            accounts = requests.len().saturating_sub(1),
            "connected with node (filtered), subscribing"
        );
        requests
    }

    fn on_message(&self, text: &str) {
        let delivered = self.hub.on_filtered_event(text);
        debug!(delivered, "filtered event relayed");
    }
}

/// Unfiltered feed for listen-all clients.
pub struct ListenAllFeed {
    pub hub: Arc<RelayHub>,
}

impl UpstreamHandler for ListenAllFeed {
    fn on_open(&self) -> Vec<UpstreamRequest> {
        info!("connected with node (all confirmations), subscribing");
        self.hub.listen_all_open_requests()
    }

    fn on_message(&self, text: &str) {
        let delivered = self.hub.on_listen_all_event(text);
        debug!(delivered, "listen-all event relayed");
    }
}
