//! Translates membership transitions into node subscription updates.

use nanorelay_core::AccountId;
use nanorelay_protocol::UpstreamRequest;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Outbound half of an upstream connection.
///
/// Implementations must not block: requests issued while the node is
/// unreachable are queued by the transport and flushed after reconnect.
pub trait UpstreamSink: Send + Sync {
    fn send(&self, request: UpstreamRequest);
}

impl UpstreamSink for mpsc::UnboundedSender<UpstreamRequest> {
    fn send(&self, request: UpstreamRequest) {
        if mpsc::UnboundedSender::send(self, request).is_err() {
            debug!("upstream task gone, subscription update dropped");
        }
    }
}

/// Keeps the node's account filter equal to the set of accounts that have
/// at least one listener.
///
/// Callers invoke it while still holding the membership lock so updates
/// leave in the same order the transitions happened.
pub struct SubscriptionDriver {
    topic: String,
    sink: Box<dyn UpstreamSink>,
}

impl SubscriptionDriver {
    pub fn new(topic: impl Into<String>, sink: impl UpstreamSink + 'static) -> Self {
        Self {
            topic: topic.into(),
            sink: Box::new(sink),
        }
    }

    pub fn first_listener(&self, account: &AccountId) {
        info!(account = %account, "first listener, adding account upstream");
        self.sink
            .send(UpstreamRequest::add_account(&self.topic, account.clone()));
    }

    pub fn last_listener(&self, account: &AccountId) {
        info!(account = %account, "last listener gone, removing account upstream");
        self.sink
            .send(UpstreamRequest::remove_account(&self.topic, account.clone()));
    }

    /// Requests to send right after the upstream connection opens.
    ///
    /// The empty subscribe establishes the channel; each tracked account is
    /// then re-added individually so a reconnect restores the filter.
    pub fn on_open(&self, tracked: Vec<AccountId>) -> Vec<UpstreamRequest> {
        let mut requests = Vec::with_capacity(tracked.len() + 1);
        requests.push(UpstreamRequest::subscribe_empty(&self.topic));
        requests.extend(
            tracked
                .into_iter()
                .map(|account| UpstreamRequest::add_account(&self.topic, account)),
        );
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_emit_single_account_updates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let driver = SubscriptionDriver::new("confirmation", tx);

        driver.first_listener(&AccountId::from("a"));
        driver.last_listener(&AccountId::from("a"));

        assert_eq!(
            rx.try_recv().unwrap(),
            UpstreamRequest::add_account("confirmation", AccountId::from("a"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            UpstreamRequest::remove_account("confirmation", AccountId::from("a"))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn open_with_nothing_tracked_only_subscribes() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let driver = SubscriptionDriver::new("confirmation", tx);
        assert_eq!(
            driver.on_open(Vec::new()),
            vec![UpstreamRequest::subscribe_empty("confirmation")]
        );
    }

    #[test]
    fn open_re_adds_tracked_accounts_after_subscribe() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let driver = SubscriptionDriver::new("confirmation", tx);
        let requests = driver.on_open(vec![AccountId::from("a"), AccountId::from("b")]);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], UpstreamRequest::subscribe_empty("confirmation"));
        assert_eq!(
            requests[2],
            UpstreamRequest::add_account("confirmation", AccountId::from("b"))
        );
    }

    #[test]
    fn closed_sink_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let driver = SubscriptionDriver::new("confirmation", tx);
        driver.first_listener(&AccountId::from("a"));
    }
}
