//! `RelayHub`: process-wide relay state.
//!
//! Owns the membership index, the listen-all set and the registry of client
//! queues. Downstream actions and upstream events only reach that state
//! through the methods here; a fresh hub per test gives full isolation.

use nanorelay_core::{config::RelaySettings, AccountId, ClientId};
use nanorelay_protocol::{ClientAction, UpstreamEvent, UpstreamRequest};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::driver::{SubscriptionDriver, UpstreamSink};
use crate::fanout;
use crate::listen_all::ListenAllSet;
use crate::membership::MembershipIndex;
use crate::registry::ClientRegistry;

/// Point-in-time counters for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub clients: usize,
    pub tracked_accounts: usize,
    pub registered_clients: usize,
    pub listen_all_clients: usize,
    pub listen_all_enabled: bool,
}

pub struct RelayHub {
    topic: String,
    allow_listen_all: bool,
    /// Index and driver live under one lock: a transition and its upstream
    /// update are a single step, and updates leave in transition order.
    index: Mutex<MembershipIndex>,
    driver: SubscriptionDriver,
    listen_all: ListenAllSet,
    clients: ClientRegistry,
}

impl RelayHub {
    pub fn new(settings: &RelaySettings, upstream: impl UpstreamSink + 'static) -> Self {
        Self {
            topic: settings.topic.clone(),
            allow_listen_all: settings.allow_listen_all,
            index: Mutex::new(MembershipIndex::new()),
            driver: SubscriptionDriver::new(settings.topic.clone(), upstream),
            listen_all: ListenAllSet::new(),
            clients: ClientRegistry::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn listen_all_enabled(&self) -> bool {
        self.allow_listen_all
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Track a new downstream connection whose outbound queue is `tx`.
    pub fn connect(&self, tx: mpsc::Sender<String>) -> ClientId {
        let client = ClientId::new();
        self.clients.attach(client, tx);
        client
    }

    /// Forget `client` everywhere.
    ///
    /// The outbound queue is detached first so no delivery is attempted
    /// after this starts. Returns the accounts that lost their last listener;
    /// each has already been removed upstream.
    pub fn disconnect(&self, client: ClientId) -> Vec<AccountId> {
        self.clients.detach(client);
        self.listen_all.remove(client);

        let mut index = self.index.lock();
        let orphaned = index.disconnect(client);
        for account in &orphaned {
            self.driver.last_listener(account);
        }
        orphaned
    }

    // -----------------------------------------------------------------------
    // Client actions
    // -----------------------------------------------------------------------

    pub fn apply(&self, client: ClientId, action: ClientAction) {
        match action {
            ClientAction::RegisterAccount { account } => {
                self.register_account(client, account);
            }
            ClientAction::UnregisterAccount { account } => {
                self.unregister_account(client, &account);
            }
            ClientAction::ListenAll => {
                self.listen_all(client);
            }
            ClientAction::UnlistenAll => {
                self.unlisten_all(client);
            }
        }
    }

    /// Returns `true` if this was the account's first listener.
    pub fn register_account(&self, client: ClientId, account: AccountId) -> bool {
        debug!(client_id = %client, account = %account, "register_account");
        let mut index = self.index.lock();
        let first = index.register_account(client, account.clone());
        if first {
            self.driver.first_listener(&account);
        }
        first
    }

    /// Returns `true` if this removed the account's last listener.
    pub fn unregister_account(&self, client: ClientId, account: &AccountId) -> bool {
        debug!(client_id = %client, account = %account, "unregister_account");
        let mut index = self.index.lock();
        let last = index.unregister_account(client, account);
        if last {
            self.driver.last_listener(account);
        }
        last
    }

    /// Returns `false` when the side channel is disabled.
    pub fn listen_all(&self, client: ClientId) -> bool {
        if !self.allow_listen_all {
            debug!(client_id = %client, "listen_all ignored, side channel disabled");
            return false;
        }
        if self.listen_all.add(client) {
            info!(client_id = %client, "client listening to all confirmations");
        }
        true
    }

    pub fn unlisten_all(&self, client: ClientId) -> bool {
        self.listen_all.remove(client)
    }

    // -----------------------------------------------------------------------
    // Upstream events
    // -----------------------------------------------------------------------

    /// Requests for the filtered upstream channel right after it opens.
    pub fn filtered_open_requests(&self) -> Vec<UpstreamRequest> {
        let index = self.index.lock();
        self.driver.on_open(index.tracked_accounts())
    }

    /// Requests for the listen-all upstream channel right after it opens.
    pub fn listen_all_open_requests(&self) -> Vec<UpstreamRequest> {
        vec![UpstreamRequest::subscribe_all(&self.topic)]
    }

    /// Deliver one event from the filtered channel to every client
    /// registered on its primary or linked account.
    ///
    /// Returns the number of deliveries queued.
    pub fn on_filtered_event(&self, text: &str) -> usize {
        let Some(mut event) = self.parse_event(text) else {
            return 0;
        };

        let recipients = {
            let index = self.index.lock();
            fanout::recipients(&index, &event)
        };
        if recipients.is_empty() {
            return 0;
        }

        let payload = match event.delivery_text(true) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "failed to serialize filtered delivery");
                return 0;
            }
        };
        recipients
            .into_iter()
            .filter(|client| self.clients.deliver(*client, payload.clone()))
            .count()
    }

    /// Deliver one event from the listen-all channel to every listen-all
    /// member. Returns the number of deliveries queued.
    pub fn on_listen_all_event(&self, text: &str) -> usize {
        let Some(mut event) = self.parse_event(text) else {
            return 0;
        };

        let members = self.listen_all.members();
        if members.is_empty() {
            return 0;
        }

        let payload = match event.delivery_text(false) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "failed to serialize listen-all delivery");
                return 0;
            }
        };
        members
            .into_iter()
            .filter(|client| self.clients.deliver(*client, payload.clone()))
            .count()
    }

    /// Parse an upstream frame, keeping only events on the tracked topic.
    fn parse_event(&self, text: &str) -> Option<UpstreamEvent> {
        let event = match UpstreamEvent::parse(text) {
            Ok(ev) => ev,
            Err(e) => {
                debug!(error = %e, "unparseable upstream frame dropped");
                return None;
            }
        };
        if event.topic() != Some(self.topic.as_str()) {
            return None;
        }
        Some(event)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn tracked_accounts(&self) -> Vec<AccountId> {
        self.index.lock().tracked_accounts()
    }

    pub fn is_listening_all(&self, client: ClientId) -> bool {
        self.listen_all.contains(client)
    }

    pub fn stats(&self) -> HubStats {
        let (tracked_accounts, registered_clients) = {
            let index = self.index.lock();
            (index.account_count(), index.client_count())
        };
        HubStats {
            clients: self.clients.len(),
            tracked_accounts,
            registered_clients,
            listen_all_clients: self.listen_all.len(),
            listen_all_enabled: self.allow_listen_all,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::{error::TryRecvError, Receiver, UnboundedReceiver};

    fn settings(allow_listen_all: bool) -> RelaySettings {
        RelaySettings {
            allow_listen_all,
            ..RelaySettings::default()
        }
    }

    fn hub(allow_listen_all: bool) -> (RelayHub, UnboundedReceiver<UpstreamRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RelayHub::new(&settings(allow_listen_all), tx), rx)
    }

    fn client(hub: &RelayHub) -> (ClientId, Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (hub.connect(tx), rx)
    }

    fn drain<T>(rx: &mut UnboundedReceiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    fn received(rx: &mut Receiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn confirmation(account: &str, linked: &str) -> String {
        json!({
            "topic": "confirmation",
            "message": { "account": account, "block": { "link_as_account": linked } }
        })
        .to_string()
    }

    fn add(account: &str) -> UpstreamRequest {
        UpstreamRequest::add_account("confirmation", AccountId::from(account))
    }

    fn del(account: &str) -> UpstreamRequest {
        UpstreamRequest::remove_account("confirmation", AccountId::from(account))
    }

    #[test]
    fn upstream_sees_each_account_once() {
        let (hub, mut upstream) = hub(false);
        let (c1, _r1) = client(&hub);
        let (c2, _r2) = client(&hub);

        hub.register_account(c1, AccountId::from("a"));
        hub.register_account(c1, AccountId::from("a"));
        hub.register_account(c2, AccountId::from("a"));
        hub.register_account(c2, AccountId::from("b"));
        assert_eq!(drain(&mut upstream), vec![add("a"), add("b")]);

        hub.unregister_account(c1, &AccountId::from("a"));
        assert!(drain(&mut upstream).is_empty());
        hub.unregister_account(c2, &AccountId::from("a"));
        hub.unregister_account(c2, &AccountId::from("never"));
        assert_eq!(drain(&mut upstream), vec![del("a")]);
    }

    #[test]
    fn disconnect_removes_orphaned_accounts_upstream() {
        let (hub, mut upstream) = hub(true);
        let (c1, _r1) = client(&hub);
        let (c2, _r2) = client(&hub);
        hub.register_account(c1, AccountId::from("a1"));
        hub.register_account(c1, AccountId::from("a2"));
        hub.register_account(c2, AccountId::from("a2"));
        hub.listen_all(c1);
        drain(&mut upstream);

        let orphaned = hub.disconnect(c1);
        assert_eq!(orphaned, vec![AccountId::from("a1")]);
        assert_eq!(drain(&mut upstream), vec![del("a1")]);
        assert!(!hub.is_listening_all(c1));
        assert_eq!(hub.tracked_accounts(), vec![AccountId::from("a2")]);

        hub.disconnect(c2);
        assert_eq!(drain(&mut upstream), vec![del("a2")]);
        assert_eq!(hub.stats().clients, 0);
    }

    #[test]
    fn filtered_fan_out_delivers_one_copy_per_client() {
        let (hub, _upstream) = hub(false);
        let (c1, mut r1) = client(&hub);
        let (c2, mut r2) = client(&hub);
        let (both, mut r_both) = client(&hub);
        let (_idle, mut r_idle) = client(&hub);
        hub.register_account(c1, AccountId::from("X"));
        hub.register_account(c2, AccountId::from("Y"));
        hub.register_account(both, AccountId::from("X"));
        hub.register_account(both, AccountId::from("Y"));

        assert_eq!(hub.on_filtered_event(&confirmation("X", "Y")), 3);

        for rx in [&mut r1, &mut r2, &mut r_both] {
            let got = received(rx);
            assert_eq!(got.len(), 1);
            assert_eq!(got[0]["is_filtered"], Value::Bool(true));
            assert_eq!(got[0]["message"]["account"], "X");
        }
        assert!(received(&mut r_idle).is_empty());
    }

    #[test]
    fn other_topics_and_garbage_are_ignored() {
        let (hub, _upstream) = hub(true);
        let (c, mut rx) = client(&hub);
        hub.register_account(c, AccountId::from("X"));
        hub.listen_all(c);

        let vote = json!({"topic": "vote", "message": {"account": "X"}}).to_string();
        assert_eq!(hub.on_filtered_event(&vote), 0);
        assert_eq!(hub.on_listen_all_event(&vote), 0);
        assert_eq!(hub.on_filtered_event("{not json"), 0);
        assert_eq!(hub.on_filtered_event(r#"{"message":{"account":"X"}}"#), 0);
        assert!(received(&mut rx).is_empty());
    }

    #[test]
    fn listen_all_is_independent_of_registrations() {
        let (hub, _upstream) = hub(true);
        let (c, mut rx) = client(&hub);
        assert!(hub.listen_all(c));

        assert_eq!(hub.on_listen_all_event(&confirmation("X", "Y")), 1);
        let got = received(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["is_filtered"], Value::Bool(false));

        // registering afterwards adds a filtered copy, never suppresses or
        // duplicates the listen-all one
        hub.register_account(c, AccountId::from("X"));
        assert_eq!(hub.on_listen_all_event(&confirmation("X", "Y")), 1);
        assert_eq!(hub.on_filtered_event(&confirmation("X", "Y")), 1);
        let flags: Vec<Value> = received(&mut rx)
            .into_iter()
            .map(|v| v["is_filtered"].clone())
            .collect();
        assert_eq!(flags, vec![Value::Bool(false), Value::Bool(true)]);

        assert!(hub.unlisten_all(c));
        assert_eq!(hub.on_listen_all_event(&confirmation("X", "Y")), 0);
    }

    #[test]
    fn listen_all_is_refused_when_disabled() {
        let (hub, _upstream) = hub(false);
        let (c, mut rx) = client(&hub);

        assert!(!hub.listen_all(c));
        assert!(!hub.is_listening_all(c));
        assert_eq!(hub.on_listen_all_event(&confirmation("X", "Y")), 0);
        assert!(received(&mut rx).is_empty());
        assert!(!hub.stats().listen_all_enabled);
    }

    #[test]
    fn no_delivery_after_disconnect() {
        let (hub, _upstream) = hub(false);
        let (c1, mut r1) = client(&hub);
        let (c2, _r2) = client(&hub);
        hub.register_account(c1, AccountId::from("X"));
        hub.register_account(c2, AccountId::from("X"));

        hub.disconnect(c1);
        assert_eq!(hub.on_filtered_event(&confirmation("X", "X")), 1);
        assert_eq!(r1.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn reopen_re_derives_the_subscription() {
        let (hub, _upstream) = hub(false);
        let (c, _rx) = client(&hub);
        hub.register_account(c, AccountId::from("b"));
        hub.register_account(c, AccountId::from("a"));

        assert_eq!(
            hub.filtered_open_requests(),
            vec![
                UpstreamRequest::subscribe_empty("confirmation"),
                add("a"),
                add("b"),
            ]
        );
        assert_eq!(
            hub.listen_all_open_requests(),
            vec![UpstreamRequest::subscribe_all("confirmation")]
        );
    }

    #[test]
    fn register_deliver_disconnect_scenario() {
        let (hub, mut upstream) = hub(false);
        let (c, mut rx) = client(&hub);

        let action =
            ClientAction::parse(r#"{"action":"register_account","account":"nano_1abc"}"#).unwrap();
        hub.apply(c, action);
        assert_eq!(drain(&mut upstream), vec![add("nano_1abc")]);

        hub.on_filtered_event(&confirmation("nano_1abc", "nano_1xyz"));
        let got = received(&mut rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["is_filtered"], Value::Bool(true));
        assert_eq!(got[0]["message"]["block"]["link_as_account"], "nano_1xyz");

        hub.disconnect(c);
        assert_eq!(drain(&mut upstream), vec![del("nano_1abc")]);
    }
}
