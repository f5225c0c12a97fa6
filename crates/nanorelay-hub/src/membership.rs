//! `MembershipIndex`: which clients want which accounts, kept in both
//! directions.
//!
//! The two maps are private and only ever changed together inside one
//! method, so `client ∈ account_clients[a]` holds exactly when
//! `a ∈ client_accounts[client]`. Empty sets are never stored: the key is
//! removed the moment its set drains, and that removal is what the
//! first/last-listener return values report.

use std::collections::{HashMap, HashSet};

use nanorelay_core::{AccountId, ClientId};

#[derive(Debug, Default)]
pub struct MembershipIndex {
    client_accounts: HashMap<ClientId, HashSet<AccountId>>,
    account_clients: HashMap<AccountId, HashSet<ClientId>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `client` with `account`.
    ///
    /// Returns `true` only when `account` had no listeners before this call.
    /// Registering the same pair twice is a no-op the second time.
    pub fn register_account(&mut self, client: ClientId, account: AccountId) -> bool {
        let first_listener = !self.account_clients.contains_key(&account);

        self.client_accounts
            .entry(client)
            .or_default()
            .insert(account.clone());
        self.account_clients.entry(account).or_default().insert(client);

        first_listener
    }

    /// Drop the pairing if it exists.
    ///
    /// Returns `true` when this removed the last listener of `account`.
    /// Unknown clients and accounts are not an error.
    pub fn unregister_account(&mut self, client: ClientId, account: &AccountId) -> bool {
        let Some(accounts) = self.client_accounts.get_mut(&client) else {
            return false;
        };
        if !accounts.remove(account) {
            return false;
        }
        if accounts.is_empty() {
            self.client_accounts.remove(&client);
        }

        self.detach_from_account(client, account)
    }

    /// Remove every pairing held by `client`.
    ///
    /// Returns the accounts left with no listeners, sorted so callers emit
    /// upstream removals in a stable order.
    pub fn disconnect(&mut self, client: ClientId) -> Vec<AccountId> {
        let Some(accounts) = self.client_accounts.remove(&client) else {
            return Vec::new();
        };

        let mut orphaned: Vec<AccountId> = accounts
            .into_iter()
            .filter(|account| self.detach_from_account(client, account))
            .collect();
        orphaned.sort();
        orphaned
    }

    /// Clients currently interested in `account` (empty when none).
    pub fn clients_for<'a>(&'a self, account: &AccountId) -> impl Iterator<Item = ClientId> + 'a {
        self.account_clients
            .get(account)
            .into_iter()
            .flat_map(|clients| clients.iter().copied())
    }

    /// Accounts `client` is registered for (empty when none).
    pub fn accounts_for<'a>(&'a self, client: ClientId) -> impl Iterator<Item = &'a AccountId> + 'a {
        self.client_accounts
            .get(&client)
            .into_iter()
            .flat_map(|accounts| accounts.iter())
    }

    /// Every account with at least one listener, sorted.
    pub fn tracked_accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.account_clients.keys().cloned().collect();
        accounts.sort();
        accounts
    }

    pub fn account_count(&self) -> usize {
        self.account_clients.len()
    }

    pub fn client_count(&self) -> usize {
        self.client_accounts.len()
    }

    /// Returns `true` if `client` was the last listener of `account`.
    fn detach_from_account(&mut self, client: ClientId, account: &AccountId) -> bool {
        let Some(clients) = self.account_clients.get_mut(account) else {
            return false;
        };
        clients.remove(&client);
        if clients.is_empty() {
            self.account_clients.remove(account);
            true
        } else {
            false
        }
    }

    /// Both directions agree and hold no empty sets.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let forward = self.client_accounts.iter().all(|(client, accounts)| {
            !accounts.is_empty()
                && accounts.iter().all(|a| {
                    self.account_clients
                        .get(a)
                        .is_some_and(|clients| clients.contains(client))
                })
        });
        let backward = self.account_clients.iter().all(|(account, clients)| {
            !clients.is_empty()
                && clients.iter().all(|c| {
                    self.client_accounts
                        .get(c)
                        .is_some_and(|accounts| accounts.contains(account))
                })
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(s: &str) -> AccountId {
        AccountId::from(s)
    }

    #[test]
    fn first_registration_reports_first_listener() {
        let mut index = MembershipIndex::new();
        let (c1, c2) = (ClientId::new(), ClientId::new());

        assert!(index.register_account(c1, acct("nano_1abc")));
        assert!(!index.register_account(c2, acct("nano_1abc")));
        assert!(index.is_consistent());
        assert_eq!(index.clients_for(&acct("nano_1abc")).count(), 2);
    }

    #[test]
    fn repeated_registration_is_idempotent() {
        let mut index = MembershipIndex::new();
        let c = ClientId::new();

        assert!(index.register_account(c, acct("nano_1abc")));
        assert!(!index.register_account(c, acct("nano_1abc")));
        assert_eq!(index.account_count(), 1);
        assert_eq!(index.accounts_for(c).count(), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn unregister_reports_only_last_listener() {
        let mut index = MembershipIndex::new();
        let (c1, c2) = (ClientId::new(), ClientId::new());
        index.register_account(c1, acct("x"));
        index.register_account(c2, acct("x"));

        assert!(!index.unregister_account(c1, &acct("x")));
        assert!(index.is_consistent());
        assert!(index.unregister_account(c2, &acct("x")));
        assert_eq!(index.account_count(), 0);
        assert_eq!(index.client_count(), 0);
        assert!(index.is_consistent());
    }

    #[test]
    fn unregister_unknown_pairs_is_a_no_op() {
        let mut index = MembershipIndex::new();
        let (c1, c2) = (ClientId::new(), ClientId::new());
        index.register_account(c1, acct("x"));

        assert!(!index.unregister_account(c2, &acct("x")));
        assert!(!index.unregister_account(c1, &acct("y")));
        assert!(!index.unregister_account(ClientId::new(), &acct("never")));
        assert_eq!(index.clients_for(&acct("x")).collect::<Vec<_>>(), vec![c1]);
        assert!(index.is_consistent());
    }

    #[test]
    fn disconnect_reports_each_orphaned_account_once() {
        let mut index = MembershipIndex::new();
        let (c1, c2) = (ClientId::new(), ClientId::new());
        index.register_account(c1, acct("a1"));
        index.register_account(c1, acct("a2"));
        index.register_account(c1, acct("shared"));
        index.register_account(c2, acct("shared"));

        let orphaned = index.disconnect(c1);
        assert_eq!(orphaned, vec![acct("a1"), acct("a2")]);
        assert_eq!(index.tracked_accounts(), vec![acct("shared")]);
        assert_eq!(index.accounts_for(c1).count(), 0);
        assert!(index.is_consistent());

        assert!(index.disconnect(c1).is_empty());
    }

    #[test]
    fn clients_for_unknown_account_is_empty() {
        let index = MembershipIndex::new();
        assert_eq!(index.clients_for(&acct("nobody")).count(), 0);
    }

    #[test]
    fn invariant_holds_across_mixed_sequence() {
        let mut index = MembershipIndex::new();
        let clients: Vec<ClientId> = (0..4).map(|_| ClientId::new()).collect();
        let accounts = ["a", "b", "c"];

        for (i, client) in clients.iter().enumerate() {
            for account in accounts.iter().take(i + 1) {
                index.register_account(*client, acct(account));
                assert!(index.is_consistent());
            }
        }
        index.unregister_account(clients[2], &acct("a"));
        assert!(index.is_consistent());
        index.disconnect(clients[3]);
        assert!(index.is_consistent());
        index.unregister_account(clients[0], &acct("a"));
        assert!(index.is_consistent());

        assert_eq!(index.clients_for(&acct("a")).count(), 1);
        assert_eq!(index.clients_for(&acct("c")).count(), 1);
    }
}
