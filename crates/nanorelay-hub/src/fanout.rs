//! Recipient selection for account-filtered delivery.

use std::collections::HashSet;

use nanorelay_core::ClientId;
use nanorelay_protocol::UpstreamEvent;

use crate::membership::MembershipIndex;

/// Clients interested in the event's primary account or its linked
/// account. A client matched through both paths appears once.
pub fn recipients(index: &MembershipIndex, event: &UpstreamEvent) -> HashSet<ClientId> {
    let mut clients = HashSet::new();
    if let Some(account) = event.primary_account() {
        clients.extend(index.clients_for(&account));
    }
    if let Some(linked) = event.linked_account() {
        clients.extend(index.clients_for(&linked));
    }
    clients
}
