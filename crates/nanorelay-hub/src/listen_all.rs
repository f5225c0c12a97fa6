use std::collections::HashSet;

use nanorelay_core::ClientId;
use parking_lot::RwLock;

/// Clients that receive every event unfiltered.
///
/// Flat membership, unrelated to account registrations.
#[derive(Default)]
pub struct ListenAllSet {
    members: RwLock<HashSet<ClientId>>,
}

impl ListenAllSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the client was not already a member.
    pub fn add(&self, client: ClientId) -> bool {
        self.members.write().insert(client)
    }

    /// Returns `true` if the client was a member.
    pub fn remove(&self, client: ClientId) -> bool {
        self.members.write().remove(&client)
    }

    pub fn contains(&self, client: ClientId) -> bool {
        self.members.read().contains(&client)
    }

    /// Snapshot so delivery happens without holding the lock.
    pub fn members(&self) -> Vec<ClientId> {
        self.members.read().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}
