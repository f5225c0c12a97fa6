use dashmap::DashMap;
use nanorelay_core::ClientId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Outbound queues of live downstream connections: client_id -> sender.
///
/// The gateway owns the sockets; each connection task drains its receiver.
#[derive(Default)]
pub struct ClientRegistry {
    senders: DashMap<ClientId, mpsc::Sender<String>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, client: ClientId, tx: mpsc::Sender<String>) {
        self.senders.insert(client, tx);
    }

    pub fn detach(&self, client: ClientId) -> bool {
        self.senders.remove(&client).is_some()
    }

    /// Queue `payload` for `client` without waiting.
    ///
    /// Closed, full or unknown connections drop the payload; returns whether
    /// it was queued.
    pub fn deliver(&self, client: ClientId, payload: String) -> bool {
        let Some(tx) = self.senders.get(&client) else {
            debug!(client_id = %client, "delivery to detached client dropped");
            return false;
        };
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(client_id = %client, "client queue full, delivery dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client_id = %client, "client connection closed, delivery dropped");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
