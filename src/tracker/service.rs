//! Tracker service: membership changes plus their notifications
//!
//! Each membership change runs in one critical section together with the
//! enqueueing of the messages that describe it. Every peer therefore sees
//! joins and leaves in the same order the registry applied them, and a new
//! peer's `peers` snapshot is always queued before any later `newNode` or
//! `removeNode`. Enqueueing never waits on a socket.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::broadcast::Broadcaster;
use super::registry::{ConnectionId, Outbox, Peer, PeerRegistry};
use crate::protocol::{Message, PeerEntry};

/// Result of a register request
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// Peer added; carries the snapshot that was queued for it
    Admitted { peers: Vec<PeerEntry> },

    /// Connection was already registered; nothing changed
    Duplicate,
}

/// Shared tracker state
#[derive(Debug)]
pub struct Tracker {
    registry: Mutex<PeerRegistry>,
    broadcaster: Broadcaster,
    next_id: AtomicU64,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(PeerRegistry::new()),
            broadcaster: Broadcaster::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identity for a newly accepted connection
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register the peer on connection `id`
    ///
    /// Queues the full peer set (including the new peer) on `outbox`, then a
    /// `newNode` for every other registered peer.
    pub fn register(
        &self,
        id: ConnectionId,
        address: &str,
        metadata: Value,
        outbox: &Outbox,
    ) -> Registration {
        let mut registry = self.registry.lock();

        let peer = Peer {
            id,
            address: address.to_string(),
            metadata,
            outbox: outbox.clone(),
        };
        let Some(entry) = registry.admit(peer) else {
            debug!(conn = %id, "Connection already registered, ignoring");
            return Registration::Duplicate;
        };

        let peers = registry.snapshot();
        self.broadcaster.send(outbox, &Message::PeerSet(peers.clone()));

        let others = registry.recipients(id);
        let delivery = self
            .broadcaster
            .notify(&others, &Message::PeerJoined(entry));

        info!(
            conn = %id,
            address = %address,
            peers = registry.len(),
            notified = delivery.delivered,
            "Peer registered"
        );

        Registration::Admitted { peers }
    }

    /// Remove the peer on connection `id`, notifying everyone left
    ///
    /// Returns the removed entry, or `None` if the connection never
    /// registered (in which case nobody is notified).
    pub fn unregister(&self, id: ConnectionId) -> Option<PeerEntry> {
        let mut registry = self.registry.lock();

        let peer = registry.evict(id)?;
        let entry = peer.entry();

        let remaining = registry.recipients(id);
        let delivery = self
            .broadcaster
            .notify(&remaining, &Message::PeerLeft(entry.clone()));

        info!(
            conn = %id,
            address = %peer.address,
            peers = registry.len(),
            notified = delivery.delivered,
            "Peer left"
        );

        Some(entry)
    }

    /// Current membership in registration order
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        self.registry.lock().snapshot()
    }

    pub fn peer_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.registry.lock().contains(id)
    }
}
