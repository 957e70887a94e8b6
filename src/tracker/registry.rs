//! Peer registry: the set of currently registered peers
//!
//! Insertion-ordered. The registry itself is not synchronized; the
//! [`Tracker`](super::Tracker) owns it behind a mutex so that membership
//! changes and the notifications describing them happen as one step.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::protocol::PeerEntry;

/// An encoded, newline-terminated frame shared between outboxes
pub type Frame = Arc<[u8]>;

/// Sending half of a connection's outbound frame queue
pub type Outbox = mpsc::Sender<Frame>;

// ─────────────────────────────────────────────────────────────────
// Connection Identity
// ─────────────────────────────────────────────────────────────────

/// Identity of one accepted connection, unique for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Registered Peer
// ─────────────────────────────────────────────────────────────────

/// A registered peer
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: ConnectionId,

    /// Remote IP observed when the connection was accepted
    pub address: String,

    /// Opaque metadata from the peer's register message
    pub metadata: Value,

    pub outbox: Outbox,
}

impl Peer {
    /// Wire form of this peer: `[address, metadata]`
    pub fn entry(&self) -> PeerEntry {
        PeerEntry::new(self.address.clone(), self.metadata.clone())
    }
}

/// A peer that should receive a notification
#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: ConnectionId,
    pub outbox: Outbox,
}

// ─────────────────────────────────────────────────────────────────
// Peer Registry
// ─────────────────────────────────────────────────────────────────

/// Ordered collection of registered peers, at most one per connection
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a peer
    ///
    /// Returns `None` without changing anything if the connection is
    /// already registered.
    pub fn admit(&mut self, peer: Peer) -> Option<PeerEntry> {
        if self.contains(peer.id) {
            return None;
        }
        let entry = peer.entry();
        self.peers.push(peer);
        Some(entry)
    }

    /// Remove the peer registered by `id`
    ///
    /// Every matching element is removed; the first one is returned.
    pub fn evict(&mut self, id: ConnectionId) -> Option<Peer> {
        let mut removed = None;
        self.peers.retain(|peer| {
            if peer.id == id {
                if removed.is_none() {
                    removed = Some(peer.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Current membership in insertion order
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        self.peers.iter().map(Peer::entry).collect()
    }

    /// Every registered peer except `exclude`
    pub fn recipients(&self, exclude: ConnectionId) -> Vec<Recipient> {
        self.peers
            .iter()
            .filter(|peer| peer.id != exclude)
            .map(|peer| Recipient {
                id: peer.id,
                outbox: peer.outbox.clone(),
            })
            .collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.peers.iter().any(|peer| peer.id == id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Peer> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
