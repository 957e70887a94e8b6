//! Peer-presence tracking
//!
//! - [`registry`]: the ordered set of registered peers
//! - [`broadcast`]: non-blocking fan-out to peer outboxes
//! - [`service`]: membership changes and the notifications they trigger
//! - [`connection`]: per-connection read/write handling
//! - [`server`]: TCP listener and accept loop

pub mod broadcast;
pub mod connection;
pub mod registry;
pub mod server;
pub mod service;

pub use broadcast::{Broadcaster, Delivery};
pub use connection::{remote_address, serve_connection, ConnectionConfig, ConnectionState};
pub use registry::{ConnectionId, Frame, Outbox, Peer, PeerRegistry, Recipient};
pub use server::TrackerServer;
pub use service::{Registration, Tracker};
