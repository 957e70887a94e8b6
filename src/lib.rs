//! p2p-tracker: a rendezvous service that tells peers about each other
//!
//! Peers connect over TCP, register with opaque metadata, receive the current
//! peer set and are then notified whenever another peer joins or leaves.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod tracker;
pub mod version;

pub use config::TrackerConfig;
pub use error::{Error, ErrorCode, Result};
pub use tracker::{Tracker, TrackerServer};
