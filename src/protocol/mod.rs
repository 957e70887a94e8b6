//! Wire protocol between peers and the tracker
//!
//! Newline-delimited JSON objects over TCP. See [`messages`] for the message
//! shapes and [`framing`] for how a byte stream is cut into messages.

pub mod framing;
pub mod messages;

pub use framing::*;
pub use messages::*;
