//! Tracker control messages
//!
//! Every message is a single-key JSON object terminated by a newline:
//!
//! ```text
//! {"register": <metadata>}                      peer → tracker
//! {"peers": [[address, metadata], ...]}         tracker → peer, once after registering
//! {"newNode": [address, metadata]}              tracker → peer, another peer joined
//! {"removeNode": [address, metadata]}           tracker → peer, another peer left
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One member of the peer set as seen on the wire: `[address, metadata]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry(pub String, pub Value);

impl PeerEntry {
    /// Create an entry from an address and the peer's registered metadata
    pub fn new(address: impl Into<String>, metadata: Value) -> Self {
        Self(address.into(), metadata)
    }

    /// Observed network address of the peer
    pub fn address(&self) -> &str {
        &self.0
    }

    /// Metadata the peer registered with
    pub fn metadata(&self) -> &Value {
        &self.1
    }
}

/// All tracker protocol messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // ─── Peer → Tracker ──────────────────────────────────────────
    /// Admit the sending connection with this metadata
    #[serde(rename = "register")]
    Register(Value),

    // ─── Tracker → Peer ──────────────────────────────────────────
    /// Full membership, sent once right after registration
    #[serde(rename = "peers")]
    PeerSet(Vec<PeerEntry>),

    /// A new peer registered
    #[serde(rename = "newNode")]
    PeerJoined(PeerEntry),

    /// A registered peer disconnected
    #[serde(rename = "removeNode")]
    PeerLeft(PeerEntry),
}

impl Message {
    /// Wire key of the message
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Register(_) => "register",
            Message::PeerSet(_) => "peers",
            Message::PeerJoined(_) => "newNode",
            Message::PeerLeft(_) => "removeNode",
        }
    }

    /// Check if this is a request message (peer → tracker)
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Register(_))
    }
}

/// Why a frame could not be turned into a [`Message`]
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing but whitespace in the frame
    #[error("empty message")]
    Empty,

    /// The frame exceeded the configured size limit
    #[error("message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    /// Not JSON, or not one of the known message shapes
    #[error("unrecognized message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one frame (without its trailing newline)
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Encode a message as one newline-terminated frame
pub fn encode(message: &Message) -> Vec<u8> {
    // Serializing String/Value content into a Vec cannot fail
    let mut frame = serde_json::to_vec(message).unwrap_or_default();
    frame.push(b'\n');
    frame
}
