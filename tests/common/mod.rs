//! Common test utilities and fixtures
//!
//! Shared fixtures plus a small line-oriented TCP client for talking to an
//! in-process tracker.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use p2p_tracker::config::ServerSettings;
use p2p_tracker::protocol::{decode, encode, Message, PeerEntry};
use p2p_tracker::tracker::{Tracker, TrackerServer};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// How long to wait for a message that should arrive
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to listen before concluding nothing was sent
pub const SILENCE_WINDOW: Duration = Duration::from_millis(200);

// ─────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

// ─────────────────────────────────────────────────────────────────
// In-process Tracker
// ─────────────────────────────────────────────────────────────────

/// Settings for a loopback tracker on an OS-chosen port
pub fn local_settings() -> ServerSettings {
    ServerSettings {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

/// Bind and spawn a tracker, returning its address and shared state
pub async fn start_server(settings: ServerSettings) -> (SocketAddr, Arc<Tracker>) {
    let server = TrackerServer::bind(&settings)
        .await
        .expect("Failed to bind tracker");
    let addr = server.local_addr();
    let tracker = server.tracker();
    server.spawn();
    (addr, tracker)
}

/// Wait until the tracker reports `expected` registered peers
pub async fn wait_for_peer_count(tracker: &Tracker, expected: usize) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tracker.peer_count() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "peer count stuck at {}, expected {}",
            tracker.peer_count(),
            expected
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ─────────────────────────────────────────────────────────────────
// Test Peer
// ─────────────────────────────────────────────────────────────────

/// A raw TCP client speaking the tracker protocol
pub struct TestPeer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestPeer {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to tracker");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Write raw bytes exactly as given
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
        self.writer.flush().await.expect("flush failed");
    }

    pub async fn send(&mut self, message: &Message) {
        self.send_raw(&encode(message)).await;
    }

    /// Register and return the peer set the tracker answers with
    pub async fn register(&mut self, metadata: Value) -> Vec<PeerEntry> {
        self.send(&Message::Register(metadata)).await;
        match self.recv().await {
            Message::PeerSet(peers) => peers,
            other => panic!("expected peers, got {:?}", other),
        }
    }

    /// Next message from the tracker
    pub async fn recv(&mut self) -> Message {
        let line = tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for tracker message")
            .expect("read failed")
            .expect("tracker closed the connection");
        decode(line.as_bytes()).expect("tracker sent an undecodable message")
    }

    /// Assert the tracker sends nothing for a short while
    pub async fn expect_silence(&mut self) {
        let next = tokio::time::timeout(SILENCE_WINDOW, self.lines.next_line()).await;
        assert!(next.is_err(), "expected silence, got {:?}", next);
    }

    /// Half-close: stop sending but keep reading
    pub async fn shutdown_write(&mut self) {
        self.writer.shutdown().await.expect("shutdown failed");
    }

    /// Collect every message until the tracker closes the connection
    pub async fn recv_until_closed(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
                .await
                .expect("tracker kept the connection open");
            match next.expect("read failed") {
                Some(line) => messages.push(
                    decode(line.as_bytes()).expect("tracker sent an undecodable message"),
                ),
                None => return messages,
            }
        }
    }

    /// Assert the tracker closes the connection without sending anything
    pub async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("tracker kept the connection open");
        match next {
            Ok(None) | Err(_) => {}
            Ok(Some(line)) => panic!("expected close, got {:?}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_dir_exists() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
    }

    #[test]
    fn test_valid_config_exists() {
        assert!(
            valid_config_fixture().exists(),
            "Valid config fixture should exist"
        );
    }

    #[test]
    fn test_invalid_config_exists() {
        assert!(
            invalid_config_fixture().exists(),
            "Invalid config fixture should exist"
        );
    }
}
