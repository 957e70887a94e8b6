//! Per-connection handling
//!
//! Each accepted connection runs a reader (this task) and a writer task fed
//! by the connection's outbox. The reader frames and decodes incoming bytes
//! and drives the connection through
//! `Connecting → Registered → Closed`. Whatever ends the connection (EOF, a
//! read error, a failed or stalled write, the registration deadline) takes
//! the same teardown path, which removes the peer exactly once.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::registry::{ConnectionId, Frame};
use super::service::{Registration, Tracker};
use crate::config::ServerSettings;
use crate::error::Error;
use crate::protocol::{decode, FrameReader, Message};

/// Limits applied to every connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub max_message_bytes: usize,
    pub outbox_capacity: usize,
    pub write_timeout: Duration,
    pub registration_timeout: Option<Duration>,
}

impl From<&ServerSettings> for ConnectionConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            max_message_bytes: settings.max_message_bytes,
            outbox_capacity: settings.outbox_capacity,
            write_timeout: settings.write_timeout(),
            registration_timeout: settings.registration_timeout(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no valid register received yet
    Connecting,
    /// In the peer registry
    Registered,
    /// Torn down; terminal
    Closed,
}

/// How the writer task is handled once the reader stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Deliver what is already queued, then close
    Drain,
    /// Close immediately
    Abort,
    /// Writer has already finished
    WriterDone,
}

/// Address reported to other peers: the remote IP without the port
///
/// IPv4-mapped IPv6 addresses are reported in their IPv4 form.
pub fn remote_address(peer_addr: &SocketAddr) -> String {
    peer_addr.ip().to_canonical().to_string()
}

/// Serve one connection until it closes
///
/// Returns an error when the connection ended abnormally (read failure or
/// writer failure). The peer has been unregistered either way.
pub async fn serve_connection<R, W>(
    tracker: Arc<Tracker>,
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: R,
    writer: W,
    config: ConnectionConfig,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let address = remote_address(&peer_addr);
    let (outbox, outbox_rx) = mpsc::channel::<Frame>(config.outbox_capacity);

    let mut writer_task = tokio::spawn(write_loop(
        id,
        peer_addr,
        writer,
        outbox_rx,
        config.write_timeout,
    ));

    let mut frames = FrameReader::new(reader, config.max_message_bytes);
    let mut state = ConnectionState::Connecting;

    let registration_deadline = async {
        match config.registration_timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(registration_deadline);

    debug!(conn = %id, peer_addr = %peer_addr, "Connection opened");

    let (teardown, result): (Teardown, anyhow::Result<()>) = loop {
        tokio::select! {
            read = frames.next_frame() => match read {
                Ok(Some(Ok(frame))) => {
                    state = handle_frame(&tracker, id, &address, &outbox, state, &frame);
                }
                Ok(Some(Err(e))) => {
                    warn!(conn = %id, error = %Error::from(e).format_for_log(), "Invalid data from peer");
                }
                Ok(None) => break (Teardown::Drain, Ok(())),
                Err(e) => {
                    let err = anyhow::Error::new(e).context(format!("read from {} failed", peer_addr));
                    break (Teardown::Abort, Err(err));
                }
            },

            joined = &mut writer_task => {
                let result: anyhow::Result<()> = match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(anyhow::anyhow!("writer task for {} failed: {}", id, e)),
                };
                break (Teardown::WriterDone, result);
            }

            _ = &mut registration_deadline, if state == ConnectionState::Connecting => {
                warn!(conn = %id, peer_addr = %peer_addr, "Registration timeout, closing connection");
                break (Teardown::Drain, Ok(()));
            }
        }
    };

    // Teardown
    let was_registered = state == ConnectionState::Registered;
    state = ConnectionState::Closed;
    tracker.unregister(id);

    match teardown {
        Teardown::Drain => {
            // The registry no longer holds a sender, so the writer stops once
            // the queue is empty. Each queued frame is bounded by write_timeout.
            drop(outbox);
            match writer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(conn = %id, error = %e, "Outbox not fully delivered"),
                Err(e) => debug!(conn = %id, error = %e, "Writer task failed during drain"),
            }
        }
        Teardown::Abort => writer_task.abort(),
        Teardown::WriterDone => {}
    }

    debug!(
        conn = %id,
        peer_addr = %peer_addr,
        registered = was_registered,
        state = ?state,
        "Connection closed"
    );

    result
}

/// Apply one decoded frame, returning the connection's next state
fn handle_frame(
    tracker: &Tracker,
    id: ConnectionId,
    address: &str,
    outbox: &mpsc::Sender<Frame>,
    state: ConnectionState,
    frame: &[u8],
) -> ConnectionState {
    let message = match decode(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!(conn = %id, error = %Error::from(e).format_for_log(), "Invalid data from peer");
            return state;
        }
    };

    match (message, state) {
        (Message::Register(metadata), ConnectionState::Connecting) => {
            if let Registration::Admitted { peers } = tracker.register(id, address, metadata, outbox) {
                debug!(conn = %id, peers = peers.len(), "Sent peer set");
            }
            ConnectionState::Registered
        }
        (message, _) if message.is_request() => {
            debug!(conn = %id, message = message.type_name(), "Repeated register ignored");
            state
        }
        (message, _) => {
            debug!(conn = %id, message = message.type_name(), "Ignoring tracker-only message from peer");
            state
        }
    }
}

/// Drain the outbox into the socket
///
/// Ends with an error when a write fails or stalls past `write_timeout`;
/// ends cleanly once every outbox sender is gone.
async fn write_loop<W>(
    id: ConnectionId,
    peer_addr: SocketAddr,
    mut writer: W,
    mut outbox_rx: mpsc::Receiver<Frame>,
    write_timeout: Duration,
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbox_rx.recv().await {
        let message = match timeout(write_timeout, write_frame(&mut writer, &frame)).await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("write failed: {}", e),
            Err(_) => format!("write stalled for more than {:?}", write_timeout),
        };
        info!(conn = %id, peer_addr = %peer_addr, reason = %message, "Dropping unresponsive peer");
        return Err(Error::ConnectionLost {
            addr: peer_addr,
            message,
        });
    }
    Ok(())
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}
