//! TCP listener and accept loop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connection::{serve_connection, ConnectionConfig};
use super::service::Tracker;
use crate::config::ServerSettings;
use crate::error::{Error, Result};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound tracker listener
pub struct TrackerServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    tracker: Arc<Tracker>,
    connection_config: ConnectionConfig,
    max_connections: usize,
    open_connections: Arc<AtomicUsize>,
}

impl TrackerServer {
    /// Bind the listener described by `settings`
    ///
    /// Invalid settings are rejected before binding. Failing to bind is
    /// fatal for the service and reported as [`Error::Bind`].
    pub async fn bind(settings: &ServerSettings) -> Result<Self> {
        settings.validate()?;

        let bind_addr = settings.listen_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| Error::bind(bind_addr.clone(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::bind(bind_addr, e))?;

        info!(addr = %local_addr, "P2P tracking service started");

        Ok(Self {
            listener,
            local_addr,
            tracker: Arc::new(Tracker::new()),
            connection_config: ConnectionConfig::from(settings),
            max_connections: settings.max_connections,
            open_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared tracker state served by this listener
    pub fn tracker(&self) -> Arc<Tracker> {
        Arc::clone(&self.tracker)
    }

    /// Accept connections forever
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(peer_addr = %peer_addr, "Incoming connection");

                    let Some(slot) = ConnectionSlot::acquire(&self.open_connections, self.max_connections) else {
                        warn!(
                            peer_addr = %peer_addr,
                            max = self.max_connections,
                            "Max connections reached, rejecting"
                        );
                        drop(stream);
                        continue;
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer_addr = %peer_addr, error = %e, "Could not set TCP_NODELAY");
                    }

                    let tracker = Arc::clone(&self.tracker);
                    let id = tracker.next_connection_id();
                    let config = self.connection_config;
                    info!(conn = %id, peer_addr = %peer_addr, "Peer connected");

                    tokio::spawn(async move {
                        let _slot = slot;
                        let (read_half, write_half) = stream.into_split();
                        if let Err(e) =
                            serve_connection(tracker, id, peer_addr, read_half, write_half, config).await
                        {
                            debug!(conn = %id, error = %e, "Connection ended with error");
                        }
                        info!(conn = %id, peer_addr = %peer_addr, "Peer disconnected");
                    });
                }
                Err(e) => {
                    let err = Error::Accept(e);
                    error!(error = %err.format_for_log(), "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Run the accept loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Counts an open connection until dropped
struct ConnectionSlot {
    open: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(open: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        open.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < max).then_some(n + 1)
        })
        .ok()?;
        Some(Self {
            open: Arc::clone(open),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}
