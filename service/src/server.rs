//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Relay server
//!
//! The RelayServer owns the TCP listener and the accept loop. Every accepted
//! socket is admitted on its own task: the connection limit is checked, the
//! identity handshake runs, and the result is handed to the Registry.

use crate::{
    Connection, Registry, RelayConfig, RelayError, RelayHandler, RelayMetrics, Result,
    ServerSnapshot, SessionConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Back-off after a failed `accept()`
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Counts a socket that is between `accept()` and registration
///
/// Connections still in their handshake hold a slot, so a burst of
/// handshakes cannot overshoot `max_connections`.
struct AdmissionSlot {
    admitting: Arc<AtomicUsize>,
    others: usize,
}

impl AdmissionSlot {
    fn acquire(admitting: &Arc<AtomicUsize>) -> Self {
        let others = admitting.fetch_add(1, Ordering::SeqCst);
        Self {
            admitting: admitting.clone(),
            others,
        }
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.admitting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Running accept loop
struct AcceptTask {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Line relay server
///
/// # Example
///
/// ```no_run
/// use linerelay_service::{NoopHandler, RelayConfig, RelayServer};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = RelayServer::new(RelayConfig::default()).await?;
///     server.start(Arc::new(NoopHandler)).await?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct RelayServer {
    config: Arc<RelayConfig>,
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
    listener: Arc<TcpListener>,
    bind_address: SocketAddr,
    started_at: Instant,
    running: AtomicBool,
    admitting: Arc<AtomicUsize>,
    accept_task: Mutex<Option<AcceptTask>>,
}

impl RelayServer {
    /// Validate `config` and bind the listener
    ///
    /// Connections are not accepted until [`start`](Self::start) is called.
    pub async fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let bind_address = listener.local_addr()?;

        let metrics = Arc::new(RelayMetrics::new());
        let registry = Arc::new(Registry::new(
            SessionConfig::from(&config),
            metrics.clone(),
        ));

        info!(bind_address = %bind_address, "Relay server bound");

        Ok(Self {
            config: Arc::new(config),
            registry,
            metrics,
            listener: Arc::new(listener),
            bind_address,
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            admitting: Arc::new(AtomicUsize::new(0)),
            accept_task: Mutex::new(None),
        })
    }

    /// Start accepting connections
    ///
    /// A server that has been shut down cannot be started again.
    pub async fn start(&self, handler: Arc<dyn RelayHandler>) -> Result<()> {
        if self.registry.is_closed() {
            return Err(RelayError::ServerNotRunning);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::ServerAlreadyRunning);
        }

        info!(bind_address = %self.bind_address, "Starting relay server");

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(
            self.listener.clone(),
            self.registry.clone(),
            self.config.clone(),
            self.admitting.clone(),
            handler,
            shutdown.clone(),
        ));
        *self.accept_task.lock().await = Some(AcceptTask { shutdown, handle });

        Ok(())
    }

    /// Stop accepting, release every session and wait for their loops
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(RelayError::ServerNotRunning);
        }

        info!("Shutting down relay server");

        if let Some(task) = self.accept_task.lock().await.take() {
            task.shutdown.cancel();
            if tokio::time::timeout(self.config.shutdown_timeout, task.handle)
                .await
                .is_err()
            {
                warn!("Accept loop did not stop in time");
            }
        }

        self.registry.shutdown(self.config.shutdown_timeout).await;

        info!("Relay server shutdown complete");
        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the bound address (resolved if port 0 was requested)
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of registered sessions
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Get the number of connections still in their identity handshake
    pub fn pending_admissions(&self) -> usize {
        self.admitting.load(Ordering::SeqCst)
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_sessions: self.registry.len(),
            total_sessions: self.metrics.total_sessions(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// Get the registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

async fn accept_loop(
    listener: Arc<TcpListener>,
    registry: Arc<Registry>,
    config: Arc<RelayConfig>,
    admitting: Arc<AtomicUsize>,
    handler: Arc<dyn RelayHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer_addr)) => {
                debug!(peer_addr = %peer_addr, "Accepted connection");
                let slot = AdmissionSlot::acquire(&admitting);
                tokio::spawn(admit(
                    socket,
                    peer_addr,
                    slot,
                    registry.clone(),
                    config.clone(),
                    handler.clone(),
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!("Accept loop terminated");
}

/// Take one accepted socket through the limit check and handshake
async fn admit(
    socket: TcpStream,
    peer_addr: SocketAddr,
    slot: AdmissionSlot,
    registry: Arc<Registry>,
    config: Arc<RelayConfig>,
    handler: Arc<dyn RelayHandler>,
    shutdown: CancellationToken,
) {
    let mut connection = match Connection::wrap(socket, config.max_line_length) {
        Ok(connection) => connection,
        Err(e) => {
            error!(peer_addr = %peer_addr, error = %e, "Failed to wrap connection");
            return;
        }
    };

    if registry.len() + slot.others >= config.max_connections {
        let err = RelayError::MaxConnectionsReached(config.max_connections);
        warn!(peer_addr = %peer_addr, error = %err, "Rejecting connection");
        registry.metrics().connection_rejected();
        let _ = connection.write_line(&format!("ERR {}", err)).await;
        return;
    }

    let handshake = tokio::select! {
        _ = shutdown.cancelled() => return,
        handshake = connection.handshake(
            &config.welcome_message,
            config.handshake_timeout,
            config.max_identity_length,
        ) => handshake,
    };

    let identity = match handshake {
        Ok(identity) => identity,
        Err(e) => {
            registry.metrics().handshake_failed();
            debug!(peer_addr = %peer_addr, error = %e, "Handshake failed");
            if matches!(
                e,
                RelayError::InvalidIdentity(_) | RelayError::HandshakeTimeout
            ) {
                let _ = connection.write_line(&format!("ERR {}", e)).await;
            }
            return;
        }
    };

    if shutdown.is_cancelled() {
        return;
    }

    // A shutdown racing this point is caught inside `register`
    if let Err(e) = registry.register(identity, connection, handler).await {
        debug!(peer_addr = %peer_addr, error = %e, "Registration refused");
    }
    drop(slot);
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("bind_address", &self.bind_address)
            .field("running", &self.is_running())
            .field("session_count", &self.session_count())
            .field("pending_admissions", &self.pending_admissions())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            warn!("RelayServer dropped while still running");
            if let Some(task) = self.accept_task.get_mut().take() {
                task.shutdown.cancel();
            }
        }
    }
}
