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

//! Identity registry
//!
//! The Registry is responsible for:
//! - Mapping each connected identity to its mailbox and connection loops
//! - Refusing a second registration of a live identity
//! - Spawning the reception and transmission loops of a new session
//! - Routing payloads into mailboxes
//! - Releasing an entry exactly once when its session ends
//!
//! An entry exists for an identity iff its connection is open and at least
//! one of its loops is still running. Every removal cancels the entry's
//! token, which stops both loops without waiting for a poll interval.

use crate::{
    ClientIdentity, Connection, DisconnectReason, DrainOrder, Mailbox, ReceptionLoop, RelayConfig,
    RelayError, RelayHandler, RelayMetrics, Result, RoutingPolicy, SessionId, SessionInfo,
    TransmissionLoop,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-session settings shared by every registered connection
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on how long an idle transmission loop waits
    pub poll_interval: Duration,
    /// Timeout for writing one line
    pub write_timeout: Duration,
    /// Maximum pending payloads per mailbox
    pub mailbox_capacity: Option<usize>,
    /// Mailbox drain order
    pub drain_order: DrainOrder,
    /// Inbound routing policy
    pub routing: RoutingPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for SessionConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            write_timeout: config.write_timeout,
            mailbox_capacity: config.mailbox_capacity,
            drain_order: config.drain_order,
            routing: config.routing,
        }
    }
}

/// Registered session entry
struct RegistryEntry {
    session: SessionId,
    peer_addr: SocketAddr,
    mailbox: Arc<Mailbox>,
    cancel: CancellationToken,
    handler: Arc<dyn RelayHandler>,
    tasks: Vec<JoinHandle<()>>,
    created_at: Instant,
}

impl RegistryEntry {
    fn info(&self, identity: &ClientIdentity) -> SessionInfo {
        SessionInfo {
            identity: identity.clone(),
            session: self.session,
            peer_addr: self.peer_addr,
            created_at: self.created_at,
            pending: self.mailbox.len(),
        }
    }
}

/// Identity → session registry
pub struct Registry {
    entries: DashMap<ClientIdentity, RegistryEntry>,
    next_session: AtomicU64,
    closed: AtomicBool,
    config: SessionConfig,
    metrics: Arc<RelayMetrics>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(config: SessionConfig, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            entries: DashMap::new(),
            next_session: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
            metrics,
        }
    }

    /// Get the session settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the metrics shared with the server
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_session.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a handshaken connection under `identity`
    ///
    /// Creates the mailbox, inserts the entry and spawns the reception and
    /// transmission loops. If `identity` is already registered the new
    /// connection is told so and closed, and the existing session is left
    /// untouched. Once [`shutdown`](Self::shutdown) has started every
    /// registration fails with [`RelayError::ServerNotRunning`].
    pub async fn register(
        self: &Arc<Self>,
        identity: ClientIdentity,
        mut connection: Connection,
        handler: Arc<dyn RelayHandler>,
    ) -> Result<SessionId> {
        let session = self.next_session_id();
        let peer_addr = connection.peer_addr();
        let mailbox = Arc::new(Mailbox::new(
            identity.clone(),
            self.config.drain_order,
            self.config.mailbox_capacity,
        ));
        let cancel = CancellationToken::new();

        // The closed flag is read under the shard lock, so shutdown either
        // sees this entry or this call sees the flag.
        let inserted = match self.entries.entry(identity.clone()) {
            _ if self.closed.load(Ordering::SeqCst) => {
                debug!(peer_addr = %peer_addr, identity = %identity, "Registry closed");
                return Err(RelayError::ServerNotRunning);
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(RegistryEntry {
                    session,
                    peer_addr,
                    mailbox: mailbox.clone(),
                    cancel: cancel.clone(),
                    handler: handler.clone(),
                    tasks: Vec::new(),
                    created_at: Instant::now(),
                });
                self.metrics.session_opened();
                true
            }
        };

        if !inserted {
            self.metrics.identity_rejected();
            let err = RelayError::IdentityTaken(identity);
            warn!(peer_addr = %peer_addr, error = %err, "Rejecting registration");
            let _ = connection.write_line(&format!("ERR {}", err)).await;
            return Err(err);
        }

        handler.on_register(&identity, session, peer_addr).await;

        let (reader, writer) = connection.into_split();
        let reception = ReceptionLoop::new(
            identity.clone(),
            session,
            reader,
            self.clone(),
            cancel.clone(),
            handler,
        );
        let transmission =
            TransmissionLoop::new(identity.clone(), session, writer, mailbox, self.clone(), cancel);
        let tasks = vec![
            tokio::spawn(reception.run()),
            tokio::spawn(transmission.run()),
        ];

        // The session may already be gone if the peer hung up immediately
        if let Some(mut entry) = self.entries.get_mut(&identity)
            && entry.session == session
        {
            entry.tasks = tasks;
        }

        info!(
            identity = %identity,
            session = %session,
            peer_addr = %peer_addr,
            "Client registered"
        );

        Ok(session)
    }

    /// Append `payload` to `identity`'s mailbox
    pub fn deliver(&self, identity: &ClientIdentity, payload: impl Into<String>) -> Result<()> {
        let mailbox = self
            .entries
            .get(identity)
            .map(|entry| entry.mailbox.clone())
            .ok_or_else(|| RelayError::IdentityNotFound(identity.clone()))?;

        mailbox.append(payload).inspect_err(|e| {
            if matches!(e, RelayError::MailboxFull { .. }) {
                self.metrics.mailbox_overflow();
            }
        })
    }

    /// Remove `identity` and release its mailbox
    ///
    /// Both of its loops stop. Returns `false` if the identity was not
    /// registered.
    pub async fn deregister(&self, identity: &str) -> bool {
        match self.entries.remove(identity) {
            Some((identity, entry)) => {
                self.close_entry(identity, entry, DisconnectReason::Evicted)
                    .await;
                true
            }
            None => {
                debug!(identity = identity, "Deregister ignored unknown identity");
                false
            }
        }
    }

    /// Release `identity` only if it still belongs to `session`
    ///
    /// Used by the connection loops, which must never remove a newer
    /// registration of the same identity.
    pub(crate) async fn release(
        &self,
        identity: &ClientIdentity,
        session: SessionId,
        reason: DisconnectReason,
    ) -> bool {
        match self
            .entries
            .remove_if(identity, |_, entry| entry.session == session)
        {
            Some((identity, entry)) => {
                self.close_entry(identity, entry, reason).await;
                true
            }
            None => false,
        }
    }

    /// Check that `identity` is still registered as `session`
    pub(crate) fn is_current(&self, identity: &str, session: SessionId) -> bool {
        self.entries
            .get(identity)
            .is_some_and(|entry| entry.session == session)
    }

    async fn close_entry(
        &self,
        identity: ClientIdentity,
        entry: RegistryEntry,
        reason: DisconnectReason,
    ) {
        entry.cancel.cancel();
        self.metrics.session_closed(entry.created_at.elapsed());

        info!(
            identity = %identity,
            session = %entry.session,
            reason = %reason,
            dropped = entry.mailbox.len(),
            "Client released"
        );

        entry
            .handler
            .on_disconnect(&identity, entry.session, reason)
            .await;
    }

    /// Check if `identity` is registered
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Get the mailbox of `identity`
    pub fn mailbox(&self, identity: &str) -> Option<Arc<Mailbox>> {
        self.entries.get(identity).map(|entry| entry.mailbox.clone())
    }

    /// Number of payloads waiting for `identity`
    pub fn pending(&self, identity: &str) -> Option<usize> {
        self.entries.get(identity).map(|entry| entry.mailbox.len())
    }

    /// Get session info for `identity`
    pub fn session_info(&self, identity: &str) -> Option<SessionInfo> {
        self.entries
            .get(identity)
            .map(|entry| entry.info(entry.key()))
    }

    /// Get info for every registered session
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.entries
            .iter()
            .map(|entry| entry.value().info(entry.key()))
            .collect()
    }

    /// Get every registered identity
    pub fn identities(&self) -> Vec<ClientIdentity> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Check if [`shutdown`](Self::shutdown) has started
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get the number of registered sessions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no session is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every session and wait for its loops
    ///
    /// Loops still running after `timeout` are aborted. The registry stays
    /// closed afterwards.
    pub async fn shutdown(&self, timeout: Duration) {
        self.closed.store(true, Ordering::SeqCst);

        let mut tasks = Vec::new();
        for identity in self.identities() {
            if let Some((identity, mut entry)) = self.entries.remove(&identity) {
                tasks.append(&mut entry.tasks);
                self.close_entry(identity, entry, DisconnectReason::Shutdown)
                    .await;
            }
        }

        let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();
        if tokio::time::timeout(timeout, futures_util::future::join_all(tasks))
            .await
            .is_err()
        {
            warn!(
                remaining = aborts.iter().filter(|a| !a.is_finished()).count(),
                "Connection loops did not stop in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.len())
            .field("next_session", &self.next_session.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}
