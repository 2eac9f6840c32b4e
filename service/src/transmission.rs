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

//! Transmission loop
//!
//! Drains one client's mailbox to its socket. While the mailbox is empty
//! the loop waits for whichever comes first:
//! - an append to the mailbox
//! - cancellation of the session
//! - the poll interval, after which it re-checks the registry entry
//!
//! A failed or timed out write ends the session like a read failure would.

use crate::{ClientIdentity, DisconnectReason, LineWriter, Mailbox, Registry, SessionId};
use std::sync::Arc;
use tokio::select;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Per-connection task moving mailbox payloads onto the socket
pub struct TransmissionLoop {
    identity: ClientIdentity,
    session: SessionId,
    writer: LineWriter,
    mailbox: Arc<Mailbox>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
}

impl TransmissionLoop {
    /// Create a transmission loop for a registered session
    pub fn new(
        identity: ClientIdentity,
        session: SessionId,
        writer: LineWriter,
        mailbox: Arc<Mailbox>,
        registry: Arc<Registry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            session,
            writer,
            mailbox,
            registry,
            cancel,
        }
    }

    /// Run until the session is released or a write fails
    pub async fn run(mut self) {
        debug!(identity = %self.identity, session = %self.session, "Transmission loop started");

        if let Some(reason) = self.transmit().await {
            self.registry
                .release(&self.identity, self.session, reason)
                .await;
        }

        debug!(identity = %self.identity, session = %self.session, "Transmission loop stopped");
    }

    /// Returns the disconnect reason, or `None` once the entry is gone
    async fn transmit(&mut self) -> Option<DisconnectReason> {
        let poll_interval = self.registry.config().poll_interval;
        let write_timeout = self.registry.config().write_timeout;

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let Some(payload) = self.mailbox.take_one() else {
                select! {
                    _ = self.cancel.cancelled() => return None,
                    _ = self.mailbox.notified() => {}
                    _ = sleep(poll_interval) => {
                        if !self.registry.is_current(self.identity.as_str(), self.session) {
                            return None;
                        }
                    }
                }
                continue;
            };

            match timeout(write_timeout, self.writer.write_line(&payload)).await {
                Ok(Ok(())) => {
                    self.registry.metrics().line_sent();
                    trace!(identity = %self.identity, "Payload delivered");
                }
                Ok(Err(e)) => {
                    self.registry.metrics().write_failed();
                    warn!(identity = %self.identity, session = %self.session, error = %e, "Write failed");
                    return Some(DisconnectReason::WriteError);
                }
                Err(_) => {
                    self.registry.metrics().write_failed();
                    warn!(identity = %self.identity, session = %self.session, "Write timed out");
                    return Some(DisconnectReason::WriteError);
                }
            }
        }
    }
}

impl std::fmt::Debug for TransmissionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionLoop")
            .field("identity", &self.identity)
            .field("session", &self.session)
            .field("pending", &self.mailbox.len())
            .finish()
    }
}
