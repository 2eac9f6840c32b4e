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

//! Reception loop
//!
//! Reads lines from one client and routes them into mailboxes. The loop is
//! where a peer hang-up or read failure is detected; it then releases the
//! session, which also stops the paired transmission loop.

use crate::{
    ClientIdentity, DisconnectReason, LineReader, Registry, RelayError, RelayHandler, Route,
    SessionId,
};
use std::sync::Arc;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-connection task moving inbound lines into mailboxes
pub struct ReceptionLoop {
    identity: ClientIdentity,
    session: SessionId,
    reader: LineReader,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    handler: Arc<dyn RelayHandler>,
}

impl ReceptionLoop {
    /// Create a reception loop for a registered session
    pub fn new(
        identity: ClientIdentity,
        session: SessionId,
        reader: LineReader,
        registry: Arc<Registry>,
        cancel: CancellationToken,
        handler: Arc<dyn RelayHandler>,
    ) -> Self {
        Self {
            identity,
            session,
            reader,
            registry,
            cancel,
            handler,
        }
    }

    /// Run until the peer closes, a read fails, or the session is released
    pub async fn run(mut self) {
        debug!(identity = %self.identity, session = %self.session, "Reception loop started");

        if let Some(reason) = self.receive().await {
            self.registry
                .release(&self.identity, self.session, reason)
                .await;
        }

        debug!(identity = %self.identity, session = %self.session, "Reception loop stopped");
    }

    /// Returns the disconnect reason, or `None` when cancelled from outside
    async fn receive(&mut self) -> Option<DisconnectReason> {
        loop {
            let result = select! {
                _ = self.cancel.cancelled() => return None,
                result = self.reader.read_line() => result,
            };

            match result {
                Ok(Some(line)) => self.dispatch(line).await,
                Ok(None) => return Some(DisconnectReason::PeerClosed),
                Err(e) => {
                    warn!(
                        identity = %self.identity,
                        session = %self.session,
                        error = %e,
                        "Read failed"
                    );
                    return Some(DisconnectReason::ReadError);
                }
            }
        }
    }

    async fn dispatch(&self, line: String) {
        self.registry.metrics().line_received();
        debug!(identity = %self.identity, line = %line, "Routing line");
        self.handler.on_line(&self.identity, &line).await;

        match self.registry.config().routing.route(&self.identity, &line) {
            Route::Deliver { target, payload } => match self.registry.deliver(&target, payload) {
                Ok(()) => {}
                Err(RelayError::IdentityNotFound(target)) => {
                    self.reply(format!("ERR unknown identity '{}'", target));
                }
                Err(e) => {
                    warn!(identity = %self.identity, target = %target, error = %e, "Line dropped");
                }
            },
            Route::Reply(notice) => self.reply(notice),
        }
    }

    fn reply(&self, notice: String) {
        if let Err(e) = self.registry.deliver(&self.identity, notice) {
            warn!(identity = %self.identity, error = %e, "Notice dropped");
        }
    }
}

impl std::fmt::Debug for ReceptionLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceptionLoop")
            .field("identity", &self.identity)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Connection, NoopHandler, RelayMetrics, SessionConfig};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    async fn create_test_reader() -> (LineReader, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (server, _) = listener.accept().await.unwrap();
        let client = client_task.await.unwrap();

        let (reader, _writer) = Connection::wrap(server, 64).unwrap().into_split();
        (reader, client)
    }

    fn spawn_loop(
        registry: &Arc<Registry>,
        reader: LineReader,
        cancel: &CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let reception = ReceptionLoop::new(
            "alice".parse().unwrap(),
            SessionId::new(1),
            reader,
            registry.clone(),
            cancel.clone(),
            Arc::new(NoopHandler),
        );
        tokio::spawn(reception.run())
    }

    fn test_registry() -> Arc<Registry> {
        Arc::new(Registry::new(
            SessionConfig::default(),
            Arc::new(RelayMetrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_peer_close_ends_loop() {
        let registry = test_registry();
        let (reader, client) = create_test_reader().await;
        let cancel = CancellationToken::new();
        let task = spawn_loop(&registry, reader, &cancel);

        drop(client);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_ends_loop() {
        let registry = test_registry();
        let (reader, _client) = create_test_reader().await;
        let cancel = CancellationToken::new();
        let task = spawn_loop(&registry, reader, &cancel);

        cancel.cancel();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_blank_lines_are_routed() {
        let registry = test_registry();
        let (reader, mut client) = create_test_reader().await;
        let cancel = CancellationToken::new();
        let task = spawn_loop(&registry, reader, &cancel);

        client.write_all(b"\n   \r\n").await.unwrap();
        drop(client);
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(registry.metrics().snapshot().lines_received, 2);
    }

    #[tokio::test]
    async fn test_overlong_line_is_read_error() {
        let registry = test_registry();
        let (reader, mut client) = create_test_reader().await;
        let cancel = CancellationToken::new();
        let task = spawn_loop(&registry, reader, &cancel);

        client.write_all(&[b'x'; 256]).await.unwrap();
        client.write_all(b"\n").await.unwrap();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
