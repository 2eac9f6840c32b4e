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

//! Lifecycle hooks for the relay

use crate::{ClientIdentity, DisconnectReason, SessionId};
use async_trait::async_trait;
use std::net::SocketAddr;

/// Relay lifecycle handler
///
/// Implement this trait to observe sessions as they come and go. All
/// methods have default implementations that do nothing; routing itself is
/// not affected by the handler.
///
/// # Example
///
/// ```no_run
/// use linerelay_service::{ClientIdentity, RelayHandler, SessionId};
/// use async_trait::async_trait;
/// use std::net::SocketAddr;
///
/// struct LoggingHandler;
///
/// #[async_trait]
/// impl RelayHandler for LoggingHandler {
///     async fn on_register(&self, identity: &ClientIdentity, session: SessionId, peer: SocketAddr) {
///         println!("{} joined from {} as {}", identity, peer, session);
///     }
/// }
/// ```
#[async_trait]
pub trait RelayHandler: Send + Sync + 'static {
    /// Called once a client has completed the handshake and been registered
    ///
    /// Runs before either connection loop starts.
    async fn on_register(&self, _identity: &ClientIdentity, _session: SessionId, _peer: SocketAddr) {}

    /// Called for every line read from a client, before routing
    async fn on_line(&self, _identity: &ClientIdentity, _line: &str) {}

    /// Called exactly once when a registered session is released
    async fn on_disconnect(
        &self,
        _identity: &ClientIdentity,
        _session: SessionId,
        _reason: DisconnectReason,
    ) {
    }
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl RelayHandler for NoopHandler {}
