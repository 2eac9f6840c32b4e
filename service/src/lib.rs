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

//! Line Relay Service
//!
//! A TCP line relay. Each client announces an identity on its first line,
//! after which every line it sends is routed into a per-identity mailbox and
//! drained back out to the owning client. By default a client's lines are
//! echoed to itself; the directed policy forwards `@target text` lines to
//! another client instead.
//!
//! # Architecture
//!
//! ```text
//! RelayServer (accept loop, handshake)
//!     ↓
//! Registry (identity → mailbox, cancellation)
//!     ↓
//! ReceptionLoop → Mailbox → TransmissionLoop
//! ```
//!
//! Both loops of a session share one cancellation token. Whichever loop
//! notices the connection is gone first releases the registry entry, and
//! the other loop stops without waiting for its next read or poll.
//!
//! # Example
//!
//! ```no_run
//! use linerelay_service::{RelayConfig, RelayServer, NoopHandler, RoutingPolicy};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::default().with_routing(RoutingPolicy::Directed);
//!     let server = RelayServer::new(config).await?;
//!     server.start(Arc::new(NoopHandler)).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod mailbox;
mod metrics;
mod reception;
mod registry;
mod routing;
mod server;
mod transmission;
mod types;

pub use config::{DEFAULT_PORT, DEFAULT_WELCOME_MESSAGE, RelayConfig};
pub use connection::{Connection, LineReader, LineWriter};
pub use error::{RelayError, Result};
pub use handler::{NoopHandler, RelayHandler};
pub use mailbox::{DrainOrder, Mailbox};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use reception::ReceptionLoop;
pub use registry::{Registry, SessionConfig};
pub use routing::{Route, RoutingPolicy};
pub use server::RelayServer;
pub use transmission::TransmissionLoop;
pub use types::{
    ClientIdentity, DEFAULT_MAX_IDENTITY_LENGTH, DisconnectReason, ServerSnapshot, SessionId,
    SessionInfo,
};
