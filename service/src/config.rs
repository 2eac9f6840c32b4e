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

//! Relay configuration
//!
//! # Example
//!
//! ```
//! use linerelay_service::{DrainOrder, RelayConfig, RoutingPolicy};
//! use std::time::Duration;
//!
//! let config = RelayConfig::new("127.0.0.1:0".parse().unwrap())
//!     .with_poll_interval(Duration::from_millis(250))
//!     .with_drain_order(DrainOrder::Fifo)
//!     .with_routing(RoutingPolicy::Directed);
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::types::DEFAULT_MAX_IDENTITY_LENGTH;
use crate::{DrainOrder, RelayError, Result, RoutingPolicy};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the relay listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 8686;

/// Line sent to every client before the identity handshake
pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to the chat room";

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrently registered clients
    pub max_connections: usize,

    /// First line written to every new connection
    pub welcome_message: String,

    /// How long a new connection may take to send its identity
    pub handshake_timeout: Duration,

    /// Upper bound on how long an idle transmission loop sleeps before
    /// re-checking its mailbox and registry entry
    pub poll_interval: Duration,

    /// Timeout for writing one line to a client
    pub write_timeout: Duration,

    /// How long shutdown waits for connection loops before aborting them
    pub shutdown_timeout: Duration,

    /// Maximum pending payloads per mailbox (`None` for unbounded)
    pub mailbox_capacity: Option<usize>,

    /// Order in which mailboxes are drained
    pub drain_order: DrainOrder,

    /// How inbound lines are routed
    pub routing: RoutingPolicy,

    /// Longest accepted line, in bytes; longer lines end the connection
    pub max_line_length: usize,

    /// Longest accepted identity, in bytes
    pub max_identity_length: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_connections: 1000,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            handshake_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            write_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            mailbox_capacity: Some(1024),
            drain_order: DrainOrder::Lifo,
            routing: RoutingPolicy::Echo,
            max_line_length: 8192,
            max_identity_length: DEFAULT_MAX_IDENTITY_LENGTH,
        }
    }
}

impl RelayConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent clients
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the welcome line
    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = message.into();
        self
    }

    /// Set the identity handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the transmission poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the mailbox capacity
    pub fn with_mailbox_capacity(mut self, capacity: Option<usize>) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Set the mailbox drain order
    pub fn with_drain_order(mut self, order: DrainOrder) -> Self {
        self.drain_order = order;
        self
    }

    /// Set the routing policy
    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Set the maximum line length
    pub fn with_max_line_length(mut self, length: usize) -> Self {
        self.max_line_length = length;
        self
    }

    /// Set the maximum identity length
    pub fn with_max_identity_length(mut self, length: usize) -> Self {
        self.max_identity_length = length;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        fn invalid(reason: &str) -> Result<()> {
            Err(RelayError::InvalidConfig(reason.to_string()))
        }

        if self.max_connections == 0 {
            return invalid("max_connections must be greater than 0");
        }
        if self.welcome_message.contains(['\n', '\r']) {
            return invalid("welcome_message must be a single line");
        }
        if self.handshake_timeout.is_zero() {
            return invalid("handshake_timeout must be greater than 0");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be greater than 0");
        }
        if self.write_timeout.is_zero() {
            return invalid("write_timeout must be greater than 0");
        }
        if self.shutdown_timeout.is_zero() {
            return invalid("shutdown_timeout must be greater than 0");
        }
        if self.mailbox_capacity == Some(0) {
            return invalid("mailbox_capacity must be greater than 0");
        }
        if self.max_identity_length == 0 {
            return invalid("max_identity_length must be greater than 0");
        }
        if self.max_line_length < self.max_identity_length {
            return invalid("max_line_length must be at least max_identity_length");
        }

        Ok(())
    }
}
