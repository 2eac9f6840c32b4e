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


//! Command line arguments

use clap::Parser;
use linerelay_service::{
    DEFAULT_WELCOME_MESSAGE, DrainOrder, RelayConfig, RelayError, RoutingPolicy,
};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Identity-addressed TCP line relay", long_about = None)]
pub struct Cli {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, env = "LINERELAY_BIND", default_value = "127.0.0.1:8686")]
    pub bind: SocketAddr,

    /// Maximum number of registered clients
    #[arg(long, env = "LINERELAY_MAX_CONNECTIONS", default_value_t = 1000)]
    pub max_connections: usize,

    /// Upper bound in milliseconds on how long an idle mailbox waits
    #[arg(long, env = "LINERELAY_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Maximum pending lines per client; 0 means unbounded
    #[arg(long, env = "LINERELAY_MAILBOX_CAPACITY", default_value_t = 1024)]
    pub mailbox_capacity: usize,

    /// Mailbox drain order (lifo or fifo)
    #[arg(long, env = "LINERELAY_DRAIN_ORDER", default_value = "lifo")]
    pub drain_order: DrainOrder,

    /// Routing policy (echo or directed)
    #[arg(long, env = "LINERELAY_ROUTING", default_value = "echo")]
    pub routing: RoutingPolicy,

    /// Line sent to every client before the identity handshake
    #[arg(long, env = "LINERELAY_WELCOME", default_value = DEFAULT_WELCOME_MESSAGE)]
    pub welcome: String,

    /// Seconds a client has to send its identity
    #[arg(long, env = "LINERELAY_HANDSHAKE_TIMEOUT_SECS", default_value_t = 30)]
    pub handshake_timeout_secs: u64,

    /// Tracing filter directive; falls back to RUST_LOG, then "info"
    #[arg(long, env = "LINERELAY_LOG_FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    /// Build and validate the relay configuration
    pub fn relay_config(&self) -> Result<RelayConfig, RelayError> {
        let capacity = (self.mailbox_capacity > 0).then_some(self.mailbox_capacity);
        let config = RelayConfig::new(self.bind)
            .with_max_connections(self.max_connections)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_mailbox_capacity(capacity)
            .with_drain_order(self.drain_order)
            .with_routing(self.routing)
            .with_welcome_message(self.welcome.clone())
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout_secs));
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["linerelay-server"]).unwrap();
        let config = cli.relay_config().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8686".parse().unwrap());
        assert_eq!(config.mailbox_capacity, Some(1024));
        assert_eq!(config.drain_order, DrainOrder::Lifo);
        assert_eq!(config.routing, RoutingPolicy::Echo);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "linerelay-server",
            "--bind",
            "0.0.0.0:9000",
            "--drain-order",
            "fifo",
            "--routing",
            "directed",
            "--mailbox-capacity",
            "0",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();
        let config = cli.relay_config().unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.drain_order, DrainOrder::Fifo);
        assert_eq!(config.routing, RoutingPolicy::Directed);
        assert_eq!(config.mailbox_capacity, None);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Cli::try_parse_from(["linerelay-server", "--drain-order", "random"]).is_err());

        let cli = Cli::try_parse_from(["linerelay-server", "--poll-interval-ms", "0"]).unwrap();
        assert!(matches!(
            cli.relay_config(),
            Err(RelayError::InvalidConfig(_))
        ));
    }
}
