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

//! Inbound line routing
//!
//! Decides which mailbox an inbound line lands in. [`RoutingPolicy::Echo`]
//! queues every line back to its sender; [`RoutingPolicy::Directed`] reads
//! an `@<identity> <message>` address and forwards to that client.

use crate::{ClientIdentity, RelayError, Result};
use std::fmt;
use std::str::FromStr;

/// How inbound lines are routed to mailboxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingPolicy {
    /// Queue every line to the sender's own mailbox
    #[default]
    Echo,
    /// Forward `@<identity> <message>` lines to the addressed client
    Directed,
}

/// Where a routed line goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Append `payload` to `target`'s mailbox
    Deliver {
        /// Receiving identity
        target: ClientIdentity,
        /// Line to queue
        payload: String,
    },
    /// Append a server notice to the sender's mailbox
    Reply(String),
}

impl RoutingPolicy {
    /// Route one inbound line from `sender`
    pub fn route(&self, sender: &ClientIdentity, line: &str) -> Route {
        match self {
            RoutingPolicy::Echo => Route::Deliver {
                target: sender.clone(),
                payload: line.to_string(),
            },
            RoutingPolicy::Directed => Self::route_directed(sender, line),
        }
    }

    fn route_directed(sender: &ClientIdentity, line: &str) -> Route {
        let addressed = line
            .strip_prefix('@')
            .and_then(|rest| rest.split_once(char::is_whitespace))
            .map(|(target, text)| (target, text.trim()))
            .filter(|(_, text)| !text.is_empty());

        let Some((target, text)) = addressed else {
            return Route::Reply("ERR expected '@<identity> <message>'".to_string());
        };

        match target.parse::<ClientIdentity>() {
            Ok(target) => Route::Deliver {
                target,
                payload: format!("{}: {}", sender, text),
            },
            Err(_) => Route::Reply(format!("ERR unknown identity '{}'", target)),
        }
    }
}

impl FromStr for RoutingPolicy {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Echo),
            "directed" | "relay" => Ok(Self::Directed),
            other => Err(RelayError::InvalidConfig(format!(
                "unknown routing policy '{}' (expected echo or directed)",
                other
            ))),
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => write!(f, "echo"),
            Self::Directed => write!(f, "directed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ClientIdentity {
        "alice".parse().unwrap()
    }

    #[test]
    fn test_echo_returns_line_to_sender() {
        let route = RoutingPolicy::Echo.route(&alice(), "hello");
        assert_eq!(
            route,
            Route::Deliver {
                target: alice(),
                payload: "hello".to_string(),
            }
        );
    }

    #[test]
    fn test_echo_keeps_addressed_lines_verbatim() {
        let route = RoutingPolicy::Echo.route(&alice(), "@bob hi");
        assert_eq!(
            route,
            Route::Deliver {
                target: alice(),
                payload: "@bob hi".to_string(),
            }
        );
    }

    #[test]
    fn test_directed_forwards_with_sender_prefix() {
        let route = RoutingPolicy::Directed.route(&alice(), "@bob  hi there ");
        assert_eq!(
            route,
            Route::Deliver {
                target: "bob".parse().unwrap(),
                payload: "alice: hi there".to_string(),
            }
        );
    }

    #[test]
    fn test_directed_rejects_unaddressed() {
        for line in ["hello", "@bob", "@bob   ", "@ hi"] {
            assert!(
                matches!(RoutingPolicy::Directed.route(&alice(), line), Route::Reply(_)),
                "line {:?} should be rejected",
                line
            );
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("echo".parse::<RoutingPolicy>().unwrap(), RoutingPolicy::Echo);
        assert_eq!(
            "Directed".parse::<RoutingPolicy>().unwrap(),
            RoutingPolicy::Directed
        );
        assert!("broadcast".parse::<RoutingPolicy>().is_err());
    }
}
