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

//! Core types for the line relay

use crate::{RelayError, Result};
use std::borrow::Borrow;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Default upper bound on the length of a client identity, in bytes
pub const DEFAULT_MAX_IDENTITY_LENGTH: usize = 64;

/// Identity a client announces on the first line of its connection
///
/// Identities are trimmed, non-empty, and contain neither whitespace nor `@`
/// so they can be used as the address of a directed line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Parse an identity from a raw handshake line
    pub fn parse(raw: &str, max_length: usize) -> Result<Self> {
        let identity = raw.trim();
        if identity.is_empty() {
            return Err(RelayError::InvalidIdentity(
                "identity must not be empty".to_string(),
            ));
        }
        if identity.len() > max_length {
            return Err(RelayError::InvalidIdentity(format!(
                "identity exceeds {} bytes",
                max_length
            )));
        }
        if identity.chars().any(|c| c.is_whitespace() || c == '@') {
            return Err(RelayError::InvalidIdentity(
                "identity must not contain whitespace or '@'".to_string(),
            ));
        }
        Ok(Self(identity.to_string()))
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClientIdentity {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, DEFAULT_MAX_IDENTITY_LENGTH)
    }
}

impl Borrow<str> for ClientIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClientIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one registration (monotonically increasing, never reused)
///
/// Two successive connections using the same identity receive different
/// session ids, which keeps a late-finishing loop of the first connection
/// from tearing down the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed its side of the connection
    PeerClosed,
    /// Reading from the peer failed
    ReadError,
    /// Writing to the peer failed or timed out
    WriteError,
    /// The entry was removed through [`Registry::deregister`](crate::Registry::deregister)
    Evicted,
    /// The server is shutting down
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::ReadError => write!(f, "read error"),
            Self::WriteError => write!(f, "write error"),
            Self::Evicted => write!(f, "evicted"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Session information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Registered identity
    pub identity: ClientIdentity,
    /// Session ID
    pub session: SessionId,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the session was registered
    pub created_at: Instant,
    /// Payloads waiting in the mailbox
    pub pending: usize,
}

impl SessionInfo {
    /// Get the session duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of registered sessions
    pub active_sessions: usize,
    /// Total sessions since server start
    pub total_sessions: u64,
    /// Server bind address
    pub bind_address: SocketAddr,
    /// Server uptime
    pub uptime: Duration,
    /// Server start time
    pub started_at: Instant,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RelayServer {{ active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.active_sessions, self.total_sessions, self.bind_address, self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_trims_line_endings() {
        let identity = ClientIdentity::parse("  alice\r\n", 64).unwrap();
        assert_eq!(identity.as_str(), "alice");
        assert_eq!(identity.to_string(), "alice");
    }

    #[test]
    fn test_identity_rejects_invalid() {
        assert!(matches!(
            ClientIdentity::parse("", 64),
            Err(RelayError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ClientIdentity::parse("   ", 64),
            Err(RelayError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ClientIdentity::parse("alice smith", 64),
            Err(RelayError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ClientIdentity::parse("@bob", 64),
            Err(RelayError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ClientIdentity::parse("abcdef", 5),
            Err(RelayError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_identity_from_str() {
        let identity: ClientIdentity = "bob".parse().unwrap();
        let borrowed: &str = identity.borrow();
        assert_eq!(borrowed, "bob");
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new(7);
        assert_eq!(id.as_u64(), 7);
        assert_eq!(id.to_string(), "session-7");
        assert!(SessionId::new(1) < SessionId::new(2));
    }
}
