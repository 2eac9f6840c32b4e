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

//! Error types for the line relay

use crate::types::ClientIdentity;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
///
/// Every error is scoped to a single connection or call; none of them
/// bring the process down.
#[derive(Debug, Error)]
pub enum RelayError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (line too long, or I/O below the codec)
    #[error("Codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// The peer closed the connection before sending its identity
    #[error("connection closed before identity handshake")]
    HandshakeClosed,

    /// The peer did not send its identity in time
    #[error("identity handshake timed out")]
    HandshakeTimeout,

    /// The identity line was rejected
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Another live connection already holds this identity
    #[error("identity '{0}' is already connected")]
    IdentityTaken(ClientIdentity),

    /// No live connection holds this identity
    #[error("identity '{0}' is not connected")]
    IdentityNotFound(ClientIdentity),

    /// The mailbox reached its capacity and dropped the payload
    #[error("mailbox for '{identity}' is full ({capacity} pending)")]
    MailboxFull {
        /// Owner of the mailbox
        identity: ClientIdentity,
        /// Configured capacity
        capacity: usize,
    },

    /// Connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Server is already running
    #[error("Server already running")]
    ServerAlreadyRunning,

    /// Maximum number of connections reached
    #[error("maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Check if the error ends the connection it occurred on
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RelayError::Io(_) | RelayError::Codec(_) | RelayError::ConnectionClosed
        )
    }

    /// Check if the error happened during the identity handshake
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            RelayError::HandshakeClosed
                | RelayError::HandshakeTimeout
                | RelayError::InvalidIdentity(_)
                | RelayError::IdentityTaken(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_connection_error() {
        assert!(RelayError::ConnectionClosed.is_connection_error());
        assert!(
            RelayError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
                .is_connection_error()
        );
        assert!(!RelayError::Timeout.is_connection_error());
        assert!(!RelayError::ServerNotRunning.is_connection_error());
    }

    #[test]
    fn test_error_is_handshake_error() {
        assert!(RelayError::HandshakeClosed.is_handshake_error());
        assert!(RelayError::HandshakeTimeout.is_handshake_error());
        assert!(RelayError::IdentityTaken("alice".parse().unwrap()).is_handshake_error());
        assert!(!RelayError::ConnectionClosed.is_handshake_error());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::IdentityTaken("alice".parse().unwrap());
        assert_eq!(err.to_string(), "identity 'alice' is already connected");

        let err = RelayError::MailboxFull {
            identity: "bob".parse().unwrap(),
            capacity: 4,
        };
        assert_eq!(err.to_string(), "mailbox for 'bob' is full (4 pending)");

        let err = RelayError::MaxConnectionsReached(1000);
        assert_eq!(err.to_string(), "maximum connections (1000) reached");
    }
}
