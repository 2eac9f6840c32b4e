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

//! Line-oriented client connection
//!
//! A [`Connection`] owns both directions of one accepted socket, framed with
//! a [`LinesCodec`]. It is used whole for the identity handshake and then
//! split so the reception loop owns the [`LineReader`] and the transmission
//! loop owns the [`LineWriter`].

use crate::{ClientIdentity, RelayError, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, instrument, trace};

/// A freshly accepted client connection
pub struct Connection {
    reader: LineReader,
    writer: LineWriter,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Wrap a TCP stream into a Connection
    ///
    /// Lines longer than `max_line_length` bytes fail the read that sees them.
    #[instrument(skip(socket))]
    pub fn wrap(socket: TcpStream, max_line_length: usize) -> Result<Self> {
        let peer_addr = socket.peer_addr()?;
        info!(peer_addr = %peer_addr, "Wrapping new relay connection");

        let (read_half, write_half) = socket.into_split();
        Ok(Self {
            reader: LineReader {
                inner: FramedRead::new(
                    read_half,
                    LinesCodec::new_with_max_length(max_line_length),
                ),
                peer_addr,
            },
            writer: LineWriter {
                inner: FramedWrite::new(write_half, LinesCodec::new()),
                peer_addr,
            },
            peer_addr,
        })
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one line; `None` at end of stream
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.reader.read_line().await
    }

    /// Write one line and flush it
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_line(line).await
    }

    /// Perform the identity handshake
    ///
    /// Writes `welcome`, then reads exactly one line and parses it as the
    /// client identity. Fails if the peer closes first, the read errors, the
    /// line does not arrive within `handshake_timeout`, or the identity is
    /// invalid.
    #[instrument(skip(self, welcome), fields(peer_addr = %self.peer_addr))]
    pub async fn handshake(
        &mut self,
        welcome: &str,
        handshake_timeout: Duration,
        max_identity_length: usize,
    ) -> Result<ClientIdentity> {
        self.write_line(welcome).await?;

        let line = match timeout(handshake_timeout, self.read_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => return Err(RelayError::HandshakeClosed),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(RelayError::HandshakeTimeout),
        };

        let identity = ClientIdentity::parse(&line, max_identity_length)?;
        debug!(identity = %identity, "Identity handshake complete");
        Ok(identity)
    }

    /// Split into independently owned read and write halves
    pub fn into_split(self) -> (LineReader, LineWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// Read half of a connection
pub struct LineReader {
    inner: FramedRead<OwnedReadHalf, LinesCodec>,
    peer_addr: SocketAddr,
}

impl LineReader {
    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one line; `None` at end of stream
    ///
    /// Cancel safe: dropping the future loses no buffered input.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        match self.inner.next().await {
            Some(Ok(line)) => {
                trace!(peer_addr = %self.peer_addr, bytes = line.len(), "Line received");
                Ok(Some(line))
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                debug!(peer_addr = %self.peer_addr, "Connection stream ended");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

/// Write half of a connection
///
/// Dropping the writer shuts down the write side of the socket.
pub struct LineWriter {
    inner: FramedWrite<OwnedWriteHalf, LinesCodec>,
    peer_addr: SocketAddr,
}

impl LineWriter {
    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Write one line and flush it
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner.send(line).await?;
        trace!(peer_addr = %self.peer_addr, bytes = line.len(), "Line sent");
        Ok(())
    }
}

impl std::fmt::Debug for LineWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineWriter")
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn create_test_connection() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (server, _) = listener.accept().await.unwrap();
        let client = client_task.await.unwrap();

        (Connection::wrap(server, 64).unwrap(), client)
    }

    #[tokio::test]
    async fn test_handshake_reads_identity() {
        let (mut connection, client) = create_test_connection().await;
        let (read, mut write) = client.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"alice\r\n").await.unwrap();
        let identity = connection
            .handshake("Welcome", Duration::from_secs(1), 16)
            .await
            .unwrap();

        assert_eq!(identity.as_str(), "alice");
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("Welcome"));
    }

    #[tokio::test]
    async fn test_handshake_peer_closed() {
        let (mut connection, client) = create_test_connection().await;
        drop(client);

        let result = connection
            .handshake("Welcome", Duration::from_secs(1), 16)
            .await;
        // Depending on timing the welcome write may already see the reset
        match result {
            Err(RelayError::HandshakeClosed) => {}
            Err(e) => assert!(e.is_connection_error(), "unexpected error: {}", e),
            Ok(identity) => panic!("unexpected identity {}", identity),
        }
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (mut connection, _client) = create_test_connection().await;

        let result = connection
            .handshake("Welcome", Duration::from_millis(50), 16)
            .await;
        assert!(matches!(result, Err(RelayError::HandshakeTimeout)));
    }

    #[tokio::test]
    async fn test_handshake_empty_identity() {
        let (mut connection, mut client) = create_test_connection().await;
        client.write_all(b"\n").await.unwrap();

        let result = connection
            .handshake("Welcome", Duration::from_secs(1), 16)
            .await;
        assert!(matches!(result, Err(RelayError::InvalidIdentity(_))));
    }

    #[tokio::test]
    async fn test_line_too_long_is_an_error() {
        let (connection, mut client) = create_test_connection().await;
        let (mut reader, _writer) = connection.into_split();

        client.write_all(&[b'x'; 200]).await.unwrap();
        client.write_all(b"\n").await.unwrap();

        assert!(matches!(
            reader.read_line().await,
            Err(RelayError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_split_halves_carry_lines() {
        let (connection, client) = create_test_connection().await;
        let peer = connection.peer_addr();
        let (mut reader, mut writer) = connection.into_split();
        assert_eq!(reader.peer_addr(), peer);
        assert_eq!(writer.peer_addr(), peer);

        let (read, mut write) = client.into_split();
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"ping\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("ping"));

        writer.write_line("pong").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("pong"));

        drop(write);
        assert_eq!(reader.read_line().await.unwrap(), None);
    }
}
