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

//! Lock-free metrics for the relay
//!
//! Every recording method updates a local atomic counter (readable through
//! [`RelayMetrics::snapshot`]) and forwards the same event to the `metrics`
//! facade so an installed exporter sees it too.

use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free relay metrics
#[derive(Debug)]
pub struct RelayMetrics {
    // Sessions
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    closed_sessions: AtomicU64,

    // Traffic
    lines_received: AtomicU64,
    lines_sent: AtomicU64,

    // Failures
    handshake_failures: AtomicU64,
    rejected_identities: AtomicU64,
    rejected_connections: AtomicU64,
    mailbox_overflows: AtomicU64,
    write_failures: AtomicU64,

    // Timing (stored as nanoseconds)
    total_session_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            closed_sessions: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            lines_sent: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            rejected_identities: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            mailbox_overflows: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            total_session_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Session tracking

    /// Record a session being registered
    pub fn session_opened(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.sessions.total").increment(1);
        gauge!("linerelay.sessions.active").increment(1.0);
    }

    /// Record a session being released
    pub fn session_closed(&self, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.closed_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_session_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        gauge!("linerelay.sessions.active").decrement(1.0);
        histogram!("linerelay.session.duration").record(duration.as_secs_f64());
    }

    /// Get the number of registered sessions
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since server start
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    // Traffic tracking

    /// Record a line read from a client
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.lines.received").increment(1);
    }

    /// Record a line written to a client
    pub fn line_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.lines.sent").increment(1);
    }

    // Failure tracking

    /// Record a connection that never completed its handshake
    pub fn handshake_failed(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.handshake.failures").increment(1);
    }

    /// Record a registration refused because the identity was taken
    pub fn identity_rejected(&self) {
        self.rejected_identities.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.identity.rejected").increment(1);
    }

    /// Record a connection refused because the server was full
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.connections.rejected").increment(1);
    }

    /// Record a payload dropped by a full mailbox
    pub fn mailbox_overflow(&self) {
        self.mailbox_overflows.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.mailbox.overflow").increment(1);
    }

    /// Record a failed or timed out write
    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        counter!("linerelay.errors.write").increment(1);
    }

    // Snapshot

    /// Get a point-in-time view of all metrics
    ///
    /// Counters are read individually, so a snapshot taken while sessions
    /// are changing may be off by one between related fields.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            rejected_identities: self.rejected_identities.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            mailbox_overflows: self.mailbox_overflows.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let closed = self.closed_sessions.load(Ordering::Relaxed);
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of relay metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total sessions since server start
    pub total_sessions: u64,
    /// Currently registered sessions
    pub active_sessions: u64,
    /// Lines read from clients
    pub lines_received: u64,
    /// Lines written to clients
    pub lines_sent: u64,
    /// Connections that never registered
    pub handshake_failures: u64,
    /// Registrations refused for a taken identity
    pub rejected_identities: u64,
    /// Connections refused at the connection limit
    pub rejected_connections: u64,
    /// Payloads dropped by full mailboxes
    pub mailbox_overflows: u64,
    /// Failed or timed out writes
    pub write_failures: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average duration of closed sessions
    pub avg_session_duration: Duration,
}

impl MetricsSnapshot {
    /// Lines written per second of uptime
    pub fn lines_sent_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.lines_sent as f64 / self.uptime.as_secs_f64()
    }

    /// Lines read per second of uptime
    pub fn lines_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.lines_received as f64 / self.uptime.as_secs_f64()
    }

    /// Sum of all failure counters
    pub fn total_errors(&self) -> u64 {
        self.handshake_failures
            + self.rejected_identities
            + self.rejected_connections
            + self.mailbox_overflows
            + self.write_failures
    }
}
