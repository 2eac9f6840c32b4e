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

//! Per-client outbound mailbox
//!
//! A mailbox buffers the lines waiting to be written to one client. Any
//! number of reception loops may append to it; exactly one transmission
//! loop drains it. Every append wakes the drainer through a [`Notify`], so
//! the transmission loop only falls back on its poll interval when nothing
//! arrives.

use crate::{ClientIdentity, RelayError, Result};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Order in which a mailbox hands out its pending payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainOrder {
    /// Most recently appended first (stack discipline)
    #[default]
    Lifo,
    /// Oldest first (queue discipline)
    Fifo,
}

impl FromStr for DrainOrder {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lifo" | "stack" => Ok(Self::Lifo),
            "fifo" | "queue" => Ok(Self::Fifo),
            other => Err(RelayError::InvalidConfig(format!(
                "unknown drain order '{}' (expected lifo or fifo)",
                other
            ))),
        }
    }
}

impl fmt::Display for DrainOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifo => write!(f, "lifo"),
            Self::Fifo => write!(f, "fifo"),
        }
    }
}

/// Ordered buffer of pending outbound payloads for one identity
pub struct Mailbox {
    identity: ClientIdentity,
    queue: Mutex<VecDeque<String>>,
    capacity: Option<usize>,
    order: DrainOrder,
    notify: Notify,
}

impl Mailbox {
    /// Create an empty mailbox
    ///
    /// `capacity` of `None` leaves the mailbox unbounded.
    pub fn new(identity: ClientIdentity, order: DrainOrder, capacity: Option<usize>) -> Self {
        Self {
            identity,
            queue: Mutex::new(VecDeque::new()),
            capacity,
            order,
            notify: Notify::new(),
        }
    }

    // The guard is only ever held for a single VecDeque operation, so a
    // poisoned lock still holds a consistent queue.
    fn queue(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the owning identity
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Get the configured drain order
    pub fn order(&self) -> DrainOrder {
        self.order
    }

    /// Get the configured capacity
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append a payload and wake the drainer
    ///
    /// Never blocks. Fails with [`RelayError::MailboxFull`] when the mailbox
    /// is at capacity; the payload is dropped in that case.
    pub fn append(&self, payload: impl Into<String>) -> Result<()> {
        {
            let mut queue = self.queue();
            if let Some(capacity) = self.capacity
                && queue.len() >= capacity
            {
                return Err(RelayError::MailboxFull {
                    identity: self.identity.clone(),
                    capacity,
                });
            }
            queue.push_back(payload.into());
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove one payload according to the drain order
    ///
    /// Returns `None` when the mailbox is empty.
    pub fn take_one(&self) -> Option<String> {
        let mut queue = self.queue();
        match self.order {
            DrainOrder::Lifo => queue.pop_back(),
            DrainOrder::Fifo => queue.pop_front(),
        }
    }

    /// Number of pending payloads
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Wait until a payload is appended
    ///
    /// An append that happened while nobody was waiting is remembered, so a
    /// drainer that checks [`take_one`](Self::take_one) and then waits cannot
    /// miss it.
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("identity", &self.identity)
            .field("order", &self.order)
            .field("capacity", &self.capacity)
            .field("pending", &self.len())
            .finish()
    }
}
