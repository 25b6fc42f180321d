//! Host-side stream queues.
//!
//! Each stream declared by an `XLinkOut`/`XLinkIn` node gets one bounded
//! queue on the host:
//!
//! ```text
//! transport ──► [demultiplexer] ──► DataOutputQueue ──► get() / callbacks
//!                      │
//!                      └──► EventQueue ──► get_queue_events()
//!
//! send() ──► DataInputQueue ──► [multiplexer] ──► transport
//! ```
//!
//! # Overflow policy
//!
//! - **Blocking**: a full queue blocks the producer until space frees or the
//!   queue closes (backpressure).
//! - **DropOldest**: a full queue evicts its oldest message, so it always
//!   holds the `max_size` most recent ones.
//!
//! Every queue has its own lock; the event backlog has one more. No lock is
//! shared between unrelated streams.

mod bounded;
pub mod event;
pub mod input;
pub mod output;

pub use event::{EventQueue, QueueEvent, EVENT_QUEUE_MAXIMUM_SIZE};
pub use input::DataInputQueue;
pub use output::{CallbackId, DataOutputQueue};

use crate::error::{Result, VisLinkError};
use serde::{Deserialize, Serialize};

/// Default number of messages a host queue holds
pub const DEFAULT_QUEUE_SIZE: usize = 16;

/// Behavior of a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverflowPolicy {
    /// Producer waits for space
    #[default]
    Blocking,
    /// Oldest message is evicted
    DropOldest,
}

impl OverflowPolicy {
    pub fn from_blocking(blocking: bool) -> Self {
        if blocking {
            OverflowPolicy::Blocking
        } else {
            OverflowPolicy::DropOldest
        }
    }

    pub fn is_blocking(self) -> bool {
        self == OverflowPolicy::Blocking
    }
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::Blocking => write!(f, "Blocking"),
            OverflowPolicy::DropOldest => write!(f, "DropOldest"),
        }
    }
}

/// Capacity and overflow policy of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    pub max_size: usize,
    pub policy: OverflowPolicy,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_QUEUE_SIZE,
            policy: OverflowPolicy::Blocking,
        }
    }
}

impl QueueOptions {
    pub fn new(max_size: usize, policy: OverflowPolicy) -> Self {
        Self { max_size, policy }
    }

    pub fn blocking(max_size: usize) -> Self {
        Self::new(max_size, OverflowPolicy::Blocking)
    }

    pub fn drop_oldest(max_size: usize) -> Self {
        Self::new(max_size, OverflowPolicy::DropOldest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(VisLinkError::Config(
                "Queue max_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Open,
    /// Waking waiters; no new messages accepted
    Closing,
    Closed,
}
