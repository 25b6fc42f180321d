//! Host → device stream queue

use super::bounded::{BoundedBuffer, PushOutcome};
use super::{OverflowPolicy, QueueOptions, QueueState};
use crate::error::{Result, VisLinkError};
use crate::types::Message;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Bounded queue of messages waiting to be written to one device stream.
///
/// `send` stamps the stream name, a per-stream sequence number and a
/// timestamp. Numbers are assigned as messages enter the buffer, so
/// concurrent senders still leave the queue in sequence order. The
/// multiplexer is the only consumer.
pub struct DataInputQueue {
    name: String,
    buffer: BoundedBuffer<Message>,
    max_data_size: usize,
    epoch: Instant,
    dropped: AtomicU64,
    /// Wakes the multiplexer when a message is queued. Capacity one: a
    /// pending ring already covers every queue.
    doorbell: Option<Sender<()>>,
}

impl DataInputQueue {
    pub fn new(name: impl Into<String>, options: QueueOptions, max_data_size: usize) -> Self {
        Self {
            name: name.into(),
            buffer: BoundedBuffer::new(options),
            max_data_size,
            epoch: Instant::now(),
            dropped: AtomicU64::new(0),
            doorbell: None,
        }
    }

    pub(crate) fn with_doorbell(mut self, doorbell: Sender<()>, epoch: Instant) -> Self {
        self.doorbell = Some(doorbell);
        self.epoch = epoch;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_data_size(&self) -> usize {
        self.max_data_size
    }

    /// Returns the message back if it did not fit before the deadline
    fn enqueue(&self, message: Message, deadline: Option<Instant>) -> Result<Option<Message>> {
        let size = message.payload.data_len();
        if size > self.max_data_size {
            return Err(VisLinkError::MessageTooLarge {
                stream: self.name.clone(),
                size,
                max: self.max_data_size,
            });
        }

        let mut message = message;
        message.stream = self.name.clone();
        let outcome = self.buffer.push_stamped(message, deadline, |message, seq| {
            message.sequence_num = seq;
            message.timestamp = self.epoch.elapsed();
        });
        match outcome {
            PushOutcome::Queued => {}
            PushOutcome::Replaced(evicted) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "Input queue '{}' full, dropped unsent message #{}",
                    self.name,
                    evicted.sequence_num
                );
            }
            PushOutcome::Full(message) => return Ok(Some(message)),
            PushOutcome::Closed(_) => return Err(VisLinkError::QueueClosed(self.name.clone())),
        }
        self.ring();
        Ok(None)
    }

    fn ring(&self) {
        if let Some(doorbell) = &self.doorbell {
            // Full: a wake-up is already pending. Disconnected: the device is closing.
            let _ = doorbell.try_send(());
        }
    }

    /// Queue a message for the device, waiting for room under the Blocking policy
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        match self.enqueue(message.into(), None)? {
            None => Ok(()),
            Some(_) => Err(VisLinkError::QueueClosed(self.name.clone())),
        }
    }

    /// Queue without waiting. A full Blocking queue hands the message back.
    pub fn try_send(&self, message: impl Into<Message>) -> Result<Option<Message>> {
        self.enqueue(message.into(), Some(Instant::now()))
    }

    /// Wait up to `timeout` for room. The message comes back on timeout.
    pub fn send_timeout(
        &self,
        message: impl Into<Message>,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        self.enqueue(message.into(), Some(Instant::now() + timeout))
    }

    pub(crate) fn try_pop(&self) -> Option<Message> {
        self.buffer.try_pop()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.buffer.options().max_size
    }

    pub fn set_max_size(&self, max_size: usize) {
        let policy = self.buffer.options().policy;
        self.apply_options(QueueOptions::new(max_size, policy));
    }

    pub fn is_blocking(&self) -> bool {
        self.buffer.options().policy.is_blocking()
    }

    pub fn set_blocking(&self, blocking: bool) {
        let max_size = self.buffer.options().max_size;
        self.apply_options(QueueOptions::new(
            max_size,
            OverflowPolicy::from_blocking(blocking),
        ));
    }

    pub fn options(&self) -> QueueOptions {
        self.buffer.options()
    }

    pub(crate) fn apply_options(&self, options: QueueOptions) {
        let evicted = self.buffer.set_options(options);
        self.dropped
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        if self.buffer.close() {
            tracing::debug!("Input queue '{}' closed", self.name);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.state() != QueueState::Open
    }
}

impl std::fmt::Debug for DataInputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataInputQueue")
            .field("name", &self.name)
            .field("options", &self.buffer.options())
            .field("max_data_size", &self.max_data_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
