//! Device → host stream queue

use super::bounded::{BoundedBuffer, PopOutcome, PushOutcome};
use super::{QueueOptions, QueueState};
use crate::error::{Result, VisLinkError};
use crate::types::{Message, MessageKind};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle returned by [`DataOutputQueue::add_callback`]
pub type CallbackId = u64;

/// Callback invoked with the stream name and each message pushed into the queue
pub type QueueCallback = Arc<dyn Fn(&str, &Arc<Message>) + Send + Sync>;

/// Bounded queue of messages arriving from one device stream.
///
/// The demultiplexer is the only producer. Consumers call [`get`](Self::get)
/// and friends from any thread; callbacks run on the demultiplexer thread.
pub struct DataOutputQueue {
    name: String,
    buffer: BoundedBuffer<Arc<Message>>,
    callbacks: Mutex<Vec<(CallbackId, QueueCallback)>>,
    next_callback_id: AtomicU64,
    dropped: AtomicU64,
    callback_failures: AtomicU64,
}

impl DataOutputQueue {
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Self {
        Self {
            name: name.into(),
            buffer: BoundedBuffer::new(options),
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a message and run callbacks. Only the demultiplexer feeds
    /// device streams.
    ///
    /// Blocks while the queue is full under the Blocking policy. Returns
    /// `QueueClosed` if the queue closes first.
    pub(crate) fn push(&self, message: Message) -> Result<()> {
        let message = Arc::new(message);
        match self.buffer.push(message.clone(), None) {
            PushOutcome::Queued => {}
            PushOutcome::Replaced(evicted) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "Queue '{}' full, dropped message #{}",
                    self.name,
                    evicted.sequence_num
                );
            }
            PushOutcome::Full(_) | PushOutcome::Closed(_) => {
                return Err(VisLinkError::QueueClosed(self.name.clone()));
            }
        }
        self.run_callbacks(&message);
        Ok(())
    }

    fn run_callbacks(&self, message: &Arc<Message>) {
        // Snapshot so callbacks may add/remove callbacks without deadlocking
        let callbacks: Vec<QueueCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            let result = catch_unwind(AssertUnwindSafe(|| callback(&self.name, message)));
            if result.is_err() {
                self.callback_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Callback on queue '{}' panicked for message #{}",
                    self.name,
                    message.sequence_num
                );
            }
        }
    }

    /// Block until a message is available
    pub fn get(&self) -> Result<Arc<Message>> {
        match self.buffer.pop(None) {
            PopOutcome::Item(msg) => Ok(msg),
            PopOutcome::Closed | PopOutcome::TimedOut => {
                Err(VisLinkError::QueueClosed(self.name.clone()))
            }
        }
    }

    /// Wait up to `timeout` for a message. `Ok(None)` on timeout.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<Arc<Message>>> {
        match self.buffer.pop(Some(Instant::now() + timeout)) {
            PopOutcome::Item(msg) => Ok(Some(msg)),
            PopOutcome::TimedOut => Ok(None),
            PopOutcome::Closed => Err(VisLinkError::QueueClosed(self.name.clone())),
        }
    }

    pub fn try_get(&self) -> Option<Arc<Message>> {
        self.buffer.try_pop()
    }

    /// Block until at least one message is present, then take all of them
    pub fn get_all(&self) -> Result<Vec<Arc<Message>>> {
        match self.buffer.pop_all(None) {
            PopOutcome::Item(msgs) => Ok(msgs),
            PopOutcome::Closed | PopOutcome::TimedOut => {
                Err(VisLinkError::QueueClosed(self.name.clone()))
            }
        }
    }

    pub fn try_get_all(&self) -> Vec<Arc<Message>> {
        self.buffer.drain()
    }

    /// Peek at the oldest message without removing it
    pub fn front(&self) -> Option<Arc<Message>> {
        self.buffer.front()
    }

    pub fn has(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Block for the next message and extract its payload as `T`
    pub fn get_as<T: MessageKind + Clone>(&self) -> Result<T> {
        let msg = self.get()?;
        self.unwrap_as(msg)
    }

    /// Non-blocking [`get_as`](Self::get_as)
    pub fn try_get_as<T: MessageKind + Clone>(&self) -> Result<Option<T>> {
        match self.try_get() {
            Some(msg) => self.unwrap_as(msg).map(Some),
            None => Ok(None),
        }
    }

    fn unwrap_as<T: MessageKind + Clone>(&self, msg: Arc<Message>) -> Result<T> {
        if T::from_payload_ref(&msg.payload).is_none() {
            return Err(VisLinkError::WrongMessageType {
                stream: self.name.clone(),
                expected: T::DATATYPE,
                actual: msg.datatype(),
            });
        }
        let payload = match Arc::try_unwrap(msg) {
            Ok(owned) => owned.payload,
            Err(shared) => shared.payload.clone(),
        };
        T::from_payload(payload).map_err(|payload| VisLinkError::WrongMessageType {
            stream: self.name.clone(),
            expected: T::DATATYPE,
            actual: payload.datatype(),
        })
    }

    /// Register a callback for every future message
    pub fn add_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&str, &Arc<Message>) + Send + Sync + 'static,
    {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(cb_id, _)| *cb_id != id);
        callbacks.len() != before
    }

    pub fn max_size(&self) -> usize {
        self.buffer.options().max_size
    }

    pub fn set_max_size(&self, max_size: usize) {
        let options = QueueOptions::new(max_size, self.buffer.options().policy);
        self.apply_options(options);
    }

    pub fn is_blocking(&self) -> bool {
        self.buffer.options().policy.is_blocking()
    }

    pub fn set_blocking(&self, blocking: bool) {
        let options = QueueOptions::new(
            self.buffer.options().max_size,
            super::OverflowPolicy::from_blocking(blocking),
        );
        self.apply_options(options);
    }

    pub fn options(&self) -> QueueOptions {
        self.buffer.options()
    }

    pub(crate) fn apply_options(&self, options: QueueOptions) {
        let evicted = self.buffer.set_options(options);
        if !evicted.is_empty() {
            self.dropped
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }
    }

    /// Messages evicted under the DropOldest policy
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    /// Close the queue and wake every blocked consumer and producer
    pub fn close(&self) {
        if self.buffer.close() {
            tracing::debug!("Output queue '{}' closed", self.name);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.buffer.state() != QueueState::Open
    }
}

impl std::fmt::Debug for DataOutputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataOutputQueue")
            .field("name", &self.name)
            .field("options", &self.buffer.options())
            .field("len", &self.buffer.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrameType, ImgDetections, ImgFrame};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn frame(seq: u64) -> Message {
        Message::new(ImgFrame::new(4, 4, FrameType::Gray8)).with_sequence_num(seq)
    }

    #[test]
    fn test_get_returns_in_order() {
        let queue = DataOutputQueue::new("rgb", QueueOptions::blocking(4));
        queue.push(frame(1)).unwrap();
        queue.push(frame(2)).unwrap();
        assert_eq!(queue.get().unwrap().sequence_num, 1);
        assert_eq!(queue.get().unwrap().sequence_num, 2);
        assert!(queue.try_get().is_none());
    }

    #[test]
    fn test_get_timeout_on_empty_is_not_an_error() {
        let queue = DataOutputQueue::new("rgb", QueueOptions::default());
        assert!(queue
            .get_timeout(Duration::from_millis(10))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_as_wrong_type() {
        let queue = DataOutputQueue::new("nn", QueueOptions::default());
        queue.push(frame(0)).unwrap();
        let err = queue.get_as::<ImgDetections>().unwrap_err();
        assert!(matches!(err, VisLinkError::WrongMessageType { .. }));
    }

    #[test]
    fn test_get_as_extracts_payload() {
        let queue = DataOutputQueue::new("rgb", QueueOptions::default());
        queue.push(frame(0)).unwrap();
        let img: ImgFrame = queue.get_as().unwrap();
        assert_eq!(img.width, 4);
    }

    #[test]
    fn test_callbacks_and_removal() {
        let queue = DataOutputQueue::new("rgb", QueueOptions::drop_oldest(2));
        let hits = Arc::new(AtomicUsize::new(0));
        let id = {
            let hits = hits.clone();
            queue.add_callback(move |name, _| {
                assert_eq!(name, "rgb");
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        queue.push(frame(0)).unwrap();
        assert!(queue.remove_callback(id));
        assert!(!queue.remove_callback(id));
        queue.push(frame(1)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_delivery() {
        let queue = DataOutputQueue::new("rgb", QueueOptions::default());
        queue.add_callback(|_, _| panic!("boom"));
        queue.push(frame(0)).unwrap();
        queue.push(frame(1)).unwrap();
        assert_eq!(queue.callback_failures(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_close_unblocks_get_and_keeps_buffer() {
        let queue = Arc::new(DataOutputQueue::new("rgb", QueueOptions::default()));
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.get())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(waiter.join().unwrap().unwrap_err().is_closed());
        assert!(queue.push(frame(0)).is_err());
        assert!(queue.is_closed());
    }

    #[test]
    fn test_shrinking_counts_dropped() {
        let queue = DataOutputQueue::new("rgb", QueueOptions::drop_oldest(4));
        for i in 0..4 {
            queue.push(frame(i)).unwrap();
        }
        queue.set_max_size(1);
        assert_eq!(queue.dropped_count(), 3);
        assert_eq!(queue.front().unwrap().sequence_num, 3);
        assert!(!queue.is_blocking());
    }

    #[test]
    fn test_blocking_producer_waits_for_consumer() {
        let queue = Arc::new(DataOutputQueue::new("q", QueueOptions::blocking(2)));
        queue.push(frame(0)).unwrap();
        queue.push(frame(1)).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(frame(2)))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().unwrap().sequence_num, 0);
        producer.join().unwrap().unwrap();
        assert_eq!(queue.get().unwrap().sequence_num, 1);
        assert_eq!(queue.get().unwrap().sequence_num, 2);
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let queue = Arc::new(DataOutputQueue::new("q", QueueOptions::blocking(1)));
        queue.push(frame(0)).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(frame(1)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(producer.join().unwrap().unwrap_err().is_closed());
        assert_eq!(queue.try_get().unwrap().sequence_num, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// N + K pushes into a DropOldest queue of size N keep the N newest
        #[test]
        fn prop_drop_oldest_keeps_newest(capacity in 1usize..16, extra in 1usize..32) {
            let queue = DataOutputQueue::new("q", QueueOptions::drop_oldest(capacity));
            let total = capacity + extra;
            for seq in 0..total as u64 {
                queue.push(frame(seq)).unwrap();
            }

            let kept: Vec<u64> = queue.try_get_all().iter().map(|m| m.sequence_num).collect();
            let expected: Vec<u64> = (extra as u64..total as u64).collect();
            prop_assert_eq!(kept, expected);
            prop_assert_eq!(queue.dropped_count(), extra as u64);
        }

        /// A Blocking producer stalls on a full queue and loses nothing
        #[test]
        fn prop_blocking_loses_nothing(capacity in 1usize..8, extra in 1usize..8) {
            let queue = Arc::new(DataOutputQueue::new("q", QueueOptions::blocking(capacity)));
            let total = (capacity + extra) as u64;

            let producer = {
                let queue = queue.clone();
                thread::spawn(move || {
                    for seq in 0..total {
                        queue.push(frame(seq)).unwrap();
                    }
                })
            };

            let mut received = Vec::new();
            while received.len() < total as usize {
                received.push(queue.get().unwrap().sequence_num);
            }
            producer.join().unwrap();

            prop_assert_eq!(received, (0..total).collect::<Vec<_>>());
            prop_assert_eq!(queue.dropped_count(), 0);
        }
    }
}
