//! Bounded buffer shared by the input and output queues.

use super::{OverflowPolicy, QueueOptions, QueueState};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Instant;

pub(crate) enum PushOutcome<T> {
    Queued,
    /// Queued after evicting the returned oldest item
    Replaced(T),
    /// Still full when the deadline passed
    Full(T),
    Closed(T),
}

pub(crate) enum PopOutcome<T> {
    Item(T),
    TimedOut,
    Closed,
}

struct BufferState<T> {
    items: VecDeque<T>,
    max_size: usize,
    policy: OverflowPolicy,
    lifecycle: QueueState,
    /// Sequence number handed to the next item accepted by `push_stamped`
    next_sequence: u64,
}

pub(crate) struct BoundedBuffer<T> {
    state: Mutex<BufferState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedBuffer<T> {
    pub fn new(options: QueueOptions) -> Self {
        Self {
            state: Mutex::new(BufferState {
                items: VecDeque::with_capacity(options.max_size.min(1024)),
                max_size: options.max_size.max(1),
                policy: options.policy,
                lifecycle: QueueState::Open,
                next_sequence: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Append an item. `deadline = None` waits indefinitely under Blocking.
    pub fn push(&self, item: T, deadline: Option<Instant>) -> PushOutcome<T> {
        self.push_stamped(item, deadline, |_, _| {})
    }

    /// Like `push`, but `stamp` runs under the buffer lock just before the
    /// item is appended, with the next sequence number. Items therefore sit
    /// in the buffer in sequence order whatever the number of producers.
    pub fn push_stamped(
        &self,
        mut item: T,
        deadline: Option<Instant>,
        stamp: impl FnOnce(&mut T, u64),
    ) -> PushOutcome<T> {
        let mut st = self.state.lock();
        loop {
            if st.lifecycle != QueueState::Open {
                return PushOutcome::Closed(item);
            }
            let evict = if st.items.len() < st.max_size {
                false
            } else {
                match st.policy {
                    OverflowPolicy::DropOldest => true,
                    OverflowPolicy::Blocking => {
                        match deadline {
                            Some(deadline) => {
                                if Instant::now() >= deadline {
                                    return PushOutcome::Full(item);
                                }
                                self.not_full.wait_until(&mut st, deadline);
                            }
                            None => self.not_full.wait(&mut st),
                        }
                        continue;
                    }
                }
            };

            let evicted = if evict { st.items.pop_front() } else { None };
            stamp(&mut item, st.next_sequence);
            st.next_sequence += 1;
            st.items.push_back(item);
            self.not_empty.notify_one();
            return match evicted {
                Some(old) => PushOutcome::Replaced(old),
                None => PushOutcome::Queued,
            };
        }
    }

    /// Remove the oldest item. Fails with `Closed` as soon as the buffer closes.
    pub fn pop(&self, deadline: Option<Instant>) -> PopOutcome<T> {
        let mut st = self.state.lock();
        loop {
            if st.lifecycle != QueueState::Open {
                return PopOutcome::Closed;
            }
            if let Some(item) = st.items.pop_front() {
                self.not_full.notify_one();
                return PopOutcome::Item(item);
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return PopOutcome::TimedOut;
                    }
                    self.not_empty.wait_until(&mut st, deadline);
                }
                None => self.not_empty.wait(&mut st),
            }
        }
    }

    /// Remove the oldest item without waiting; works on closed buffers.
    pub fn try_pop(&self) -> Option<T> {
        let mut st = self.state.lock();
        let item = st.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Block until at least one item is present, then take everything.
    pub fn pop_all(&self, deadline: Option<Instant>) -> PopOutcome<Vec<T>> {
        let mut st = self.state.lock();
        loop {
            if st.lifecycle != QueueState::Open {
                return PopOutcome::Closed;
            }
            if !st.items.is_empty() {
                let items: Vec<T> = st.items.drain(..).collect();
                self.not_full.notify_all();
                return PopOutcome::Item(items);
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return PopOutcome::TimedOut;
                    }
                    self.not_empty.wait_until(&mut st, deadline);
                }
                None => self.not_empty.wait(&mut st),
            }
        }
    }

    pub fn drain(&self) -> Vec<T> {
        let mut st = self.state.lock();
        let items: Vec<T> = st.items.drain(..).collect();
        if !items.is_empty() {
            self.not_full.notify_all();
        }
        items
    }

    pub fn front(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state.lock().items.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn options(&self) -> QueueOptions {
        let st = self.state.lock();
        QueueOptions::new(st.max_size, st.policy)
    }

    /// Change capacity and policy. Returns items evicted to fit the new size.
    pub fn set_options(&self, options: QueueOptions) -> Vec<T> {
        let mut st = self.state.lock();
        st.max_size = options.max_size.max(1);
        st.policy = options.policy;

        let mut evicted = Vec::new();
        if st.policy == OverflowPolicy::DropOldest {
            while st.items.len() > st.max_size {
                if let Some(old) = st.items.pop_front() {
                    evicted.push(old);
                }
            }
        }
        // Growing capacity or switching to DropOldest can release blocked producers
        self.not_full.notify_all();
        evicted
    }

    pub fn state(&self) -> QueueState {
        self.state.lock().lifecycle
    }

    /// Close and wake every waiter. Buffered items stay reachable via `try_pop`.
    pub fn close(&self) -> bool {
        let mut st = self.state.lock();
        if st.lifecycle != QueueState::Open {
            return false;
        }
        st.lifecycle = QueueState::Closing;
        self.not_empty.notify_all();
        self.not_full.notify_all();
        st.lifecycle = QueueState::Closed;
        true
    }
}
