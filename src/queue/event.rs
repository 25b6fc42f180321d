//! Cross-queue event log
//!
//! Every message routed into an output queue appends one event naming that
//! queue. Application threads wait on any subset of queues with
//! [`EventQueue::get_queue_events`] instead of polling each queue.

use crate::error::{Result, VisLinkError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default backlog capacity
pub const EVENT_QUEUE_MAXIMUM_SIZE: usize = 2048;

/// A message arrived on `queue_name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    pub queue_name: String,
    pub occurred_at: Instant,
}

struct EventLog {
    events: VecDeque<QueueEvent>,
    closed: bool,
}

pub struct EventQueue {
    log: Mutex<EventLog>,
    cv: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_MAXIMUM_SIZE)
    }
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: Mutex::new(EventLog {
                events: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an event for `queue_name`, dropping the oldest when full
    pub fn record(&self, queue_name: &str) {
        let mut log = self.log.lock();
        if log.closed {
            return;
        }
        if log.events.len() >= self.capacity {
            log.events.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                tracing::warn!("Event queue full, {} events dropped so far", dropped);
            }
        }
        log.events.push_back(QueueEvent {
            queue_name: queue_name.to_string(),
            occurred_at: Instant::now(),
        });
        self.cv.notify_all();
    }

    /// Wait for events on any of `names` (empty = any queue).
    ///
    /// Returns up to `max_num_events` queue names, oldest first, removing only
    /// the returned entries. `timeout = None` waits forever; `Some(ZERO)`
    /// checks once. An empty vec means the timeout elapsed.
    pub fn get_queue_events(
        &self,
        names: &[&str],
        max_num_events: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        if max_num_events == 0 {
            return Ok(Vec::new());
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let matches = |event: &QueueEvent| names.is_empty() || names.contains(&event.queue_name.as_str());

        let mut log = self.log.lock();
        loop {
            let taken = Self::take_matching(&mut log.events, &matches, max_num_events);
            if !taken.is_empty() {
                return Ok(taken);
            }
            if log.closed {
                return Err(VisLinkError::QueueClosed("events".to_string()));
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(Vec::new());
                    }
                    self.cv.wait_until(&mut log, deadline);
                }
                None => self.cv.wait(&mut log),
            }
        }
    }

    /// Wait for a single event. `Ok(None)` on timeout.
    pub fn get_queue_event(
        &self,
        names: &[&str],
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        Ok(self
            .get_queue_events(names, 1, timeout)?
            .into_iter()
            .next())
    }

    fn take_matching<F>(events: &mut VecDeque<QueueEvent>, matches: &F, max: usize) -> Vec<String>
    where
        F: Fn(&QueueEvent) -> bool,
    {
        if !events.iter().any(matches) {
            return Vec::new();
        }
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(events.len());
        for event in events.drain(..) {
            if taken.len() < max && matches(&event) {
                taken.push(event.queue_name);
            } else {
                kept.push_back(event);
            }
        }
        *events = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.log.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().events.is_empty()
    }

    /// Events discarded because the backlog was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wake every waiter; later waits fail once the backlog has no match
    pub fn close(&self) {
        let mut log = self.log.lock();
        log.closed = true;
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let log = self.log.lock();
        f.debug_struct("EventQueue")
            .field("len", &log.events.len())
            .field("capacity", &self.capacity)
            .field("closed", &log.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_timeout_is_immediate() {
        let events = EventQueue::default();
        let start = Instant::now();
        let got = events
            .get_queue_events(&[], 10, Some(Duration::ZERO))
            .unwrap();
        assert!(got.is_empty());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_filters_by_name_and_keeps_others() {
        let events = EventQueue::default();
        events.record("rgb");
        events.record("depth");
        events.record("rgb");

        let got = events
            .get_queue_events(&["rgb"], 10, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(got, vec!["rgb", "rgb"]);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events.get_queue_event(&[], Some(Duration::ZERO)).unwrap(),
            Some("depth".to_string())
        );
    }

    #[test]
    fn test_max_num_events_limits_result() {
        let events = EventQueue::default();
        for name in ["a", "b", "c"] {
            events.record(name);
        }
        let got = events.get_queue_events(&[], 2, None).unwrap();
        assert_eq!(got, vec!["a", "b"]);
        assert!(events
            .get_queue_events(&[], 0, None)
            .unwrap()
            .is_empty());

        // The entry past the limit waits for the next call
        assert_eq!(events.len(), 1);
        let rest = events
            .get_queue_events(&[], 10, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(rest, vec!["c"]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_matching_entries_past_limit_stay_queued() {
        let events = EventQueue::default();
        for name in ["rgb", "depth", "rgb", "rgb"] {
            events.record(name);
        }
        let got = events
            .get_queue_events(&["rgb"], 2, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(got, vec!["rgb", "rgb"]);
        assert_eq!(events.len(), 2);
        let rest = events
            .get_queue_events(&["rgb", "depth"], 10, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(rest, vec!["depth", "rgb"]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let events = EventQueue::new(2);
        events.record("a");
        events.record("b");
        events.record("c");
        assert_eq!(events.dropped_count(), 1);
        let got = events
            .get_queue_events(&[], 10, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(got, vec!["b", "c"]);
    }

    #[test]
    fn test_waiter_wakes_on_record() {
        let events = Arc::new(EventQueue::default());
        let waiter = {
            let events = events.clone();
            thread::spawn(move || events.get_queue_event(&["nn"], Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        events.record("rgb");
        events.record("nn");
        assert_eq!(waiter.join().unwrap().unwrap(), Some("nn".to_string()));
    }

    #[test]
    fn test_close_wakes_waiter_with_error() {
        let events = Arc::new(EventQueue::default());
        let waiter = {
            let events = events.clone();
            thread::spawn(move || events.get_queue_events(&[], 1, None))
        };
        thread::sleep(Duration::from_millis(20));
        events.close();
        assert!(waiter.join().unwrap().unwrap_err().is_closed());
    }

    #[test]
    fn test_close_returns_remaining_events_first() {
        let events = EventQueue::default();
        events.record("rgb");
        events.close();
        assert_eq!(
            events.get_queue_event(&[], None).unwrap(),
            Some("rgb".to_string())
        );
        assert!(events.get_queue_event(&[], None).is_err());
    }
}
