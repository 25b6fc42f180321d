//! Property tests for queue overflow policies

use proptest::prelude::*;
use std::time::Duration;
use vislink_rs::queue::{DataInputQueue, EventQueue, QueueOptions};
use vislink_rs::types::RawBuffer;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The backlog never grows past its capacity and keeps the newest events
    #[test]
    fn prop_event_backlog_is_bounded(capacity in 1usize..32, events in 1usize..96) {
        let backlog = EventQueue::new(capacity);
        for i in 0..events {
            backlog.record(&format!("s{i}"));
        }
        prop_assert_eq!(backlog.len(), events.min(capacity));

        let taken = backlog
            .get_queue_events(&[], usize::MAX, Some(Duration::ZERO))
            .unwrap();
        let first = events.saturating_sub(capacity);
        let expected: Vec<String> = (first..events).map(|i| format!("s{i}")).collect();
        prop_assert_eq!(taken, expected);
    }

    /// Sends into a DropOldest input queue never block and count every eviction
    #[test]
    fn prop_drop_oldest_input_counts_evictions(capacity in 1usize..16, sends in 1usize..64) {
        let queue = DataInputQueue::new("cfg", QueueOptions::drop_oldest(capacity), 64);
        for i in 0..sends {
            queue.send(RawBuffer { data: vec![i as u8; 4] }).unwrap();
        }
        prop_assert_eq!(queue.len(), sends.min(capacity));
        prop_assert_eq!(queue.dropped_count(), sends.saturating_sub(capacity) as u64);
    }

    /// Blocking input queues hand the message back instead of dropping it
    #[test]
    fn prop_blocking_input_rejects_without_loss(capacity in 1usize..16, extra in 1usize..16) {
        let queue = DataInputQueue::new("cfg", QueueOptions::blocking(capacity), 64);
        for _ in 0..capacity {
            let returned = queue.try_send(RawBuffer { data: vec![0; 4] }).unwrap();
            prop_assert!(returned.is_none());
        }
        for _ in 0..extra {
            let returned = queue.try_send(RawBuffer { data: vec![1; 4] }).unwrap();
            prop_assert!(returned.is_some());
        }
        prop_assert_eq!(queue.len(), capacity);
        prop_assert_eq!(queue.dropped_count(), 0);
    }
}
