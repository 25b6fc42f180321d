//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
#[cfg(feature = "mock-transport")]
pub mod mock_helpers;

use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Upper bound for anything that should happen "promptly" on a loaded CI box
pub fn settle_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Poll `condition` until it holds or [`settle_timeout`] elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + settle_timeout();
    while !condition() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}
