//! Transport trait for the host ↔ device link
//!
//! The transport is one duplex channel carrying packets tagged with a stream
//! name. Framing, USB/TCP discovery and firmware boot are the
//! implementation's business; the device layer only needs connect,
//! upload, receive and transmit.
//!
//! Methods take `&self` so the demultiplexer can block in `receive` while
//! the multiplexer calls `transmit` on the same transport.

#[cfg(feature = "mock-transport")]
pub mod mock;

#[cfg(feature = "mock-transport")]
pub use mock::{MockLink, MockLinkHandle};

use crate::config::{BootMode, TransportTarget};
use crate::error::Result;
use crate::pipeline::GraphDescriptor;
use std::collections::VecDeque;
use std::time::Duration;

/// Size of the rolling window for recent transmit times
const RECENT_WINDOW_SIZE: usize = 100;

/// One framed message on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream: String,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(stream: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            stream: stream.into(),
            payload,
        }
    }
}

/// Physical link used to reach a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkProtocol {
    #[default]
    Usb,
    Tcp,
}

/// Boot state of a discovered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Unbooted,
    Booted,
    Bootloader,
}

/// Information about a detected device (for listing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Unique MX id
    pub mxid: String,
    /// USB port path or IP address
    pub name: String,
    pub state: DeviceState,
    pub protocol: LinkProtocol,
}

impl DeviceInfo {
    pub fn new(mxid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mxid: mxid.into(),
            name: name.into(),
            state: DeviceState::Unbooted,
            protocol: LinkProtocol::Usb,
        }
    }

    /// Mark the device as reached over `protocol`, e.g. a PoE device by IP
    pub fn with_protocol(mut self, protocol: LinkProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn display_name(&self) -> String {
        format!("{} [{}] ({:?}, {:?})", self.mxid, self.name, self.protocol, self.state)
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Statistics for transport operations
#[derive(Debug, Clone)]
pub struct TransportStats {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub failed_transmits: u64,
    /// Total transmit time in microseconds
    pub total_transmit_time_us: u64,
    pub min_transmit_time_us: u64,
    pub max_transmit_time_us: u64,
    /// Rolling window of recent transmit times for jitter calculation
    pub recent_transmit_times: VecDeque<u64>,
}

impl Default for TransportStats {
    fn default() -> Self {
        Self {
            packets_received: 0,
            packets_sent: 0,
            bytes_received: 0,
            bytes_sent: 0,
            failed_transmits: 0,
            total_transmit_time_us: 0,
            min_transmit_time_us: u64::MAX,
            max_transmit_time_us: 0,
            recent_transmit_times: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl TransportStats {
    pub fn record_receive(&mut self, bytes: u64) {
        self.packets_received += 1;
        self.bytes_received += bytes;
    }

    /// Record a successful transmit with latency tracking
    pub fn record_transmit(&mut self, time_us: u64, bytes: u64) {
        self.packets_sent += 1;
        self.bytes_sent += bytes;
        self.total_transmit_time_us += time_us;
        self.min_transmit_time_us = self.min_transmit_time_us.min(time_us);
        self.max_transmit_time_us = self.max_transmit_time_us.max(time_us);

        self.recent_transmit_times.push_back(time_us);
        if self.recent_transmit_times.len() > RECENT_WINDOW_SIZE {
            self.recent_transmit_times.pop_front();
        }
    }

    pub fn record_failure(&mut self) {
        self.failed_transmits += 1;
    }

    pub fn avg_transmit_time_us(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.total_transmit_time_us as f64 / self.packets_sent as f64
        }
    }

    /// Success rate as percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.packets_sent + self.failed_transmits;
        if total == 0 {
            100.0
        } else {
            (self.packets_sent as f64 / total as f64) * 100.0
        }
    }

    /// Max - min over the recent window in microseconds
    pub fn jitter_us(&self) -> u64 {
        let min = self.recent_transmit_times.iter().min().copied().unwrap_or(0);
        let max = self.recent_transmit_times.iter().max().copied().unwrap_or(0);
        max.saturating_sub(min)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Duplex, stream-multiplexed link to a device.
///
/// Implementations must be `Send + Sync`: the device layer shares one
/// transport between its demultiplexer and multiplexer threads.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Devices currently reachable
    fn list_devices(&self) -> Vec<DeviceInfo>;

    /// Find a device matching `target`, boot it and open the link
    fn connect(
        &self,
        target: &TransportTarget,
        boot: &BootMode,
        timeout: Duration,
    ) -> Result<DeviceInfo>;

    /// Close the link. Idempotent.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Firmware version reported by the connected device
    fn firmware_version(&self) -> Option<String>;

    /// Send the serialized pipeline and start it
    fn upload_pipeline(&self, descriptor: &GraphDescriptor) -> Result<()>;

    /// Next packet from the device; `Ok(None)` if none arrived within `timeout`
    fn receive(&self, timeout: Duration) -> Result<Option<Packet>>;

    /// Write one packet to the device
    fn transmit(&self, packet: Packet) -> Result<()>;

    /// Snapshot of the transport statistics
    fn stats(&self) -> TransportStats;
}
