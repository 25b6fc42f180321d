//! In-memory transport for testing
//!
//! [`MockLink`] plays the device side of the link with crossbeam channels.
//! The paired [`MockLinkHandle`] is what a test (or the demo binary) uses to
//! act as the device:
//!
//! - deliver messages on an output stream
//! - read what the host transmitted
//! - inspect the uploaded pipeline
//! - inject a transport failure
//!
//! # Example
//!
//! ```ignore
//! use vislink_rs::transport::MockLink;
//!
//! let (link, handle) = MockLink::new();
//! let device = Device::open(pipeline, link, DeviceConfig::default())?;
//!
//! handle.deliver("rgb", &Message::new(frame))?;
//! let msg = device.get_output_queue("rgb")?.get()?;
//! ```
//!
//! # Enabling
//!
//! Available with the `mock-transport` feature (on by default).

use super::{DeviceInfo, DeviceState, Packet, Transport, TransportStats};
use crate::config::{BootMode, TransportTarget};
use crate::error::{Result, VisLinkError};
use crate::pipeline::{GraphDescriptor, PipelineSchema};
use crate::types::Message;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Firmware version reported by default
pub const MOCK_FIRMWARE_VERSION: &str = "mock-1.0.0";

/// State shared by the link and its handle
#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    failure: Mutex<Option<String>>,
    uploaded: Mutex<Option<Vec<u8>>>,
    stats: Mutex<TransportStats>,
    connected_device: Mutex<Option<DeviceInfo>>,
}

/// Simulated device link
pub struct MockLink {
    devices: Vec<DeviceInfo>,
    firmware_version: String,
    to_host_rx: Receiver<Packet>,
    to_device_tx: Sender<Packet>,
    shared: Arc<Shared>,
}

/// Device-side controls of a [`MockLink`]
#[derive(Clone)]
pub struct MockLinkHandle {
    to_host_tx: Sender<Packet>,
    to_device_rx: Receiver<Packet>,
    shared: Arc<Shared>,
}

impl MockLink {
    /// Create a link with one unbooted device attached
    pub fn new() -> (Self, MockLinkHandle) {
        let (to_host_tx, to_host_rx) = unbounded();
        let (to_device_tx, to_device_rx) = unbounded();
        let shared = Arc::new(Shared::default());

        let link = Self {
            devices: vec![DeviceInfo::new("MOCK00000000000001", "mock:0")],
            firmware_version: MOCK_FIRMWARE_VERSION.to_string(),
            to_host_rx,
            to_device_tx,
            shared: shared.clone(),
        };
        let handle = MockLinkHandle {
            to_host_tx,
            to_device_rx,
            shared,
        };
        (link, handle)
    }

    /// Replace the simulated device list
    pub fn with_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = version.into();
        self
    }

    fn check_link(&self) -> Result<()> {
        if let Some(reason) = self.shared.failure.lock().clone() {
            return Err(VisLinkError::Transport(reason));
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(VisLinkError::Transport("Not connected".to_string()));
        }
        Ok(())
    }
}

impl Transport for MockLink {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn connect(
        &self,
        target: &TransportTarget,
        boot: &BootMode,
        _timeout: Duration,
    ) -> Result<DeviceInfo> {
        let mut device = self
            .devices
            .iter()
            .find(|d| target.matches(&d.mxid, &d.name))
            .cloned()
            .ok_or_else(|| VisLinkError::DeviceNotFound(target.to_string()))?;

        device.state = DeviceState::Booted;
        tracing::info!("Mock device {} booted ({:?})", device.mxid, boot);

        *self.shared.connected_device.lock() = Some(device.clone());
        *self.shared.failure.lock() = None;
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(device)
    }

    fn disconnect(&self) {
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            *self.shared.connected_device.lock() = None;
            tracing::info!("Mock device disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn firmware_version(&self) -> Option<String> {
        if self.is_connected() {
            Some(self.firmware_version.clone())
        } else {
            None
        }
    }

    fn upload_pipeline(&self, descriptor: &GraphDescriptor) -> Result<()> {
        self.check_link()?;
        // Reject bytes the device loader could not parse
        descriptor.schema()?;
        *self.shared.uploaded.lock() = Some(descriptor.bytes.clone());
        tracing::debug!("Mock device accepted pipeline ({} bytes)", descriptor.len());
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Packet>> {
        self.check_link()?;
        match self.to_host_rx.recv_timeout(timeout) {
            Ok(packet) => {
                self.shared
                    .stats
                    .lock()
                    .record_receive(packet.payload.len() as u64);
                Ok(Some(packet))
            }
            Err(RecvTimeoutError::Timeout) => {
                // A failure injected while waiting takes effect now
                self.check_link()?;
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(VisLinkError::Transport(
                "Device side of the link was dropped".to_string(),
            )),
        }
    }

    fn transmit(&self, packet: Packet) -> Result<()> {
        if let Err(e) = self.check_link() {
            self.shared.stats.lock().record_failure();
            return Err(e);
        }
        let start = Instant::now();
        let bytes = packet.payload.len() as u64;
        self.to_device_tx.send(packet).map_err(|_| {
            self.shared.stats.lock().record_failure();
            VisLinkError::Transport("Device side of the link was dropped".to_string())
        })?;
        self.shared
            .stats
            .lock()
            .record_transmit(start.elapsed().as_micros() as u64, bytes);
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.shared.stats.lock().clone()
    }
}

impl MockLinkHandle {
    /// Send a message to the host on `stream`
    pub fn deliver(&self, stream: &str, message: &Message) -> Result<()> {
        let payload = message.encode()?;
        self.deliver_raw(stream, payload)
    }

    /// Send raw bytes to the host on `stream`
    pub fn deliver_raw(&self, stream: &str, payload: Vec<u8>) -> Result<()> {
        self.to_host_tx
            .send(Packet::new(stream, payload))
            .map_err(|_| VisLinkError::Transport("Host side of the link was dropped".to_string()))
    }

    /// Next packet the host transmitted
    pub fn recv_packet(&self, timeout: Duration) -> Option<Packet> {
        self.to_device_rx.recv_timeout(timeout).ok()
    }

    /// Next message the host transmitted, decoded
    pub fn recv_transmitted(&self, timeout: Duration) -> Option<Message> {
        let packet = self.recv_packet(timeout)?;
        match Message::decode(&packet.stream, &packet.payload) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("Mock device could not decode host packet: {}", e);
                None
            }
        }
    }

    /// Raw descriptor bytes of the last uploaded pipeline
    pub fn uploaded_bytes(&self) -> Option<Vec<u8>> {
        self.shared.uploaded.lock().clone()
    }

    /// Last uploaded pipeline, parsed
    pub fn uploaded_descriptor(&self) -> Option<PipelineSchema> {
        let bytes = self.uploaded_bytes()?;
        GraphDescriptor::parse(&bytes).ok()
    }

    /// Make every subsequent transport call fail with `reason`
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!("Mock link failure injected: {}", reason);
        *self.shared.failure.lock() = Some(reason);
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Device the host connected to, if any
    pub fn connected_device(&self) -> Option<DeviceInfo> {
        self.shared.connected_device.lock().clone()
    }
}
