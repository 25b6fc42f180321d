//! Device session: runs a pipeline and exposes its host streams
//!
//! [`Device::open`] connects the transport, uploads the serialized pipeline
//! and creates one queue per declared stream:
//!
//! - XLinkOut `streamName` → [`DataOutputQueue`] (device → host)
//! - XLinkIn `streamName` → [`DataInputQueue`] (host → device)
//!
//! Every output queue records an event in the device's [`EventQueue`] when a
//! message arrives, so one thread can wait on several streams with
//! [`Device::get_queue_events`].
//!
//! # Usage
//!
//! ```ignore
//! let (link, handle) = MockLink::new();
//! let device = Device::open(pipeline, link, DeviceConfig::default())?;
//! let rgb = device.get_output_queue("rgb")?;
//! while let Ok(frame) = rgb.get() {
//!     println!("frame #{}", frame.sequence_num);
//! }
//! ```

pub mod registry;
mod worker;

pub use registry::QueueRegistry;

use crate::config::DeviceConfig;
use crate::error::{Result, VisLinkError};
use crate::pipeline::{GraphDescriptor, Pipeline, StreamDirection};
use crate::queue::{CallbackId, DataInputQueue, DataOutputQueue, EventQueue, QueueOptions};
use crate::transport::{DeviceInfo, Transport, TransportStats};
use crate::types::{ConnectionStatus, LinkStats};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use worker::{Demultiplexer, LinkContext, LinkState, Multiplexer};

/// An open device running a pipeline
pub struct Device {
    ctx: Arc<LinkContext>,
    pipeline: Pipeline,
    descriptor: GraphDescriptor,
    info: DeviceInfo,
    /// Event-recording callback registered on each output queue
    event_callbacks: Vec<(String, CallbackId)>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Device {
    /// Connect, upload `pipeline` and start streaming
    pub fn open(
        pipeline: Pipeline,
        transport: impl Transport + 'static,
        config: DeviceConfig,
    ) -> Result<Self> {
        Self::open_shared(pipeline, Arc::new(transport), config)
    }

    /// Like [`Device::open`] for a transport that is already shared
    pub fn open_shared(
        mut pipeline: Pipeline,
        transport: Arc<dyn Transport>,
        config: DeviceConfig,
    ) -> Result<Self> {
        config.validate()?;

        tracing::info!("Searching for {}", config.transport);
        let info = transport.connect(&config.transport, &config.boot, config.search_timeout())?;
        tracing::info!("Connected to {}", info);

        let descriptor = match Self::prepare(&pipeline, transport.as_ref(), &config) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                transport.disconnect();
                return Err(e);
            }
        };
        pipeline.freeze();

        let epoch = Instant::now();
        let (doorbell_tx, doorbell_rx) = crossbeam_channel::bounded(1);
        let events = Arc::new(EventQueue::new(config.event_queue_capacity));
        let mut registry = QueueRegistry::new();
        let mut event_callbacks = Vec::new();

        for stream in &descriptor.streams {
            match stream.direction {
                StreamDirection::DeviceToHost => {
                    let queue = registry
                        .insert_output(DataOutputQueue::new(&stream.name, config.default_queue));
                    let backlog = events.clone();
                    let id = queue.add_callback(move |name, _| backlog.record(name));
                    event_callbacks.push((stream.name.clone(), id));
                }
                StreamDirection::HostToDevice => {
                    registry.insert_input(
                        DataInputQueue::new(&stream.name, config.default_queue, stream.max_data_size)
                            .with_doorbell(doorbell_tx.clone(), epoch),
                    );
                }
            }
            tracing::debug!(
                "Stream '{}' ({:?}) opened with {}",
                stream.name,
                stream.direction,
                config.default_queue.policy
            );
        }

        let ctx = Arc::new(LinkContext {
            transport,
            registry,
            events,
            state: LinkState::default(),
            running: AtomicBool::new(true),
            poll: config.receive_poll(),
        });
        ctx.state.set_status(ConnectionStatus::Connected);

        let mut device = Self {
            ctx: ctx.clone(),
            pipeline,
            descriptor,
            info,
            event_callbacks,
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };

        let demux = Demultiplexer::new(ctx.clone());
        let mux = Multiplexer::new(ctx, doorbell_rx);
        let spawned = Self::spawn("vislink-demux", move || demux.run())
            .and_then(|demux| Ok((demux, Self::spawn("vislink-mux", move || mux.run())?)));
        match spawned {
            Ok((demux, mux)) => device.workers.get_mut().extend([demux, mux]),
            Err(e) => {
                device.close();
                return Err(e);
            }
        }

        tracing::info!(
            "Device {} running pipeline ({} outputs, {} inputs)",
            device.info.mxid,
            device.ctx.registry.output_names().len(),
            device.ctx.registry.input_names().len()
        );
        Ok(device)
    }

    /// Firmware check, serialization and upload on a connected transport
    fn prepare(
        pipeline: &Pipeline,
        transport: &dyn Transport,
        config: &DeviceConfig,
    ) -> Result<GraphDescriptor> {
        if let Some(expected) = &config.expected_firmware {
            let found = transport
                .firmware_version()
                .unwrap_or_else(|| "unknown".to_string());
            if &found != expected {
                return Err(VisLinkError::FirmwareMismatch {
                    expected: expected.clone(),
                    found,
                });
            }
        }

        let descriptor = pipeline.serialize()?;
        transport.upload_pipeline(&descriptor)?;
        tracing::debug!(
            "Uploaded pipeline descriptor ({} bytes, OpenVINO {})",
            descriptor.len(),
            descriptor.openvino_version
        );
        Ok(descriptor)
    }

    fn spawn<F>(name: &str, f: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(f)
            .map_err(|e| VisLinkError::from(e).with_context(format!("spawning {}", name)))
    }

    /// Devices visible through `transport`
    pub fn list_devices(transport: &dyn Transport) -> Vec<DeviceInfo> {
        transport.list_devices()
    }

    // ==================== Queues ====================

    /// Output queue for an XLinkOut stream
    pub fn get_output_queue(&self, name: &str) -> Result<Arc<DataOutputQueue>> {
        self.ctx.registry.output(name)
    }

    /// Output queue reconfigured with `options`
    pub fn get_output_queue_with(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<Arc<DataOutputQueue>> {
        options.validate()?;
        let queue = self.ctx.registry.output(name)?;
        queue.apply_options(options);
        Ok(queue)
    }

    /// Input queue for an XLinkIn stream
    pub fn get_input_queue(&self, name: &str) -> Result<Arc<DataInputQueue>> {
        self.ctx.registry.input(name)
    }

    /// Input queue reconfigured with `options`
    pub fn get_input_queue_with(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<Arc<DataInputQueue>> {
        options.validate()?;
        let queue = self.ctx.registry.input(name)?;
        queue.apply_options(options);
        Ok(queue)
    }

    pub fn output_queue_names(&self) -> Vec<String> {
        self.ctx.registry.output_names()
    }

    pub fn input_queue_names(&self) -> Vec<String> {
        self.ctx.registry.input_names()
    }

    // ==================== Events ====================

    /// Wait for messages on any of `names` (empty = all output queues).
    ///
    /// Returns up to `max_num_events` queue names, oldest first. An empty
    /// vec means the timeout elapsed; `timeout = None` waits forever.
    pub fn get_queue_events(
        &self,
        names: &[&str],
        max_num_events: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        self.ctx
            .events
            .get_queue_events(names, max_num_events, timeout)
    }

    pub fn get_queue_events_all(
        &self,
        max_num_events: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        self.get_queue_events(&[], max_num_events, timeout)
    }

    pub fn get_queue_events_for(
        &self,
        name: &str,
        max_num_events: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        self.get_queue_events(&[name], max_num_events, timeout)
    }

    /// Single event; `Ok(None)` on timeout
    pub fn get_queue_event(
        &self,
        names: &[&str],
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        self.ctx.events.get_queue_event(names, timeout)
    }

    pub fn get_queue_event_for(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        self.get_queue_event(&[name], timeout)
    }

    // ==================== State ====================

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn descriptor(&self) -> &GraphDescriptor {
        &self.descriptor
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn status(&self) -> ConnectionStatus {
        self.ctx.state.status()
    }

    /// Text of the transport error that stopped the session, if any
    pub fn last_error(&self) -> Option<String> {
        self.ctx.state.last_error()
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.ctx.transport.stats()
    }

    pub fn stats(&self) -> LinkStats {
        let state = &self.ctx.state;
        let registry = &self.ctx.registry;
        let dropped_messages = registry.outputs().map(|q| q.dropped_count()).sum::<u64>()
            + registry.inputs().map(|q| q.dropped_count()).sum::<u64>();

        LinkStats {
            messages_received: state.messages_received.load(Ordering::Relaxed),
            messages_sent: state.messages_sent.load(Ordering::Relaxed),
            bytes_received: state.bytes_received.load(Ordering::Relaxed),
            bytes_sent: state.bytes_sent.load(Ordering::Relaxed),
            dropped_messages,
            callback_failures: registry.outputs().map(|q| q.callback_failures()).sum(),
            unknown_stream_packets: state.unknown_stream_packets.load(Ordering::Relaxed),
            decode_errors: state.decode_errors.load(Ordering::Relaxed),
            dropped_events: self.ctx.events.dropped_count(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop streaming and release the device. Idempotent.
    ///
    /// Every blocked queue or event call returns `QueueClosed`. Messages
    /// already buffered stay readable through `try_get`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Closing device {}", self.info.mxid);

        self.ctx.running.store(false, Ordering::SeqCst);
        self.ctx.close_queues();

        for (name, id) in &self.event_callbacks {
            if let Some(queue) = self.ctx.registry.find_output(name) {
                queue.remove_callback(*id);
            }
        }

        let current = std::thread::current().id();
        for handle in self.workers.lock().drain(..) {
            // close() from a queue callback runs on the demultiplexer itself
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }

        self.ctx.transport.disconnect();
        if self.ctx.state.status() != ConnectionStatus::Error {
            self.ctx.state.set_status(ConnectionStatus::Disconnected);
        }
        tracing::info!("Device closed");
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("status", &self.status())
            .field("outputs", &self.output_queue_names())
            .field("inputs", &self.input_queue_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}
