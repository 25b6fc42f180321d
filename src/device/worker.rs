//! Demultiplexer and multiplexer threads
//!
//! Two loops run for the lifetime of an open device:
//!
//! - **Demultiplexer**: receives packets from the transport, decodes them and
//!   pushes each into the output queue named by its stream. Under the
//!   Blocking policy a full queue stalls this thread, which is the
//!   backpressure the device sees.
//! - **Multiplexer**: waits on the doorbell rung by input queues, then
//!   drains every input queue round-robin and transmits the encoded
//!   messages. The doorbell holds at most one pending ring.
//!
//! Both loops poll `running` between transport calls. A transport error in
//! either loop stops both and closes every queue so blocked callers wake up
//! with `QueueClosed`.

use super::registry::QueueRegistry;
use crate::error::VisLinkError;
use crate::queue::{DataInputQueue, EventQueue};
use crate::transport::{Packet, Transport};
use crate::types::{ConnectionStatus, Message};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connection status and counters shared by the workers and the device
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    status: Mutex<ConnectionStatus>,
    last_error: Mutex<Option<String>>,
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub unknown_stream_packets: AtomicU64,
    pub decode_errors: AtomicU64,
}

impl LinkState {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock() = status;
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record_error(&self, error: String) {
        *self.last_error.lock() = Some(error);
        self.set_status(ConnectionStatus::Error);
    }
}

/// Everything the worker threads share with the `Device`
pub(crate) struct LinkContext {
    pub transport: Arc<dyn Transport>,
    pub registry: QueueRegistry,
    pub events: Arc<EventQueue>,
    pub state: LinkState,
    pub running: AtomicBool,
    pub poll: Duration,
}

impl LinkContext {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Close every host-facing queue and the event backlog
    pub fn close_queues(&self) {
        self.registry.close_all();
        self.events.close();
    }

    /// Stop both workers after a transport failure
    fn fail(&self, error: &VisLinkError) {
        // A failure raced with close() is just the transport going away
        if !self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!("Transport error after shutdown ignored: {}", error);
            return;
        }
        tracing::error!("Transport failure, closing all queues: {}", error);
        self.state.record_error(error.to_string());
        self.close_queues();
    }
}

/// Device → host routing loop
pub(crate) struct Demultiplexer {
    ctx: Arc<LinkContext>,
}

impl Demultiplexer {
    pub fn new(ctx: Arc<LinkContext>) -> Self {
        Self { ctx }
    }

    pub fn run(&self) {
        tracing::info!("Demultiplexer started");

        while self.ctx.is_running() {
            match self.ctx.transport.receive(self.ctx.poll) {
                Ok(Some(packet)) => self.route(packet),
                Ok(None) => {}
                Err(e) => {
                    self.ctx.fail(&e);
                    break;
                }
            }
        }

        tracing::info!("Demultiplexer stopped");
    }

    fn route(&self, packet: Packet) {
        let state = &self.ctx.state;
        let Some(queue) = self.ctx.registry.find_output(&packet.stream) else {
            state.unknown_stream_packets.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Packet for unknown stream '{}' discarded", packet.stream);
            return;
        };

        let message = match Message::decode(&packet.stream, &packet.payload) {
            Ok(message) => message,
            Err(e) => {
                state.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("{}", e);
                return;
            }
        };

        tracing::trace!(
            "{} <- #{} {} ({} bytes)",
            packet.stream,
            message.sequence_num,
            message.datatype(),
            packet.payload.len()
        );

        // Blocks here while a Blocking queue is full
        match queue.push(message) {
            Ok(()) => {
                state.messages_received.fetch_add(1, Ordering::Relaxed);
                state
                    .bytes_received
                    .fetch_add(packet.payload.len() as u64, Ordering::Relaxed);
            }
            Err(_) => tracing::trace!("Queue '{}' closed, message discarded", packet.stream),
        }
    }
}

/// Host → device sending loop
pub(crate) struct Multiplexer {
    ctx: Arc<LinkContext>,
    doorbell: Receiver<()>,
}

impl Multiplexer {
    pub fn new(ctx: Arc<LinkContext>, doorbell: Receiver<()>) -> Self {
        Self { ctx, doorbell }
    }

    pub fn run(&self) {
        tracing::info!("Multiplexer started");

        while self.ctx.is_running() {
            match self.doorbell.recv_timeout(self.ctx.poll) {
                Ok(()) => {
                    if let Err(e) = self.drain() {
                        self.ctx.fail(&e);
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::info!("Multiplexer stopped");
    }

    /// One message per stream per round until every input queue is empty
    fn drain(&self) -> Result<(), VisLinkError> {
        loop {
            let mut sent_any = false;
            for queue in self.ctx.registry.inputs() {
                if !self.ctx.is_running() {
                    return Ok(());
                }
                sent_any |= self.forward(queue)?;
            }
            if !sent_any {
                return Ok(());
            }
        }
    }

    /// Send the oldest pending message of `queue`. Returns false when it is empty.
    fn forward(&self, queue: &DataInputQueue) -> Result<bool, VisLinkError> {
        let Some(message) = queue.try_pop() else {
            return Ok(false);
        };
        let stream = queue.name();

        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Dropping unencodable message on '{}': {}", stream, e);
                return Ok(true);
            }
        };
        let size = payload.len() as u64;

        tracing::trace!("{} -> #{} ({} bytes)", stream, message.sequence_num, size);
        self.ctx.transport.transmit(Packet::new(stream, payload))?;

        let state = &self.ctx.state;
        state.messages_sent.fetch_add(1, Ordering::Relaxed);
        state.bytes_sent.fetch_add(size, Ordering::Relaxed);
        Ok(true)
    }
}
