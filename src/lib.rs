//! # vislink-rs: pipeline graphs and stream queues for vision devices
//!
//! Builds the processing graph an embedded vision processor runs and moves
//! messages between the device and host application threads.
//!
//! ## Architecture
//!
//! - **Pipeline**: typed nodes and links, validated and serialized into a
//!   deterministic JSON descriptor
//! - **Device**: uploads the descriptor over a [`Transport`] and exposes one
//!   host queue per XLinkIn/XLinkOut stream
//! - **Queues**: bounded, Blocking or DropOldest, with per-message callbacks
//!   and a device-wide event backlog for multi-stream waits
//! - **Workers**: a demultiplexer and a multiplexer thread move packets
//!   between the transport and the queues
//!
//! ## Example
//!
//! ```ignore
//! use vislink_rs::{
//!     config::DeviceConfig,
//!     device::Device,
//!     pipeline::{NodeType, Pipeline},
//!     transport::MockLink,
//! };
//!
//! fn main() -> vislink_rs::Result<()> {
//!     let mut pipeline = Pipeline::new();
//!     let cam = pipeline.create_node(NodeType::ColorCamera)?;
//!     let xout = pipeline.create_node(NodeType::XLinkOut)?;
//!     pipeline.set_stream_name(xout, "preview")?;
//!     pipeline.link(cam.port("preview"), xout.port("in"))?;
//!
//!     let (link, _handle) = MockLink::new();
//!     let device = Device::open(pipeline, link, DeviceConfig::default())?;
//!     let frame = device.get_output_queue("preview")?.get()?;
//!     println!("got {} #{}", frame.datatype(), frame.sequence_num);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{DeviceConfig, TransportTarget};
pub use device::Device;
pub use error::{Result, ResultExt, VisLinkError};
pub use pipeline::{GraphDescriptor, NodeId, NodeType, Pipeline, PortRef};
pub use queue::{DataInputQueue, DataOutputQueue, OverflowPolicy, QueueOptions};
pub use transport::{DeviceInfo, Packet, Transport};
pub use types::{Datatype, LinkStats, Message, Payload};
