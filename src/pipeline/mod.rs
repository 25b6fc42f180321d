//! Pipeline graph model.
//!
//! A pipeline is the program uploaded to the device: typed nodes joined by
//! links from output ports to input ports. XLinkOut/XLinkIn nodes are the
//! host boundary; each declares a named stream that becomes a host queue.
//!
//! # Architecture
//!
//! ```text
//! [ColorCamera] ──preview──► [MobileNetSpatialDetectionNetwork] ──out──► [XLinkOut "detections"]
//!       │                              ▲
//!       └──────video──► [XLinkOut "rgb"]   inputDepth
//!                                      │
//! [MonoCamera]×2 ──► [StereoDepth] ──depth
//! ```
//!
//! # Design
//!
//! - **Index ids**: `NodeId` indexes `Pipeline::nodes`; `PortId` packs node and port index.
//! - **Eager link checks**: type errors and a second producer on one input fail the `link` call.
//! - **Exhaustive validation**: `serialize` reports every whole-graph violation.
//! - **Deterministic descriptor**: ordered maps, id-ordered nodes, creation-ordered links.

pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod node_type;
pub mod openvino;
pub mod port;
pub mod property;

pub use compiler::PipelineCompiler;
pub use descriptor::{
    GraphDescriptor, GraphStats, PipelineSchema, StreamDeclaration, StreamDirection,
    DEFAULT_MAX_DATA_SIZE,
};
pub use error::{ValidationReport, Violation};
pub use graph::{Link, Pipeline, PipelineSettings};
pub use id::{LinkId, NodeId, PortId};
pub use node::{Node, ScriptProcessor};
pub use node_type::NodeType;
pub use openvino::OpenVinoVersion;
pub use port::{PortDescriptor, PortDirection, PortRef};
pub use property::PropertyValue;
