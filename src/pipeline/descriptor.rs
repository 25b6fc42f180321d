//! Serialized device program.
//!
//! [`GraphDescriptor`] holds the JSON bytes uploaded to the device together
//! with the host stream declarations `Device::open` needs to build its
//! queues. The JSON layout is described by [`PipelineSchema`].

use super::id::NodeId;
use super::node::Node;
use super::node_type::NodeType;
use super::openvino::OpenVinoVersion;
use super::port::{PortDescriptor, PortDirection};
use super::property::PropertyValue;
use crate::error::{Result, VisLinkError};
use crate::types::Datatype;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default `maxDataSize` of an XLinkIn stream (5 MiB)
pub const DEFAULT_MAX_DATA_SIZE: usize = 5 * 1024 * 1024;

/// Which way a host stream flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamDirection {
    /// XLinkOut: device → host, read through a `DataOutputQueue`
    DeviceToHost,
    /// XLinkIn: host → device, written through a `DataInputQueue`
    HostToDevice,
}

/// Host-visible stream declared by an XLinkIn/XLinkOut node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDeclaration {
    pub name: String,
    pub direction: StreamDirection,
    pub node: NodeId,
    /// Largest payload accepted on a host → device stream
    pub max_data_size: usize,
}

impl StreamDeclaration {
    /// Declaration for a boundary node with a stream name
    pub fn from_node(node: &Node) -> Option<Self> {
        let name = node.stream_name()?;
        let direction = match node.node_type() {
            NodeType::XLinkOut => StreamDirection::DeviceToHost,
            NodeType::XLinkIn => StreamDirection::HostToDevice,
            _ => return None,
        };
        let max_data_size = node
            .property("maxDataSize")
            .and_then(PropertyValue::as_int)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(DEFAULT_MAX_DATA_SIZE);

        Some(Self {
            name: name.to_string(),
            direction,
            node: node.id(),
            max_data_size,
        })
    }
}

/// Result of the reachability analysis run at compile time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub total_nodes: usize,
    /// Nodes on a path from a source to a sink
    pub active_nodes: usize,
    pub disconnected_nodes: usize,
    /// Nodes without required inputs
    pub source_nodes: usize,
    /// Nodes without outputs
    pub sink_nodes: usize,
    pub links: usize,
    /// Ids of the disconnected nodes
    pub inactive: Vec<NodeId>,
    pub analysis_time_us: u64,
}

// ==================== JSON schema ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalProperties {
    pub openvino_version: OpenVinoVersion,
    pub camera_tuning_blob_path: Option<String>,
    pub xlink_chunk_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoInfo {
    pub name: String,
    pub direction: PortDirection,
    pub datatypes: Vec<Datatype>,
    pub blocking: bool,
    pub queue_size: u32,
}

impl From<&PortDescriptor> for IoInfo {
    fn from(port: &PortDescriptor) -> Self {
        Self {
            name: port.name.clone(),
            direction: port.direction,
            datatypes: port.datatypes.clone(),
            blocking: port.blocking,
            queue_size: port.queue_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSchema {
    pub id: u32,
    /// Node type name
    pub name: String,
    pub properties: BTreeMap<String, PropertyValue>,
    pub io_info: Vec<IoInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSchema {
    pub node1_id: u32,
    pub node1_output: String,
    pub node2_id: u32,
    pub node2_input: String,
}

/// JSON layout of the uploaded program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSchema {
    pub global_properties: GlobalProperties,
    pub nodes: Vec<NodeSchema>,
    pub connections: Vec<ConnectionSchema>,
}

// ==================== Descriptor ====================

/// Serialized pipeline ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDescriptor {
    pub bytes: Vec<u8>,
    pub streams: Vec<StreamDeclaration>,
    pub stats: GraphStats,
    pub openvino_version: OpenVinoVersion,
}

impl GraphDescriptor {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the descriptor bytes back into the schema
    pub fn schema(&self) -> Result<PipelineSchema> {
        Self::parse(&self.bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<PipelineSchema> {
        serde_json::from_slice(bytes).map_err(|e| {
            VisLinkError::Serialization(format!("Failed to parse pipeline descriptor: {}", e))
        })
    }

    /// Streams read by the host
    pub fn output_streams(&self) -> impl Iterator<Item = &StreamDeclaration> {
        self.streams
            .iter()
            .filter(|s| s.direction == StreamDirection::DeviceToHost)
    }

    /// Streams written by the host
    pub fn input_streams(&self) -> impl Iterator<Item = &StreamDeclaration> {
        self.streams
            .iter()
            .filter(|s| s.direction == StreamDirection::HostToDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    fn pipeline() -> Pipeline {
        let mut p = Pipeline::new();
        let cam = p.create_node(NodeType::ColorCamera).unwrap();
        let xout = p.create_node(NodeType::XLinkOut).unwrap();
        let xin = p.create_node(NodeType::XLinkIn).unwrap();
        p.set_stream_name(xout, "rgb").unwrap();
        p.set_stream_name(xin, "control").unwrap();
        p.set_property(xin, "maxDataSize", 256i64).unwrap();
        p.link(cam.port("preview"), xout.port("in")).unwrap();
        p.link(xin.port("out"), cam.port("inputControl")).unwrap();
        p
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let a = pipeline().serialize().unwrap();
        let b = pipeline().serialize().unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_schema_contains_everything() {
        let descriptor = pipeline().serialize().unwrap();
        let schema = descriptor.schema().unwrap();

        assert_eq!(schema.nodes.len(), 3);
        assert_eq!(schema.nodes[0].name, "ColorCamera");
        assert_eq!(
            schema.connections[0],
            ConnectionSchema {
                node1_id: 0,
                node1_output: "preview".into(),
                node2_id: 1,
                node2_input: "in".into(),
            }
        );
        assert_eq!(
            schema.global_properties.openvino_version,
            OpenVinoVersion::V2021_4
        );
        let xout = &schema.nodes[1];
        assert_eq!(
            xout.properties.get("streamName"),
            Some(&PropertyValue::from("rgb"))
        );
        assert!(xout.io_info[0].blocking);
    }

    #[test]
    fn test_stream_declarations() {
        let descriptor = pipeline().serialize().unwrap();
        let outputs: Vec<_> = descriptor.output_streams().map(|s| s.name.as_str()).collect();
        let inputs: Vec<_> = descriptor.input_streams().collect();
        assert_eq!(outputs, vec!["rgb"]);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "control");
        assert_eq!(inputs[0].max_data_size, 256);
    }

    #[test]
    fn test_camelcase_keys() {
        let descriptor = pipeline().serialize().unwrap();
        let text = String::from_utf8(descriptor.bytes.clone()).unwrap();
        assert!(text.starts_with("{\"globalProperties\""));
        assert!(text.contains("\"node1Output\":\"preview\""));
        assert!(text.contains("\"ioInfo\""));
    }
}
