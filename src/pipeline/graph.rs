//! The pipeline graph: nodes, typed links and pipeline-wide settings.
//!
//! Construction errors (bad port, incompatible types, double-connected input)
//! are reported by the call that caused them. Whole-graph rules (stream name
//! uniqueness, required inputs) are checked by [`Pipeline::validate`] and
//! [`Pipeline::serialize`], which report every violation at once.

use super::compiler::PipelineCompiler;
use super::descriptor::{GraphDescriptor, StreamDeclaration};
use super::id::{LinkId, NodeId, PortId};
use super::node::{Node, ScriptProcessor, MAX_PORTS_PER_NODE};
use super::node_type::NodeType;
use super::openvino::OpenVinoVersion;
use super::port::{PortDescriptor, PortDirection, PortRef};
use super::property::PropertyValue;
use crate::error::{Result, VisLinkError};
use crate::types::{format_datatypes, Datatype};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directed connection from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub from: PortId,
    pub to: PortId,
}

/// Pipeline-wide settings carried into the descriptor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Forces this OpenVINO version instead of deriving it from the networks
    pub openvino_version: Option<OpenVinoVersion>,
    pub camera_tuning_blob_path: Option<PathBuf>,
    pub xlink_chunk_size: Option<u32>,
}

/// A device program under construction.
///
/// Owns its nodes and links. Once [`freeze`](Self::freeze)d (done by
/// `Device::open`), every mutating call fails with `PipelineFrozen`.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    nodes: Vec<Node>,
    links: Vec<Link>,
    next_link_id: u32,
    settings: PipelineSettings,
    frozen: bool,
}

/// Node indices must leave `PortId::SLOT_BITS` free in a `u32`
pub const MAX_NODES: usize = (u32::MAX >> PortId::SLOT_BITS) as usize + 1;

fn next_node_id(count: usize) -> Result<NodeId> {
    if count >= MAX_NODES {
        return Err(VisLinkError::TooManyNodes { max: MAX_NODES });
    }
    Ok(NodeId(count as u32))
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(VisLinkError::PipelineFrozen);
        }
        Ok(())
    }

    // ==================== Nodes ====================

    /// Create a node with default properties
    pub fn create_node(&mut self, node_type: NodeType) -> Result<NodeId> {
        self.ensure_mutable()?;
        let id = next_node_id(self.nodes.len())?;
        self.nodes.push(Node::new(id, node_type));
        tracing::trace!("Created node {} ({})", id.0, node_type);
        Ok(id)
    }

    /// Create a node and apply `properties` over the defaults
    pub fn create_node_with<I, K, V>(&mut self, node_type: NodeType, properties: I) -> Result<NodeId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        let id = self.create_node(node_type)?;
        let node = &mut self.nodes[id.index()];
        for (key, value) in properties {
            node.properties.insert(key.into(), value.into());
        }
        Ok(id)
    }

    /// Create a node from its type name (`"ColorCamera"`, `"XLinkOut"`, ...)
    pub fn create_node_named(&mut self, type_name: &str) -> Result<NodeId> {
        let node_type: NodeType = type_name.parse()?;
        self.create_node(node_type)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn node_checked(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .ok_or_else(|| VisLinkError::InvalidPort(format!("Node {} does not exist", id.0)))
    }

    fn node_checked_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.ensure_mutable()?;
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| VisLinkError::InvalidPort(format!("Node {} does not exist", id.0)))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    // ==================== Properties ====================

    pub fn set_property(
        &mut self,
        node: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let node = self.node_checked_mut(node)?;
        node.properties.insert(key.into(), value.into());
        Ok(())
    }

    pub fn property(&self, node: NodeId, key: &str) -> Option<&PropertyValue> {
        self.node(node).and_then(|n| n.property(key))
    }

    /// Set the host stream name of an XLinkIn/XLinkOut node
    pub fn set_stream_name(&mut self, node: NodeId, name: impl Into<String>) -> Result<()> {
        let node = self.node_checked_mut(node)?;
        if !node.node_type.is_host_boundary() {
            return Err(VisLinkError::InvalidNodeType(format!(
                "{} does not declare a host stream",
                node.label()
            )));
        }
        node.properties
            .insert("streamName".to_string(), PropertyValue::String(name.into()));
        Ok(())
    }

    /// Configure the device-side queue of an input port
    pub fn set_input_queue(&mut self, input: &PortRef, blocking: bool, queue_size: u32) -> Result<()> {
        let node = self.node_checked_mut(input.node)?;
        let label = node.label();
        let port = node
            .ports
            .iter_mut()
            .find(|p| p.name == input.name && p.is_input())
            .ok_or_else(|| {
                VisLinkError::InvalidPort(format!("{} has no input named '{}'", label, input.name))
            })?;
        port.blocking = blocking;
        port.queue_size = queue_size;
        Ok(())
    }

    // ==================== Script nodes ====================

    fn script_mut(&mut self, node: NodeId) -> Result<&mut Node> {
        let node = self.node_checked_mut(node)?;
        if node.node_type != NodeType::Script {
            return Err(VisLinkError::InvalidNodeType(format!(
                "{} is not a Script node",
                node.label()
            )));
        }
        Ok(node)
    }

    fn add_script_port(&mut self, node: NodeId, port: PortDescriptor) -> Result<PortRef> {
        let script = self.script_mut(node)?;
        if script.ports.iter().any(|p| p.name == port.name) {
            return Err(VisLinkError::InvalidPort(format!(
                "{} already has a port named '{}'",
                script.label(),
                port.name
            )));
        }
        if script.ports.len() >= MAX_PORTS_PER_NODE {
            return Err(VisLinkError::InvalidPort(format!(
                "{} cannot declare more than {} ports",
                script.label(),
                MAX_PORTS_PER_NODE
            )));
        }
        let port_ref = PortRef::new(node, port.name.clone());
        script.ports.push(port);
        Ok(port_ref)
    }

    /// Declare a Script input. Accepts any message; blocking, queue size 8.
    pub fn add_input(&mut self, node: NodeId, name: &str) -> Result<PortRef> {
        self.add_script_port(node, PortDescriptor::input(name, &[Datatype::Buffer]))
    }

    /// Declare a Script output
    pub fn add_output(&mut self, node: NodeId, name: &str) -> Result<PortRef> {
        self.add_script_port(node, PortDescriptor::output(name, &[Datatype::Buffer]))
    }

    /// Set the script source inline
    pub fn set_script(&mut self, node: NodeId, name: &str, source: &str) -> Result<()> {
        let script = self.script_mut(node)?;
        script
            .properties
            .insert("scriptName".into(), PropertyValue::from(name));
        script
            .properties
            .insert("scriptData".into(), PropertyValue::from(source));
        Ok(())
    }

    /// Load the script source from a file; the file name becomes the script name
    pub fn set_script_path(&mut self, node: NodeId, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.script_mut(node)?;
        let source = std::fs::read_to_string(path).map_err(|e| {
            VisLinkError::Io(e).with_context(format!("Failed to read script {:?}", path))
        })?;
        let name = path.to_string_lossy().into_owned();
        self.set_script(node, &name, &source)
    }

    pub fn set_processor(&mut self, node: NodeId, processor: ScriptProcessor) -> Result<()> {
        let script = self.script_mut(node)?;
        script
            .properties
            .insert("processor".into(), PropertyValue::from(processor.name()));
        Ok(())
    }

    // ==================== Links ====================

    fn resolve(&self, port: &PortRef, direction: PortDirection) -> Result<PortId> {
        let node = self
            .node(port.node)
            .ok_or_else(|| VisLinkError::InvalidLink(format!("Node {} does not exist", port.node.0)))?;
        match node.find_port(&port.name) {
            Some((id, desc)) if desc.direction == direction => Ok(id),
            Some(_) => Err(VisLinkError::InvalidLink(format!(
                "{}.{} is not an {} port",
                node.label(),
                port.name,
                direction
            ))),
            None => Err(VisLinkError::InvalidLink(format!(
                "{} has no {} named '{}'",
                node.label(),
                direction,
                port.name
            ))),
        }
    }

    pub(crate) fn port_descriptor(&self, id: PortId) -> Option<&PortDescriptor> {
        self.node(id.node()).and_then(|n| n.port(id))
    }

    /// `ColorCamera(0).preview`
    pub fn port_label(&self, id: PortId) -> String {
        match (self.node(id.node()), self.port_descriptor(id)) {
            (Some(node), Some(port)) => format!("{}.{}", node.label(), port.name),
            _ => format!("{:?}", id),
        }
    }

    /// Connect an output port to an input port
    pub fn link(&mut self, output: PortRef, input: PortRef) -> Result<LinkId> {
        self.ensure_mutable()?;
        let from = self.resolve(&output, PortDirection::Output)?;
        let to = self.resolve(&input, PortDirection::Input)?;

        let (src, dst) = match (self.port_descriptor(from), self.port_descriptor(to)) {
            (Some(src), Some(dst)) => (src, dst),
            _ => return Err(VisLinkError::InvalidLink(format!("{} -> {}", output, input))),
        };

        if !src.can_feed(dst) {
            return Err(VisLinkError::IncompatibleType {
                output: self.port_label(from),
                input: self.port_label(to),
                produced: format_datatypes(&src.datatypes),
                accepted: format_datatypes(&dst.datatypes),
            });
        }

        if let Some(existing) = self.links.iter().find(|l| l.to == to) {
            return Err(VisLinkError::PortAlreadyConnected {
                input: self.port_label(to),
                existing: self.port_label(existing.from),
            });
        }

        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        self.links.push(Link { id, from, to });
        tracing::trace!(
            "Linked {} -> {}",
            self.port_label(from),
            self.port_label(to)
        );
        Ok(id)
    }

    /// Remove the link between `output` and `input`
    pub fn unlink(&mut self, output: PortRef, input: PortRef) -> Result<()> {
        self.ensure_mutable()?;
        let from = self.resolve(&output, PortDirection::Output)?;
        let to = self.resolve(&input, PortDirection::Input)?;

        let pos = self
            .links
            .iter()
            .position(|l| l.from == from && l.to == to)
            .ok_or_else(|| {
                VisLinkError::InvalidLink(format!(
                    "{} is not linked to {}",
                    self.port_label(from),
                    self.port_label(to)
                ))
            })?;
        self.links.remove(pos);
        Ok(())
    }

    /// Source feeding `input`, if any
    pub fn incoming(&self, input: &PortRef) -> Option<PortRef> {
        let to = self.resolve(input, PortDirection::Input).ok()?;
        let link = self.links.iter().find(|l| l.to == to)?;
        let node = self.node(link.from.node())?;
        let port = node.port(link.from)?;
        Some(PortRef::new(node.id, port.name.clone()))
    }

    // ==================== Settings ====================

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Force an OpenVINO version for every network in the pipeline
    pub fn set_openvino_version(&mut self, version: OpenVinoVersion) -> Result<()> {
        self.ensure_mutable()?;
        self.settings.openvino_version = Some(version);
        Ok(())
    }

    pub fn set_camera_tuning_blob_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.ensure_mutable()?;
        self.settings.camera_tuning_blob_path = Some(path.into());
        Ok(())
    }

    pub fn set_xlink_chunk_size(&mut self, bytes: u32) -> Result<()> {
        self.ensure_mutable()?;
        self.settings.xlink_chunk_size = Some(bytes);
        Ok(())
    }

    /// OpenVINO version the device program will be built for
    pub fn required_openvino_version(&self) -> Result<Option<OpenVinoVersion>> {
        let mut report = super::error::ValidationReport::default();
        let version = PipelineCompiler::required_openvino_version(self, &mut report);
        if !report.is_ok() {
            return Err(VisLinkError::PipelineValidation(report));
        }
        Ok(version)
    }

    // ==================== Lifecycle ====================

    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::debug!(
                "Pipeline frozen ({} nodes, {} links)",
                self.nodes.len(),
                self.links.len()
            );
        }
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Check every whole-graph rule, reporting all violations
    pub fn validate(&self) -> Result<()> {
        let report = PipelineCompiler::validate(self);
        if report.is_ok() {
            Ok(())
        } else {
            Err(VisLinkError::PipelineValidation(report))
        }
    }

    /// Validate and produce the deterministic descriptor uploaded to the device
    pub fn serialize(&self) -> Result<GraphDescriptor> {
        PipelineCompiler::compile(self)
    }

    /// Host streams declared by XLinkIn/XLinkOut nodes, in node order
    pub fn stream_declarations(&self) -> Vec<StreamDeclaration> {
        self.nodes
            .iter()
            .filter_map(StreamDeclaration::from_node)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_to_host() -> (Pipeline, NodeId, NodeId) {
        let mut p = Pipeline::new();
        let cam = p.create_node(NodeType::ColorCamera).unwrap();
        let out = p.create_node(NodeType::XLinkOut).unwrap();
        p.set_stream_name(out, "rgb").unwrap();
        p.link(cam.port("preview"), out.port("in")).unwrap();
        (p, cam, out)
    }

    #[test]
    fn test_node_ids_stop_at_port_id_capacity() {
        assert_eq!(next_node_id(0).unwrap(), NodeId(0));
        let last = next_node_id(MAX_NODES - 1).unwrap();
        assert_eq!(last.port("out").node, last);
        assert_eq!(PortId::new(last, 0).node(), last);
        assert!(matches!(
            next_node_id(MAX_NODES),
            Err(VisLinkError::TooManyNodes { max }) if max == 1 << 20
        ));
    }

    #[test]
    fn test_link_creates_exactly_one_link() {
        let (p, cam, out) = camera_to_host();
        assert_eq!(p.link_count(), 1);
        assert_eq!(p.incoming(&out.port("in")), Some(cam.port("preview")));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_incompatible_type() {
        let mut p = Pipeline::new();
        let nn = p.create_node(NodeType::MobileNetDetectionNetwork).unwrap();
        let manip = p.create_node(NodeType::ImageManip).unwrap();
        let err = p.link(nn.port("out"), manip.port("inputImage")).unwrap_err();
        match err {
            VisLinkError::IncompatibleType {
                produced, accepted, ..
            } => {
                assert_eq!(produced, "ImgDetections");
                assert_eq!(accepted, "ImgFrame");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(p.link_count(), 0);
    }

    #[test]
    fn test_input_accepts_single_link() {
        let (mut p, _cam, out) = camera_to_host();
        let mono = p.create_node(NodeType::MonoCamera).unwrap();
        let err = p.link(mono.port("out"), out.port("in")).unwrap_err();
        assert!(matches!(err, VisLinkError::PortAlreadyConnected { .. }));
        assert_eq!(p.link_count(), 1);
    }

    #[test]
    fn test_wrong_direction_and_unknown_port() {
        let (mut p, cam, out) = camera_to_host();
        assert!(matches!(
            p.link(out.port("in"), cam.port("inputControl")),
            Err(VisLinkError::InvalidLink(_))
        ));
        assert!(matches!(
            p.link(cam.port("nope"), out.port("in")),
            Err(VisLinkError::InvalidLink(_))
        ));
        assert!(matches!(
            p.link(NodeId(99).port("out"), out.port("in")),
            Err(VisLinkError::InvalidLink(_))
        ));
    }

    #[test]
    fn test_unlink() {
        let (mut p, cam, out) = camera_to_host();
        p.unlink(cam.port("preview"), out.port("in")).unwrap();
        assert_eq!(p.link_count(), 0);
        assert!(matches!(
            p.unlink(cam.port("preview"), out.port("in")),
            Err(VisLinkError::InvalidLink(_))
        ));
    }

    #[test]
    fn test_frozen_pipeline_rejects_changes() {
        let (mut p, cam, out) = camera_to_host();
        p.freeze();
        assert!(matches!(
            p.create_node(NodeType::MonoCamera),
            Err(VisLinkError::PipelineFrozen)
        ));
        assert!(matches!(
            p.set_property(cam, "fps", 15.0),
            Err(VisLinkError::PipelineFrozen)
        ));
        assert!(matches!(
            p.unlink(cam.port("preview"), out.port("in")),
            Err(VisLinkError::PipelineFrozen)
        ));
        assert!(p.serialize().is_ok());
    }

    #[test]
    fn test_create_node_named() {
        let mut p = Pipeline::new();
        assert!(p.create_node_named("StereoDepth").is_ok());
        assert!(matches!(
            p.create_node_named("Stereo"),
            Err(VisLinkError::InvalidNodeType(_))
        ));
    }

    #[test]
    fn test_create_node_with_overrides_defaults() {
        let mut p = Pipeline::new();
        let cam = p
            .create_node_with(NodeType::ColorCamera, [("fps", 15.0), ("previewWidth", 416.0)])
            .unwrap();
        assert_eq!(p.property(cam, "fps").and_then(|v| v.as_float()), Some(15.0));
        assert!(p.property(cam, "boardSocket").is_some());
    }

    #[test]
    fn test_script_ports() {
        let mut p = Pipeline::new();
        let script = p.create_node(NodeType::Script).unwrap();
        let input = p.add_input(script, "frames").unwrap();
        p.add_output(script, "control").unwrap();
        assert!(p.add_input(script, "frames").is_err());

        let cam = p.create_node(NodeType::ColorCamera).unwrap();
        p.link(cam.port("preview"), input).unwrap();
        p.link(script.port("control"), cam.port("inputControl"))
            .unwrap();

        let node = p.node(script).unwrap();
        let port = node.find_port("frames").unwrap().1;
        assert!(port.blocking);
        assert_eq!(port.queue_size, 8);

        assert!(matches!(
            p.add_input(cam, "x"),
            Err(VisLinkError::InvalidNodeType(_))
        ));
    }

    #[test]
    fn test_set_input_queue() {
        let (mut p, _cam, out) = camera_to_host();
        p.set_input_queue(&out.port("in"), false, 1).unwrap();
        let port = p.node(out).unwrap().find_port("in").unwrap().1;
        assert!(!port.blocking);
        assert_eq!(port.queue_size, 1);
    }

    #[test]
    fn test_stream_name_only_on_boundary_nodes() {
        let mut p = Pipeline::new();
        let cam = p.create_node(NodeType::ColorCamera).unwrap();
        assert!(matches!(
            p.set_stream_name(cam, "rgb"),
            Err(VisLinkError::InvalidNodeType(_))
        ));
    }
}
