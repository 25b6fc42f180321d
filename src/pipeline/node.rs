//! Node instances.
//!
//! A `Node` is created only through [`Pipeline`](super::Pipeline) and lives
//! as long as the pipeline. Its port table starts from the
//! [`NodeType`] template; `Script` nodes grow ports at runtime.

use super::id::{NodeId, PortId};
use super::node_type::NodeType;
use super::port::{PortDescriptor, PortDirection};
use super::property::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of ports a node can declare
pub const MAX_PORTS_PER_NODE: usize = 1 << PortId::SLOT_BITS;

/// Processor a `Script` node runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScriptProcessor {
    #[default]
    LeonCss,
    LeonMss,
}

impl ScriptProcessor {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptProcessor::LeonCss => "LeonCss",
            ScriptProcessor::LeonMss => "LeonMss",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) node_type: NodeType,
    pub(crate) properties: BTreeMap<String, PropertyValue>,
    pub(crate) ports: Vec<PortDescriptor>,
}

impl Node {
    pub(crate) fn new(id: NodeId, node_type: NodeType) -> Self {
        Self {
            id,
            node_type,
            properties: node_type.default_properties(),
            ports: node_type.ports(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn inputs(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter().filter(|p| p.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter().filter(|p| p.is_output())
    }

    /// Look up a port by name, in either direction
    pub fn find_port(&self, name: &str) -> Option<(PortId, &PortDescriptor)> {
        self.ports
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
            .map(|(idx, p)| (PortId::new(self.id, idx as u16), p))
    }

    pub fn find_port_in(&self, name: &str, direction: PortDirection) -> Option<PortId> {
        self.find_port(name)
            .filter(|(_, p)| p.direction == direction)
            .map(|(id, _)| id)
    }

    pub fn port(&self, id: PortId) -> Option<&PortDescriptor> {
        if id.node() != self.id {
            return None;
        }
        self.ports.get(id.port_index() as usize)
    }

    /// Stream name of an XLinkIn/XLinkOut node; `None` if unset or not a boundary node
    pub fn stream_name(&self) -> Option<&str> {
        if !self.node_type.is_host_boundary() {
            return None;
        }
        self.property("streamName")
            .and_then(PropertyValue::as_str)
            .filter(|s| !s.is_empty())
    }

    /// `ColorCamera(0)`
    pub fn label(&self) -> String {
        format!("{}({})", self.node_type.name(), self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_uses_template() {
        let node = Node::new(NodeId(2), NodeType::MobileNetDetectionNetwork);
        assert_eq!(node.inputs().count(), 1);
        assert_eq!(node.outputs().count(), 2);
        assert!(node.property("confidenceThreshold").is_some());
        assert_eq!(node.label(), "MobileNetDetectionNetwork(2)");
    }

    #[test]
    fn test_find_port_direction() {
        let node = Node::new(NodeId(0), NodeType::XLinkOut);
        assert!(node.find_port_in("in", PortDirection::Input).is_some());
        assert!(node.find_port_in("in", PortDirection::Output).is_none());
        let (id, _) = node.find_port("in").unwrap();
        assert_eq!(id.node(), NodeId(0));
        assert!(node.port(id).unwrap().required);
    }

    #[test]
    fn test_stream_name_only_when_set() {
        let mut node = Node::new(NodeId(0), NodeType::XLinkOut);
        assert_eq!(node.stream_name(), None);
        node.properties
            .insert("streamName".into(), PropertyValue::from("rgb"));
        assert_eq!(node.stream_name(), Some("rgb"));
    }
}
