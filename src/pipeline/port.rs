//! Port descriptors for the node system.
//!
//! Each node kind declares its ports via a table of `PortDescriptor`s. The
//! pipeline uses the declared datatypes to validate links.

use super::id::NodeId;
use crate::config::DEFAULT_NODE_INPUT_QUEUE_SIZE;
use crate::types::Datatype;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Descriptor for one port of a node.
///
/// `blocking` and `queue_size` configure the device-side queue of an input
/// port; they are carried into the descriptor unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    /// Produced (outputs) or accepted (inputs) message kinds
    pub datatypes: Vec<Datatype>,
    pub blocking: bool,
    pub queue_size: u32,
    /// Input must have an incoming link for the graph to validate
    pub required: bool,
}

impl PortDescriptor {
    pub fn input(name: &str, datatypes: &[Datatype]) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Input,
            datatypes: datatypes.to_vec(),
            blocking: true,
            queue_size: DEFAULT_NODE_INPUT_QUEUE_SIZE,
            required: false,
        }
    }

    pub fn output(name: &str, datatypes: &[Datatype]) -> Self {
        Self {
            name: name.to_string(),
            direction: PortDirection::Output,
            datatypes: datatypes.to_vec(),
            blocking: false,
            queue_size: 0,
            required: false,
        }
    }

    /// Mark an input as needing a source
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn non_blocking(mut self, queue_size: u32) -> Self {
        self.blocking = false;
        self.queue_size = queue_size;
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    /// Whether anything this output produces is accepted by `input`
    pub fn can_feed(&self, input: &PortDescriptor) -> bool {
        self.datatypes.iter().any(|produced| {
            input
                .datatypes
                .iter()
                .any(|accepted| produced.is_assignable_to(*accepted))
        })
    }
}

/// User-facing reference to a port: node plus port name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: NodeId,
    pub name: String,
}

impl PortRef {
    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node.0, self.name)
    }
}
