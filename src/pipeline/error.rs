//! Graph validation findings.

use super::id::NodeId;
use super::openvino::OpenVinoVersion;
use std::fmt;

/// One problem found while validating a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Several boundary nodes claim the same host stream name
    DuplicateStreamName { stream: String, nodes: Vec<NodeId> },
    /// XLinkIn/XLinkOut node without a stream name
    MissingStreamName { node: NodeId },
    /// Required input port has no incoming link
    UnconnectedInput { node: NodeId, port: String },
    /// Link endpoint no longer resolves to a port
    DanglingLink { from: String, to: String },
    /// Property has a value the device cannot use
    InvalidProperty {
        node: NodeId,
        key: String,
        reason: String,
    },
    /// Two network blobs need OpenVINO versions that cannot coexist
    IncompatibleOpenVinoVersions {
        required: OpenVinoVersion,
        node: NodeId,
        found: OpenVinoVersion,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateStreamName { stream, nodes } => {
                let ids: Vec<String> = nodes.iter().map(|n| n.0.to_string()).collect();
                write!(
                    f,
                    "stream name '{}' is used by nodes [{}]",
                    stream,
                    ids.join(", ")
                )
            }
            Violation::MissingStreamName { node } => {
                write!(f, "node {} has no stream name", node.0)
            }
            Violation::UnconnectedInput { node, port } => {
                write!(f, "required input {}.{} has no incoming link", node.0, port)
            }
            Violation::DanglingLink { from, to } => {
                write!(f, "link {} -> {} refers to a missing port", from, to)
            }
            Violation::InvalidProperty { node, key, reason } => {
                write!(f, "node {} property '{}': {}", node.0, key, reason)
            }
            Violation::IncompatibleOpenVinoVersions {
                required,
                node,
                found,
            } => write!(
                f,
                "node {} needs OpenVINO {}, incompatible with required {}",
                node.0, found, required
            ),
        }
    }
}

/// Every violation found in one validation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "; {}", violation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_every_violation() {
        let mut report = ValidationReport::default();
        assert!(report.is_ok());
        report.push(Violation::DuplicateStreamName {
            stream: "rgb".into(),
            nodes: vec![NodeId(1), NodeId(4)],
        });
        report.push(Violation::MissingStreamName { node: NodeId(2) });

        let text = report.to_string();
        assert!(text.starts_with("2 violation(s)"));
        assert!(text.contains("'rgb' is used by nodes [1, 4]"));
        assert!(text.contains("node 2 has no stream name"));
    }
}
