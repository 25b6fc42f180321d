use super::descriptor::{
    ConnectionSchema, GlobalProperties, GraphDescriptor, GraphStats, IoInfo, NodeSchema,
    PipelineSchema, StreamDeclaration,
};
use super::error::{ValidationReport, Violation};
use super::graph::Pipeline;
use super::id::NodeId;
use super::openvino::OpenVinoVersion;
use crate::error::{Result, VisLinkError};
use std::collections::BTreeMap;

/// Validates a pipeline graph and compiles it into a device descriptor
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Check every whole-graph rule.
    ///
    /// The check is exhaustive: every violation is reported, not just the
    /// first. Cycles are allowed.
    pub fn validate(pipeline: &Pipeline) -> ValidationReport {
        let mut report = ValidationReport::default();

        Self::check_stream_names(pipeline, &mut report);
        Self::check_required_inputs(pipeline, &mut report);
        Self::check_links(pipeline, &mut report);
        Self::check_properties(pipeline, &mut report);
        Self::required_openvino_version(pipeline, &mut report);

        report
    }

    fn check_stream_names(pipeline: &Pipeline, report: &mut ValidationReport) {
        let mut by_name: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();

        for node in pipeline.nodes() {
            if !node.node_type().is_host_boundary() {
                continue;
            }
            match node.stream_name() {
                Some(name) => by_name.entry(name).or_default().push(node.id()),
                None => report.push(Violation::MissingStreamName { node: node.id() }),
            }
        }

        for (stream, nodes) in by_name {
            if nodes.len() > 1 {
                report.push(Violation::DuplicateStreamName {
                    stream: stream.to_string(),
                    nodes,
                });
            }
        }
    }

    fn check_required_inputs(pipeline: &Pipeline, report: &mut ValidationReport) {
        let mut connected = vec![Vec::new(); pipeline.node_count()];
        for link in pipeline.links() {
            if let Some(ports) = connected.get_mut(link.to.node().index()) {
                ports.push(link.to.port_index());
            }
        }

        for node in pipeline.nodes() {
            for (idx, port) in node.ports().iter().enumerate() {
                if port.is_input()
                    && port.required
                    && !connected[node.id().index()].contains(&(idx as u16))
                {
                    report.push(Violation::UnconnectedInput {
                        node: node.id(),
                        port: port.name.clone(),
                    });
                }
            }
        }
    }

    fn check_links(pipeline: &Pipeline, report: &mut ValidationReport) {
        for link in pipeline.links() {
            let from_ok = pipeline
                .port_descriptor(link.from)
                .is_some_and(|p| p.is_output());
            let to_ok = pipeline
                .port_descriptor(link.to)
                .is_some_and(|p| p.is_input());
            if !from_ok || !to_ok {
                report.push(Violation::DanglingLink {
                    from: pipeline.port_label(link.from),
                    to: pipeline.port_label(link.to),
                });
            }
        }
    }

    fn check_properties(pipeline: &Pipeline, report: &mut ValidationReport) {
        for node in pipeline.nodes() {
            let mut invalid = |key: &str, reason: &str| {
                report.push(Violation::InvalidProperty {
                    node: node.id(),
                    key: key.to_string(),
                    reason: reason.to_string(),
                });
            };

            if node.node_type().is_host_boundary() {
                if let Some(size) = node.property("maxDataSize") {
                    if size.as_int().map_or(true, |v| v <= 0) {
                        invalid("maxDataSize", "must be a positive integer");
                    }
                }
                if let Some(frames) = node.property("numFrames") {
                    if frames.as_int().map_or(true, |v| v <= 0) {
                        invalid("numFrames", "must be a positive integer");
                    }
                }
            }

            if node.node_type().is_network() {
                if let Some(threshold) = node.property("confidenceThreshold") {
                    if threshold.as_float().map_or(true, |v| !(0.0..=1.0).contains(&v)) {
                        invalid("confidenceThreshold", "must be within 0.0..=1.0");
                    }
                }
            }
        }
    }

    fn node_openvino_version(
        node: &super::node::Node,
        report: &mut ValidationReport,
    ) -> Option<OpenVinoVersion> {
        let value = node.property("openvinoVersion")?;
        match value.as_str().map(str::parse::<OpenVinoVersion>) {
            Some(Ok(version)) => Some(version),
            _ => {
                report.push(Violation::InvalidProperty {
                    node: node.id(),
                    key: "openvinoVersion".to_string(),
                    reason: format!("unknown OpenVINO version {:?}", value),
                });
                None
            }
        }
    }

    /// OpenVINO version the program needs: the forced one, or the one the
    /// first network declares. Incompatible network blobs are reported.
    pub fn required_openvino_version(
        pipeline: &Pipeline,
        report: &mut ValidationReport,
    ) -> Option<OpenVinoVersion> {
        let mut required = pipeline.settings().openvino_version;

        for node in pipeline.nodes() {
            if !node.node_type().is_network() {
                continue;
            }
            let Some(version) = Self::node_openvino_version(node, report) else {
                continue;
            };
            match required {
                None => required = Some(version),
                Some(req) if !req.is_blob_compatible(version) => {
                    report.push(Violation::IncompatibleOpenVinoVersions {
                        required: req,
                        node: node.id(),
                        found: version,
                    });
                }
                Some(_) => {}
            }
        }

        required
    }

    /// Validate, analyze and serialize the pipeline.
    ///
    /// The same graph always yields byte-identical descriptor bytes: nodes
    /// are written in id order, properties in key order, connections in link
    /// creation order.
    pub fn compile(pipeline: &Pipeline) -> Result<GraphDescriptor> {
        let report = Self::validate(pipeline);
        if !report.is_ok() {
            tracing::warn!("Pipeline validation failed: {}", report);
            return Err(VisLinkError::PipelineValidation(report));
        }

        let stats = Self::analyze(pipeline);
        let mut scratch = ValidationReport::default();
        let openvino_version =
            Self::required_openvino_version(pipeline, &mut scratch).unwrap_or_default();

        let settings = pipeline.settings();
        let schema = PipelineSchema {
            global_properties: GlobalProperties {
                openvino_version,
                camera_tuning_blob_path: settings
                    .camera_tuning_blob_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                xlink_chunk_size: settings.xlink_chunk_size,
            },
            nodes: pipeline
                .nodes()
                .iter()
                .map(|node| NodeSchema {
                    id: node.id().0,
                    name: node.node_type().name().to_string(),
                    properties: node.properties().clone(),
                    io_info: node.ports().iter().map(IoInfo::from).collect(),
                })
                .collect(),
            connections: pipeline
                .links()
                .iter()
                .filter_map(|link| {
                    let from = pipeline.port_descriptor(link.from)?;
                    let to = pipeline.port_descriptor(link.to)?;
                    Some(ConnectionSchema {
                        node1_id: link.from.node().0,
                        node1_output: from.name.clone(),
                        node2_id: link.to.node().0,
                        node2_input: to.name.clone(),
                    })
                })
                .collect(),
        };

        let bytes = serde_json::to_vec(&schema).map_err(|e| {
            VisLinkError::Serialization(format!("Failed to serialize pipeline: {}", e))
        })?;

        let streams: Vec<StreamDeclaration> = pipeline.stream_declarations();

        tracing::debug!(
            "Compiled pipeline: {} nodes, {} links, {} streams, {} bytes",
            pipeline.node_count(),
            pipeline.link_count(),
            streams.len(),
            bytes.len()
        );

        Ok(GraphDescriptor {
            bytes,
            streams,
            stats,
            openvino_version,
        })
    }

    /// Reachability analysis.
    ///
    /// Sources are nodes without required inputs (cameras, XLinkIn, ...);
    /// sinks are nodes without outputs (XLinkOut). A node is active when it
    /// lies on a path from a source to a sink. Inactive nodes are valid but
    /// never deliver anything to the host, so they are logged.
    pub fn analyze(pipeline: &Pipeline) -> GraphStats {
        let start_time = std::time::Instant::now();
        let n = pipeline.node_count();

        let (fwd_adj, bwd_adj) = Self::build_adjacency(pipeline);

        let sources: Vec<usize> = pipeline
            .nodes()
            .iter()
            .filter(|node| !node.inputs().any(|p| p.required))
            .map(|node| node.id().index())
            .collect();

        let sinks: Vec<usize> = pipeline
            .nodes()
            .iter()
            .filter(|node| node.outputs().next().is_none())
            .map(|node| node.id().index())
            .collect();

        let fwd_reachable = Self::reachability(&sources, &fwd_adj, n);
        let bwd_reachable = Self::reachability(&sinks, &bwd_adj, n);

        let inactive: Vec<NodeId> = (0..n)
            .filter(|&i| !(fwd_reachable[i] && bwd_reachable[i]))
            .map(|i| NodeId(i as u32))
            .collect();

        for &id in &inactive {
            if let Some(node) = pipeline.node(id) {
                tracing::warn!(
                    "{} is not on any path from a source to a host stream",
                    node.label()
                );
            }
        }

        GraphStats {
            total_nodes: n,
            active_nodes: n - inactive.len(),
            disconnected_nodes: inactive.len(),
            source_nodes: sources.len(),
            sink_nodes: sinks.len(),
            links: pipeline.link_count(),
            inactive,
            analysis_time_us: start_time.elapsed().as_micros() as u64,
        }
    }

    fn build_adjacency(pipeline: &Pipeline) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let n = pipeline.node_count();
        let mut fwd_adj = vec![Vec::new(); n];
        let mut bwd_adj = vec![Vec::new(); n];

        for link in pipeline.links() {
            let from = link.from.node().index();
            let to = link.to.node().index();
            if from >= n || to >= n {
                continue;
            }
            fwd_adj[from].push(to);
            bwd_adj[to].push(from);
        }

        (fwd_adj, bwd_adj)
    }

    /// DFS from `roots` along `adj`
    fn reachability(roots: &[usize], adj: &[Vec<usize>], n: usize) -> Vec<bool> {
        let mut reachable = vec![false; n];
        let mut stack = Vec::new();

        for &root in roots {
            reachable[root] = true;
            stack.push(root);
        }

        while let Some(node) = stack.pop() {
            for &neighbor in &adj[node] {
                if !reachable[neighbor] {
                    reachable[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }

        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NodeType;

    #[test]
    fn test_duplicate_stream_names_name_every_node() {
        let mut p = Pipeline::new();
        let cam = p.create_node(NodeType::ColorCamera).unwrap();
        let a = p.create_node(NodeType::XLinkOut).unwrap();
        let b = p.create_node(NodeType::XLinkOut).unwrap();
        p.set_stream_name(a, "out").unwrap();
        p.set_stream_name(b, "out").unwrap();
        p.link(cam.port("preview"), a.port("in")).unwrap();
        p.link(cam.port("video"), b.port("in")).unwrap();

        let report = PipelineCompiler::validate(&p);
        assert_eq!(
            report.violations,
            vec![Violation::DuplicateStreamName {
                stream: "out".into(),
                nodes: vec![a, b],
            }]
        );
    }

    #[test]
    fn test_validation_is_exhaustive() {
        let mut p = Pipeline::new();
        let out = p.create_node(NodeType::XLinkOut).unwrap();
        p.create_node(NodeType::StereoDepth).unwrap();

        let report = PipelineCompiler::validate(&p);
        // missing stream name, unconnected XLinkOut.in, StereoDepth.left/right
        assert_eq!(report.len(), 4);
        assert!(report
            .iter()
            .any(|v| *v == Violation::MissingStreamName { node: out }));
    }

    #[test]
    fn test_cycles_are_allowed() {
        let mut p = Pipeline::new();
        let script = p.create_node(NodeType::Script).unwrap();
        let input = p.add_input(script, "feedback").unwrap();
        let output = p.add_output(script, "loop").unwrap();
        p.link(output, input).unwrap();
        assert!(PipelineCompiler::validate(&p).is_ok());
    }

    #[test]
    fn test_invalid_properties_reported() {
        let mut p = Pipeline::new();
        let xin = p.create_node(NodeType::XLinkIn).unwrap();
        p.set_stream_name(xin, "control").unwrap();
        p.set_property(xin, "maxDataSize", 0i64).unwrap();
        let report = PipelineCompiler::validate(&p);
        assert!(matches!(
            report.violations.as_slice(),
            [Violation::InvalidProperty { key, .. }] if key == "maxDataSize"
        ));
    }

    #[test]
    fn test_openvino_versions_must_be_compatible() {
        let mut p = Pipeline::new();
        let a = p.create_node(NodeType::NeuralNetwork).unwrap();
        let b = p.create_node(NodeType::NeuralNetwork).unwrap();
        p.set_property(a, "openvinoVersion", "2021.2").unwrap();
        p.set_property(b, "openvinoVersion", "2021.4").unwrap();

        let mut report = ValidationReport::default();
        let required = PipelineCompiler::required_openvino_version(&p, &mut report);
        assert_eq!(required, Some(OpenVinoVersion::V2021_2));
        assert!(report.is_ok());

        p.set_property(b, "openvinoVersion", "2020.3").unwrap();
        let mut report = ValidationReport::default();
        PipelineCompiler::required_openvino_version(&p, &mut report);
        assert!(matches!(
            report.violations.as_slice(),
            [Violation::IncompatibleOpenVinoVersions { node, .. }] if *node == b
        ));
    }

    #[test]
    fn test_analyze_flags_dead_ends() {
        let mut p = Pipeline::new();
        let cam = p.create_node(NodeType::ColorCamera).unwrap();
        let nn = p.create_node(NodeType::MobileNetDetectionNetwork).unwrap();
        let out = p.create_node(NodeType::XLinkOut).unwrap();
        p.set_stream_name(out, "rgb").unwrap();
        p.link(cam.port("preview"), out.port("in")).unwrap();
        p.link(cam.port("preview"), nn.port("in")).unwrap();

        let stats = PipelineCompiler::analyze(&p);
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.active_nodes, 2);
        assert_eq!(stats.inactive, vec![nn]);
        assert_eq!(stats.source_nodes, 1);
        assert_eq!(stats.sink_nodes, 1);
    }
}
