//! Test pipeline builders

use vislink_rs::pipeline::{NodeId, NodeType, Pipeline};
use vislink_rs::types::{FrameType, ImgFrame, Message};

/// Builder for small camera → host pipelines
pub struct PipelineBuilder {
    pipeline: Pipeline,
    camera: NodeId,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        let mut pipeline = Pipeline::new();
        let camera = pipeline
            .create_node(NodeType::ColorCamera)
            .expect("create camera");
        Self { pipeline, camera }
    }

    pub fn camera(&self) -> NodeId {
        self.camera
    }

    /// Route a camera output to a new XLinkOut stream
    pub fn output_stream(mut self, camera_output: &str, stream: &str) -> Self {
        let xout = self
            .pipeline
            .create_node(NodeType::XLinkOut)
            .expect("create xout");
        self.pipeline
            .set_stream_name(xout, stream)
            .expect("stream name");
        self.pipeline
            .link(self.camera.port(camera_output), xout.port("in"))
            .expect("link camera to xout");
        self
    }

    /// Feed the camera control input from a new XLinkIn stream
    pub fn control_stream(mut self, stream: &str, max_data_size: i64) -> Self {
        let xin = self
            .pipeline
            .create_node(NodeType::XLinkIn)
            .expect("create xin");
        self.pipeline.set_stream_name(xin, stream).expect("stream name");
        self.pipeline
            .set_property(xin, "maxDataSize", max_data_size)
            .expect("maxDataSize");
        self.pipeline
            .link(xin.port("out"), self.camera.port("inputControl"))
            .expect("link xin to camera");
        self
    }

    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Mono pair + stereo + spatial detector with rgb/detections/depth outputs
pub fn spatial_detection_pipeline() -> Pipeline {
    let mut p = Pipeline::new();
    let cam = p.create_node(NodeType::ColorCamera).unwrap();
    let left = p.create_node(NodeType::MonoCamera).unwrap();
    let right = p.create_node(NodeType::MonoCamera).unwrap();
    let stereo = p.create_node(NodeType::StereoDepth).unwrap();
    let nn = p
        .create_node(NodeType::MobileNetSpatialDetectionNetwork)
        .unwrap();
    p.set_property(right, "boardSocket", "RIGHT").unwrap();
    p.set_property(nn, "blobPath", "mobilenet.blob").unwrap();

    let rgb = p.create_node(NodeType::XLinkOut).unwrap();
    let dets = p.create_node(NodeType::XLinkOut).unwrap();
    let depth = p.create_node(NodeType::XLinkOut).unwrap();
    p.set_stream_name(rgb, "rgb").unwrap();
    p.set_stream_name(dets, "detections").unwrap();
    p.set_stream_name(depth, "depth").unwrap();

    p.link(left.port("out"), stereo.port("left")).unwrap();
    p.link(right.port("out"), stereo.port("right")).unwrap();
    p.link(cam.port("preview"), nn.port("in")).unwrap();
    p.link(stereo.port("depth"), nn.port("inputDepth")).unwrap();
    p.link(nn.port("passthrough"), rgb.port("in")).unwrap();
    p.link(nn.port("out"), dets.port("in")).unwrap();
    p.link(nn.port("passthroughDepth"), depth.port("in")).unwrap();
    p
}

/// Small grey frame whose first pixel and sequence number encode `seq`
pub fn test_frame(seq: u64) -> Message {
    let frame = ImgFrame::new(4, 4, FrameType::Gray8).with_data(vec![seq as u8; 16]);
    Message::new(frame).with_sequence_num(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_builder() {
        let p = PipelineBuilder::new()
            .output_stream("video", "rgb")
            .control_stream("control", 256)
            .build();

        assert_eq!(p.node_count(), 3);
        assert_eq!(p.link_count(), 2);
        assert!(p.validate().is_ok());
    }
}
