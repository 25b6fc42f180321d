//! Node type enumeration.
//!
//! Each node kind carries a fixed port table and a set of default
//! properties. `Script` nodes start without ports; the user declares them
//! with `Pipeline::add_input`/`add_output`.

use super::port::PortDescriptor;
use super::property::PropertyValue;
use crate::error::VisLinkError;
use crate::types::Datatype;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Types of nodes that can run on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    // Sources
    ColorCamera,
    MonoCamera,
    SystemLogger,

    // Processing
    StereoDepth,
    ImageManip,
    NeuralNetwork,
    MobileNetDetectionNetwork,
    YoloDetectionNetwork,
    MobileNetSpatialDetectionNetwork,
    YoloSpatialDetectionNetwork,
    SpatialLocationCalculator,
    ObjectTracker,
    Script,

    // Host boundary
    /// Host → device stream
    XLinkIn,
    /// Device → host stream
    XLinkOut,
}

impl NodeType {
    /// Name used in the descriptor and accepted by `from_str`.
    pub fn name(&self) -> &'static str {
        match self {
            NodeType::ColorCamera => "ColorCamera",
            NodeType::MonoCamera => "MonoCamera",
            NodeType::SystemLogger => "SystemLogger",
            NodeType::StereoDepth => "StereoDepth",
            NodeType::ImageManip => "ImageManip",
            NodeType::NeuralNetwork => "NeuralNetwork",
            NodeType::MobileNetDetectionNetwork => "MobileNetDetectionNetwork",
            NodeType::YoloDetectionNetwork => "YoloDetectionNetwork",
            NodeType::MobileNetSpatialDetectionNetwork => "MobileNetSpatialDetectionNetwork",
            NodeType::YoloSpatialDetectionNetwork => "YoloSpatialDetectionNetwork",
            NodeType::SpatialLocationCalculator => "SpatialLocationCalculator",
            NodeType::ObjectTracker => "ObjectTracker",
            NodeType::Script => "Script",
            NodeType::XLinkIn => "XLinkIn",
            NodeType::XLinkOut => "XLinkOut",
        }
    }

    /// Get all available node types.
    pub fn all() -> &'static [NodeType] {
        &[
            NodeType::ColorCamera,
            NodeType::MonoCamera,
            NodeType::SystemLogger,
            NodeType::StereoDepth,
            NodeType::ImageManip,
            NodeType::NeuralNetwork,
            NodeType::MobileNetDetectionNetwork,
            NodeType::YoloDetectionNetwork,
            NodeType::MobileNetSpatialDetectionNetwork,
            NodeType::YoloSpatialDetectionNetwork,
            NodeType::SpatialLocationCalculator,
            NodeType::ObjectTracker,
            NodeType::Script,
            NodeType::XLinkIn,
            NodeType::XLinkOut,
        ]
    }

    /// XLinkIn/XLinkOut nodes declare a host-visible stream
    pub fn is_host_boundary(&self) -> bool {
        matches!(self, NodeType::XLinkIn | NodeType::XLinkOut)
    }

    /// Nodes that load a compiled network blob
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            NodeType::NeuralNetwork
                | NodeType::MobileNetDetectionNetwork
                | NodeType::YoloDetectionNetwork
                | NodeType::MobileNetSpatialDetectionNetwork
                | NodeType::YoloSpatialDetectionNetwork
        )
    }

    pub fn is_spatial_network(&self) -> bool {
        matches!(
            self,
            NodeType::MobileNetSpatialDetectionNetwork | NodeType::YoloSpatialDetectionNetwork
        )
    }

    pub fn is_yolo(&self) -> bool {
        matches!(
            self,
            NodeType::YoloDetectionNetwork | NodeType::YoloSpatialDetectionNetwork
        )
    }

    /// Port table for a freshly created node
    pub fn ports(&self) -> Vec<PortDescriptor> {
        use Datatype as D;
        let frame: &[Datatype] = &[D::ImgFrame];

        match self {
            NodeType::ColorCamera => vec![
                PortDescriptor::input("inputConfig", &[D::ImageManipConfig]),
                PortDescriptor::input("inputControl", &[D::CameraControl]),
                PortDescriptor::output("raw", frame),
                PortDescriptor::output("isp", frame),
                PortDescriptor::output("video", frame),
                PortDescriptor::output("preview", frame),
                PortDescriptor::output("still", frame),
            ],
            NodeType::MonoCamera => vec![
                PortDescriptor::input("inputControl", &[D::CameraControl]),
                PortDescriptor::output("out", frame),
                PortDescriptor::output("raw", frame),
            ],
            NodeType::SystemLogger => {
                vec![PortDescriptor::output("out", &[D::SystemInformation])]
            }
            NodeType::StereoDepth => vec![
                PortDescriptor::input("left", frame).required(),
                PortDescriptor::input("right", frame).required(),
                PortDescriptor::output("depth", frame),
                PortDescriptor::output("disparity", frame),
                PortDescriptor::output("syncedLeft", frame),
                PortDescriptor::output("syncedRight", frame),
                PortDescriptor::output("rectifiedLeft", frame),
                PortDescriptor::output("rectifiedRight", frame),
            ],
            NodeType::ImageManip => vec![
                PortDescriptor::input("inputImage", frame).required(),
                PortDescriptor::input("inputConfig", &[D::ImageManipConfig]),
                PortDescriptor::output("out", frame),
            ],
            NodeType::NeuralNetwork => vec![
                PortDescriptor::input("in", &[D::Buffer]).required(),
                PortDescriptor::output("out", &[D::NNData]),
                PortDescriptor::output("passthrough", &[D::Buffer]),
            ],
            NodeType::MobileNetDetectionNetwork | NodeType::YoloDetectionNetwork => vec![
                PortDescriptor::input("in", frame).required(),
                PortDescriptor::output("out", &[D::ImgDetections]),
                PortDescriptor::output("passthrough", frame),
            ],
            NodeType::MobileNetSpatialDetectionNetwork | NodeType::YoloSpatialDetectionNetwork => {
                vec![
                    PortDescriptor::input("in", frame).required(),
                    PortDescriptor::input("inputDepth", frame).required(),
                    PortDescriptor::output("out", &[D::SpatialImgDetections]),
                    PortDescriptor::output("passthrough", frame),
                    PortDescriptor::output("passthroughDepth", frame),
                    PortDescriptor::output(
                        "boundingBoxMapping",
                        &[D::SpatialLocationCalculatorConfig],
                    ),
                ]
            }
            NodeType::SpatialLocationCalculator => vec![
                PortDescriptor::input("inputConfig", &[D::SpatialLocationCalculatorConfig])
                    .non_blocking(4),
                PortDescriptor::input("inputDepth", frame).required(),
                PortDescriptor::output("out", &[D::SpatialLocationCalculatorData]),
                PortDescriptor::output("passthroughDepth", frame),
            ],
            NodeType::ObjectTracker => vec![
                PortDescriptor::input("inputTrackerFrame", frame).required(),
                PortDescriptor::input("inputDetectionFrame", frame).required(),
                PortDescriptor::input(
                    "inputDetections",
                    &[D::ImgDetections, D::SpatialImgDetections],
                )
                .required(),
                PortDescriptor::output("out", &[D::Tracklets]),
                PortDescriptor::output("passthroughTrackerFrame", frame),
                PortDescriptor::output("passthroughDetectionFrame", frame),
                PortDescriptor::output(
                    "passthroughDetections",
                    &[D::ImgDetections, D::SpatialImgDetections],
                ),
            ],
            NodeType::Script => Vec::new(),
            NodeType::XLinkIn => vec![PortDescriptor::output("out", &[D::Buffer])],
            NodeType::XLinkOut => vec![PortDescriptor::input("in", &[D::Buffer]).required()],
        }
    }

    /// Default property set for a freshly created node
    pub fn default_properties(&self) -> BTreeMap<String, PropertyValue> {
        let mut props = BTreeMap::new();
        let mut set = |key: &str, value: PropertyValue| {
            props.insert(key.to_string(), value);
        };

        match self {
            NodeType::ColorCamera => {
                set("boardSocket", "RGB".into());
                set("resolution", "1080p".into());
                set("previewWidth", 300i64.into());
                set("previewHeight", 300i64.into());
                set("interleaved", true.into());
                set("fps", 30.0f64.into());
            }
            NodeType::MonoCamera => {
                set("boardSocket", "LEFT".into());
                set("resolution", "400p".into());
                set("fps", 30.0f64.into());
            }
            NodeType::SystemLogger => {
                set("rateHz", 1.0f64.into());
            }
            NodeType::StereoDepth => {
                set("confidenceThreshold", 200i64.into());
                set("leftRightCheck", false.into());
                set("subpixel", false.into());
                set("extendedDisparity", false.into());
                set("depthAlign", "RIGHT".into());
            }
            NodeType::ImageManip => {
                set("resizeWidth", 0i64.into());
                set("resizeHeight", 0i64.into());
                set("keepAspectRatio", true.into());
                set("maxOutputFrameSize", (1024 * 1024i64).into());
            }
            NodeType::NeuralNetwork
            | NodeType::MobileNetDetectionNetwork
            | NodeType::YoloDetectionNetwork
            | NodeType::MobileNetSpatialDetectionNetwork
            | NodeType::YoloSpatialDetectionNetwork => {
                set("blobPath", "".into());
                set("numInferenceThreads", 2i64.into());
                set("numNCEPerInferenceThread", 0i64.into());
                if *self != NodeType::NeuralNetwork {
                    set("confidenceThreshold", 0.5f64.into());
                }
                if self.is_yolo() {
                    set("numClasses", 80i64.into());
                    set("coordinateSize", 4i64.into());
                    set("anchors", PropertyValue::List(Vec::new()));
                    set("anchorMasks", PropertyValue::Map(BTreeMap::new()));
                    set("iouThreshold", 0.5f64.into());
                }
                if self.is_spatial_network() {
                    set("boundingBoxScaleFactor", 1.0f64.into());
                    set("depthLowerThreshold", 0i64.into());
                    set("depthUpperThreshold", 65535i64.into());
                }
            }
            NodeType::SpatialLocationCalculator => {
                set("rois", PropertyValue::List(Vec::new()));
                set("waitForConfigInput", false.into());
            }
            NodeType::ObjectTracker => {
                set("trackerType", "ZERO_TERM_COLOR_HISTOGRAM".into());
                set("trackerIdAssigmentPolicy", "UNIQUE_ID".into());
                set("detectionLabelsToTrack", PropertyValue::List(Vec::new()));
            }
            NodeType::Script => {
                set("scriptName", "<script>".into());
                set("scriptData", "".into());
                set("processor", "LeonCss".into());
            }
            NodeType::XLinkIn => {
                set("streamName", "".into());
                set("maxDataSize", (5 * 1024 * 1024i64).into());
                set("numFrames", 8i64.into());
            }
            NodeType::XLinkOut => {
                set("streamName", "".into());
                set("fpsLimit", (-1.0f64).into());
                set("metadataOnly", false.into());
            }
        }
        props
    }

    /// Short description of the node
    pub fn description(&self) -> &'static str {
        match self {
            NodeType::ColorCamera => "Color camera; preview, video, still and ISP outputs",
            NodeType::MonoCamera => "Grayscale camera",
            NodeType::SystemLogger => "Periodic device resource report",
            NodeType::StereoDepth => "Depth from a left/right mono pair",
            NodeType::ImageManip => "Resize and crop frames",
            NodeType::NeuralNetwork => "Runs a network blob, emits raw tensors",
            NodeType::MobileNetDetectionNetwork => "MobileNet-SSD detections",
            NodeType::YoloDetectionNetwork => "YOLO detections",
            NodeType::MobileNetSpatialDetectionNetwork => "MobileNet-SSD detections with depth",
            NodeType::YoloSpatialDetectionNetwork => "YOLO detections with depth",
            NodeType::SpatialLocationCalculator => "Average depth over ROIs",
            NodeType::ObjectTracker => "Tracks detections across frames",
            NodeType::Script => "User script with dynamic ports",
            NodeType::XLinkIn => "Receives a host stream",
            NodeType::XLinkOut => "Sends a stream to the host",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for NodeType {
    type Err = VisLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::all()
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| VisLinkError::InvalidNodeType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_round_trip() {
        for t in NodeType::all() {
            assert_eq!(t.name().parse::<NodeType>().unwrap(), *t);
        }
        assert!(matches!(
            "Camera".parse::<NodeType>(),
            Err(VisLinkError::InvalidNodeType(_))
        ));
    }

    #[test]
    fn test_port_names_unique() {
        for t in NodeType::all() {
            let ports = t.ports();
            let mut names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), ports.len(), "{}", t);
        }
    }

    #[test]
    fn test_boundary_nodes_declare_stream_name() {
        for t in [NodeType::XLinkIn, NodeType::XLinkOut] {
            assert!(t.is_host_boundary());
            assert!(t.default_properties().contains_key("streamName"));
        }
        assert!(!NodeType::Script.is_host_boundary());
    }

    #[test]
    fn test_spatial_network_properties() {
        let props = NodeType::YoloSpatialDetectionNetwork.default_properties();
        for key in ["iouThreshold", "anchors", "depthLowerThreshold", "boundingBoxScaleFactor"] {
            assert!(props.contains_key(key), "{}", key);
        }
        assert!(!NodeType::MobileNetDetectionNetwork
            .default_properties()
            .contains_key("anchors"));
    }
}
