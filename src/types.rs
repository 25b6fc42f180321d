//! Core data types for vislink-rs
//!
//! This module contains the messages exchanged with the device and the
//! datatype hierarchy used to type-check links between node ports.
//!
//! # Main Types
//!
//! - [`Datatype`] - Kind of message a port produces or accepts
//! - [`Payload`] - Typed message body (frame, detections, control, ...)
//! - [`Message`] - Payload plus stream tag, sequence number and timestamp
//! - [`ConnectionStatus`] / [`LinkStats`] - Device session state and counters
//!
//! # Datatype Hierarchy
//!
//! Every message kind derives from [`Datatype::Buffer`]. A port that accepts
//! `Buffer` accepts any message; otherwise the kinds must match exactly.
//!
//! # Wire Encoding
//!
//! Messages travel over the transport as JSON-encoded bytes
//! ([`Message::encode`] / [`Message::decode`]). The stream tag is carried by
//! the transport packet, not by the encoded body.

use crate::error::{Result, VisLinkError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Kind of message flowing through a port
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Datatype {
    /// Raw bytes; supertype of every other kind
    Buffer,
    /// Image frame
    ImgFrame,
    /// Raw neural network output tensors
    NNData,
    /// 2D detections
    ImgDetections,
    /// Detections with spatial coordinates
    SpatialImgDetections,
    /// Spatial location calculator results
    SpatialLocationCalculatorData,
    /// Spatial location calculator ROIs
    SpatialLocationCalculatorConfig,
    /// Camera control commands
    CameraControl,
    /// Image manipulation configuration
    ImageManipConfig,
    /// Device resource usage report
    SystemInformation,
    /// Object tracker output
    Tracklets,
}

impl Datatype {
    /// Whether a message of this kind may be delivered to a port declaring `target`
    pub fn is_assignable_to(self, target: Datatype) -> bool {
        self == target || target == Datatype::Buffer
    }

    /// Name of this datatype
    pub fn name(&self) -> &'static str {
        match self {
            Datatype::Buffer => "Buffer",
            Datatype::ImgFrame => "ImgFrame",
            Datatype::NNData => "NNData",
            Datatype::ImgDetections => "ImgDetections",
            Datatype::SpatialImgDetections => "SpatialImgDetections",
            Datatype::SpatialLocationCalculatorData => "SpatialLocationCalculatorData",
            Datatype::SpatialLocationCalculatorConfig => "SpatialLocationCalculatorConfig",
            Datatype::CameraControl => "CameraControl",
            Datatype::ImageManipConfig => "ImageManipConfig",
            Datatype::SystemInformation => "SystemInformation",
            Datatype::Tracklets => "Tracklets",
        }
    }
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Format a datatype list as `A, B, C`
pub fn format_datatypes(types: &[Datatype]) -> String {
    types
        .iter()
        .map(Datatype::name)
        .collect::<Vec<_>>()
        .join(", ")
}

// ==================== Payloads ====================

/// Raw byte buffer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBuffer {
    pub data: Vec<u8>,
}

/// Pixel layout of an [`ImgFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameType {
    Yuv420p,
    Nv12,
    Rgb888p,
    #[default]
    Bgr888p,
    Rgb888i,
    Bgr888i,
    Raw8,
    Raw16,
    Gray8,
}

/// Image frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImgFrame {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub frame_type: FrameType,
    /// Camera instance that produced the frame
    pub instance_num: u32,
    pub category: u32,
    pub data: Vec<u8>,
}

impl ImgFrame {
    /// Create an empty frame of the given geometry
    pub fn new(width: u32, height: u32, frame_type: FrameType) -> Self {
        Self {
            width,
            height,
            stride: width,
            frame_type,
            ..Default::default()
        }
    }

    /// Attach pixel data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set width; stride follows width
    pub fn set_width(&mut self, width: u32) {
        self.width = width;
        self.stride = width;
    }
}

/// Normalized or pixel-space rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top_left(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn bottom_right(&self) -> (f32, f32) {
        (self.x + self.width, self.y + self.height)
    }

    /// Scale a normalized rectangle to pixel coordinates
    pub fn denormalize(&self, width: u32, height: u32) -> Rect {
        let (w, h) = (width as f32, height as f32);
        Rect::new(self.x * w, self.y * h, self.width * w, self.height * h)
    }
}

/// Point in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Single 2D detection, normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImgDetection {
    pub label: u32,
    pub confidence: f32,
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImgDetections {
    pub detections: Vec<ImgDetection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialImgDetection {
    pub detection: ImgDetection,
    pub spatial_coordinates: Point3f,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialImgDetections {
    pub detections: Vec<SpatialImgDetection>,
}

/// Depth range used when averaging a ROI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthThresholds {
    pub lower_mm: u32,
    pub upper_mm: u32,
}

impl Default for DepthThresholds {
    fn default() -> Self {
        Self {
            lower_mm: 0,
            upper_mm: 65535,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialLocationRoi {
    pub roi: Rect,
    pub thresholds: DepthThresholds,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialLocationCalculatorConfig {
    pub rois: Vec<SpatialLocationRoi>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialLocation {
    pub roi: Rect,
    pub depth_average: f32,
    pub spatial_coordinates: Point3f,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialLocationCalculatorData {
    pub locations: Vec<SpatialLocation>,
}

/// Output tensors keyed by layer name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NNData {
    pub layers: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraCommand {
    AutoFocusTrigger,
    ManualFocus(u8),
    AutoExposure,
    ManualExposure { exposure_us: u32, iso: u32 },
    CaptureStill,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraControl {
    pub commands: Vec<CameraCommand>,
}

impl CameraControl {
    pub fn with_command(mut self, command: CameraCommand) -> Self {
        self.commands.push(command);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageManipConfig {
    pub resize: Option<(u32, u32)>,
    pub crop: Option<Rect>,
    pub keep_aspect_ratio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub used: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemInformation {
    pub ddr_memory_usage: MemoryInfo,
    pub cmx_memory_usage: MemoryInfo,
    pub leon_css_memory_usage: MemoryInfo,
    pub leon_mss_memory_usage: MemoryInfo,
    pub leon_css_cpu_usage: f32,
    pub leon_mss_cpu_usage: f32,
    pub chip_temperature_avg: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingStatus {
    #[default]
    New,
    Tracked,
    Lost,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tracklet {
    pub id: u32,
    pub label: u32,
    pub roi: Rect,
    pub status: TrackingStatus,
    pub spatial_coordinates: Point3f,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tracklets {
    pub tracklets: Vec<Tracklet>,
}

/// Typed message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    Buffer(RawBuffer),
    ImgFrame(ImgFrame),
    NNData(NNData),
    ImgDetections(ImgDetections),
    SpatialImgDetections(SpatialImgDetections),
    SpatialLocationCalculatorData(SpatialLocationCalculatorData),
    SpatialLocationCalculatorConfig(SpatialLocationCalculatorConfig),
    CameraControl(CameraControl),
    ImageManipConfig(ImageManipConfig),
    SystemInformation(SystemInformation),
    Tracklets(Tracklets),
}

impl Payload {
    /// Datatype of this payload
    pub fn datatype(&self) -> Datatype {
        match self {
            Payload::Buffer(_) => Datatype::Buffer,
            Payload::ImgFrame(_) => Datatype::ImgFrame,
            Payload::NNData(_) => Datatype::NNData,
            Payload::ImgDetections(_) => Datatype::ImgDetections,
            Payload::SpatialImgDetections(_) => Datatype::SpatialImgDetections,
            Payload::SpatialLocationCalculatorData(_) => Datatype::SpatialLocationCalculatorData,
            Payload::SpatialLocationCalculatorConfig(_) => {
                Datatype::SpatialLocationCalculatorConfig
            }
            Payload::CameraControl(_) => Datatype::CameraControl,
            Payload::ImageManipConfig(_) => Datatype::ImageManipConfig,
            Payload::SystemInformation(_) => Datatype::SystemInformation,
            Payload::Tracklets(_) => Datatype::Tracklets,
        }
    }

    /// Size of the bulk data carried by this payload, in bytes
    pub fn data_len(&self) -> usize {
        match self {
            Payload::Buffer(b) => b.data.len(),
            Payload::ImgFrame(f) => f.data.len(),
            Payload::NNData(nn) => nn.layers.values().map(|l| l.len() * 4).sum(),
            _ => 0,
        }
    }
}

/// Payload structs that can be extracted from a [`Payload`]
pub trait MessageKind: Sized {
    const DATATYPE: Datatype;

    fn from_payload_ref(payload: &Payload) -> Option<&Self>;

    /// Take ownership, handing the payload back if it is another kind
    fn from_payload(payload: Payload) -> std::result::Result<Self, Payload>;
}

macro_rules! message_kind {
    ($($ty:ident),* $(,)?) => {
        $(
            impl MessageKind for $ty {
                const DATATYPE: Datatype = Datatype::$ty;

                fn from_payload_ref(payload: &Payload) -> Option<&Self> {
                    match payload {
                        Payload::$ty(v) => Some(v),
                        _ => None,
                    }
                }

                fn from_payload(payload: Payload) -> std::result::Result<Self, Payload> {
                    match payload {
                        Payload::$ty(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }

            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$ty(value)
                }
            }

            impl From<$ty> for Message {
                fn from(value: $ty) -> Self {
                    Message::new(value)
                }
            }
        )*
    };
}

message_kind!(
    ImgFrame,
    NNData,
    ImgDetections,
    SpatialImgDetections,
    SpatialLocationCalculatorData,
    SpatialLocationCalculatorConfig,
    CameraControl,
    ImageManipConfig,
    SystemInformation,
    Tracklets,
);

impl MessageKind for RawBuffer {
    const DATATYPE: Datatype = Datatype::Buffer;

    fn from_payload_ref(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Buffer(v) => Some(v),
            _ => None,
        }
    }

    fn from_payload(payload: Payload) -> std::result::Result<Self, Payload> {
        match payload {
            Payload::Buffer(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl From<RawBuffer> for Payload {
    fn from(value: RawBuffer) -> Self {
        Payload::Buffer(value)
    }
}

impl From<RawBuffer> for Message {
    fn from(value: RawBuffer) -> Self {
        Message::new(value)
    }
}

// ==================== Message ====================

/// A typed message with stream metadata.
///
/// Immutable once enqueued: output queues hand out `Arc<Message>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stream tag; filled from the transport packet or the input queue name
    #[serde(skip)]
    pub stream: String,
    /// Monotonic per stream
    pub sequence_num: u64,
    /// Time since the producing session started
    pub timestamp: Duration,
    pub payload: Payload,
}

impl Message {
    /// Create a message; stream, sequence number and timestamp are assigned on send
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            stream: String::new(),
            sequence_num: 0,
            timestamp: Duration::ZERO,
            payload: payload.into(),
        }
    }

    pub fn with_sequence_num(mut self, sequence_num: u64) -> Self {
        self.sequence_num = sequence_num;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn datatype(&self) -> Datatype {
        self.payload.datatype()
    }

    /// Borrow the payload as a specific kind
    pub fn payload_as<T: MessageKind>(&self) -> Option<&T> {
        T::from_payload_ref(&self.payload)
    }

    /// Encode the message body for transmission
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VisLinkError::Serialization(format!("Failed to encode message: {}", e)))
    }

    /// Decode a message body received on `stream`
    pub fn decode(stream: &str, bytes: &[u8]) -> Result<Self> {
        let mut message: Message = serde_json::from_slice(bytes).map_err(|e| {
            VisLinkError::Serialization(format!(
                "Failed to decode message on stream '{}': {}",
                stream, e
            ))
        })?;
        message.stream = stream.to_string();
        Ok(message)
    }
}

// ==================== Session state ====================

/// Device connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected to any device
    #[default]
    Disconnected,
    /// Connected and pipeline running
    Connected,
    /// Transport failed during the session
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Statistics about the host↔device link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Messages routed into output queues
    pub messages_received: u64,
    /// Messages written to the transport
    pub messages_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    /// Messages evicted by DropOldest queues (both directions)
    pub dropped_messages: u64,
    /// Callback invocations that panicked
    pub callback_failures: u64,
    /// Packets whose stream has no output queue
    pub unknown_stream_packets: u64,
    /// Packets that failed to decode
    pub decode_errors: u64,
    /// Events discarded because the event backlog was full
    pub dropped_events: u64,
}
