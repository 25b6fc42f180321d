//! vislink demo - Main Entry Point
//!
//! Builds a spatial object detection pipeline, prints its descriptor and runs
//! it against the in-memory mock device.
//!
//! ```text
//! vislink [--frames N] [--log-file PATH]
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vislink_rs::{
    config::DeviceConfig,
    device::Device,
    pipeline::{NodeType, Pipeline},
    transport::MockLink,
    types::{
        CameraCommand, CameraControl, FrameType, ImgDetection, ImgFrame, Message, Point3f,
        SpatialImgDetection, SpatialImgDetections,
    },
};

#[derive(Parser)]
#[command(name = "vislink")]
#[command(version, about = "Run a spatial detection pipeline on the mock device", long_about = None)]
struct Args {
    /// Number of frames the mock device produces
    #[arg(long, default_value_t = 5)]
    frames: u32,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Camera + stereo depth feeding a spatial MobileNet detector
fn build_pipeline() -> vislink_rs::Result<Pipeline> {
    let mut p = Pipeline::new();

    let cam = p.create_node_with(
        NodeType::ColorCamera,
        [("previewWidth", 300i64), ("previewHeight", 300i64)],
    )?;
    let left = p.create_node_with(NodeType::MonoCamera, [("boardSocket", "LEFT")])?;
    let right = p.create_node_with(NodeType::MonoCamera, [("boardSocket", "RIGHT")])?;
    let stereo = p.create_node(NodeType::StereoDepth)?;
    let nn = p.create_node(NodeType::MobileNetSpatialDetectionNetwork)?;
    p.set_property(nn, "blobPath", "mobilenet-ssd_openvino_2021.4_6shave.blob")?;
    p.set_property(nn, "confidenceThreshold", 0.5f64)?;

    let xout_rgb = p.create_node(NodeType::XLinkOut)?;
    let xout_nn = p.create_node(NodeType::XLinkOut)?;
    let xin_ctrl = p.create_node(NodeType::XLinkIn)?;
    p.set_stream_name(xout_rgb, "rgb")?;
    p.set_stream_name(xout_nn, "detections")?;
    p.set_stream_name(xin_ctrl, "control")?;
    p.set_property(xin_ctrl, "maxDataSize", 1024i64)?;

    p.link(left.port("out"), stereo.port("left"))?;
    p.link(right.port("out"), stereo.port("right"))?;
    p.link(cam.port("preview"), nn.port("in"))?;
    p.link(stereo.port("depth"), nn.port("inputDepth"))?;
    p.link(nn.port("passthrough"), xout_rgb.port("in"))?;
    p.link(nn.port("out"), xout_nn.port("in"))?;
    p.link(xin_ctrl.port("out"), cam.port("inputControl"))?;
    p.set_input_queue(&nn.port("in"), false, 1)?;

    Ok(p)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let (file_layer, _guard) = match &args.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("--log-file needs a file name")?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,vislink_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("Starting vislink demo");

    let pipeline = build_pipeline().context("building pipeline")?;
    let descriptor = pipeline.serialize().context("serializing pipeline")?;
    println!(
        "Pipeline: {} nodes, {} links, {} byte descriptor (OpenVINO {})",
        pipeline.node_count(),
        pipeline.link_count(),
        descriptor.len(),
        descriptor.openvino_version
    );
    println!(
        "  active {}/{} nodes, {} sources, {} sinks",
        descriptor.stats.active_nodes,
        descriptor.stats.total_nodes,
        descriptor.stats.source_nodes,
        descriptor.stats.sink_nodes
    );
    for stream in &descriptor.streams {
        println!("  stream '{}' {:?}", stream.name, stream.direction);
    }

    let (link, handle) = MockLink::new();
    let device = Device::open(pipeline, link, DeviceConfig::default())?;
    println!("Opened {}", device.device_info());

    // Play the device side: one frame and one detection set per tick
    let frames = args.frames;
    let feeder_handle = handle.clone();
    let feeder = thread::Builder::new()
        .name("mock-device".into())
        .spawn(move || -> vislink_rs::Result<()> {
            for i in 0..frames {
                let seq = u64::from(i);
                let frame = ImgFrame::new(300, 300, FrameType::Bgr888p)
                    .with_data(vec![0; 300 * 300 * 3]);
                feeder_handle.deliver("rgb", &Message::new(frame).with_sequence_num(seq))?;

                let detections = SpatialImgDetections {
                    detections: vec![SpatialImgDetection {
                        detection: ImgDetection {
                            label: 15,
                            confidence: 0.9,
                            xmin: 0.2,
                            ymin: 0.1,
                            xmax: 0.6,
                            ymax: 0.9,
                        },
                        spatial_coordinates: Point3f {
                            x: -120.0,
                            y: 40.0,
                            z: 1500.0 + 100.0 * i as f32,
                        },
                    }],
                };
                feeder_handle.deliver(
                    "detections",
                    &Message::new(detections).with_sequence_num(seq),
                )?;
                thread::sleep(Duration::from_millis(30));
            }
            Ok(())
        })?;

    let rgb = device.get_output_queue("rgb")?;
    let detections = device.get_output_queue("detections")?;
    let mut remaining = 2 * frames as usize;
    while remaining > 0 {
        let events = device.get_queue_events_all(remaining, Some(Duration::from_secs(2)))?;
        if events.is_empty() {
            tracing::warn!("Timed out waiting for messages");
            break;
        }
        for name in events {
            remaining -= 1;
            match name.as_str() {
                "rgb" => {
                    if let Some(frame) = rgb.try_get_as::<ImgFrame>()? {
                        println!("rgb: {}x{} frame", frame.width, frame.height);
                    }
                }
                "detections" => {
                    if let Some(dets) = detections.try_get_as::<SpatialImgDetections>()? {
                        for det in &dets.detections {
                            println!(
                                "detections: label {} ({:.0}%) at z={:.0}mm",
                                det.detection.label,
                                det.detection.confidence * 100.0,
                                det.spatial_coordinates.z
                            );
                        }
                    }
                }
                other => tracing::debug!("Event for '{}'", other),
            }
        }
    }

    match feeder.join() {
        Ok(result) => result?,
        Err(_) => bail!("mock device thread panicked"),
    }

    // Host → device
    device
        .get_input_queue("control")?
        .send(CameraControl::default().with_command(CameraCommand::AutoFocusTrigger))?;
    if let Some(sent) = handle.recv_transmitted(Duration::from_secs(1)) {
        println!("device received {} on '{}'", sent.datatype(), sent.stream);
    }

    let stats = device.stats();
    println!(
        "Link: {} in / {} out, {} dropped",
        stats.messages_received, stats.messages_sent, stats.dropped_messages
    );

    tracing::info!("Shutting down...");
    device.close();
    Ok(())
}
