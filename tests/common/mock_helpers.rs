//! Mock device helpers

use vislink_rs::config::DeviceConfig;
use vislink_rs::device::Device;
use vislink_rs::pipeline::Pipeline;
use vislink_rs::transport::{MockLink, MockLinkHandle};

/// Open `pipeline` on a fresh mock link
pub fn open_mock_device(pipeline: Pipeline, config: DeviceConfig) -> (Device, MockLinkHandle) {
    let (link, handle) = MockLink::new();
    let device = Device::open(pipeline, link, config).expect("open mock device");
    (device, handle)
}
