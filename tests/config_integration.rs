//! Integration tests for loading and saving device configs

mod common;

use vislink_rs::config::{BootMode, DeviceConfig, OverflowPolicy, TransportTarget};
use vislink_rs::queue::QueueOptions;
use vislink_rs::VisLinkError;

#[test]
fn test_load_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.toml");
    std::fs::write(
        &path,
        r#"
boot = "Usb2"
search_timeout_ms = 5000
expected_firmware = "1.2.3"

[transport]
Mxid = "14442C10D13EABCE00"

[default_queue]
max_size = 4
policy = "DropOldest"
"#,
    )
    .unwrap();

    let config = DeviceConfig::load(&path).unwrap();
    assert_eq!(
        config.transport,
        TransportTarget::Mxid("14442C10D13EABCE00".to_string())
    );
    assert_eq!(config.boot, BootMode::Usb2);
    assert_eq!(config.search_timeout().as_millis(), 5000);
    assert_eq!(config.default_queue, QueueOptions::drop_oldest(4));
    assert_eq!(config.expected_firmware.as_deref(), Some("1.2.3"));
    // Unset fields keep their defaults
    assert_eq!(
        config.event_queue_capacity,
        DeviceConfig::default().event_queue_capacity
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_save_and_reload_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("device.json");

    let config = DeviceConfig::default()
        .with_target(TransportTarget::Name("192.168.1.44".to_string()))
        .with_default_queue(QueueOptions::blocking(30));
    config.save(&path).unwrap();

    let loaded = DeviceConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.default_queue.policy, OverflowPolicy::Blocking);
}

#[test]
fn test_bad_files() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        DeviceConfig::load(&missing),
        Err(VisLinkError::Config(_))
    ));
    assert_eq!(DeviceConfig::load_or_default(&missing), DeviceConfig::default());

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{ not json").unwrap();
    assert!(matches!(
        DeviceConfig::load(&garbage),
        Err(VisLinkError::Config(_))
    ));
}

#[test]
fn test_validation() {
    let config = DeviceConfig::default().with_default_queue(QueueOptions::blocking(0));
    assert!(config.validate().is_err());

    let config = DeviceConfig {
        event_queue_capacity: 0,
        ..DeviceConfig::default()
    };
    assert!(config.validate().is_err());

    let config = DeviceConfig {
        boot: BootMode::CustomFirmware("/nonexistent/firmware.mvcmd".into()),
        ..DeviceConfig::default()
    };
    assert!(matches!(config.validate(), Err(VisLinkError::Config(_))));
}
