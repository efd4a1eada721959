use std::io::Write;
use std::time::Duration;

use dlt645_rs::dlt645::serial::Parity;
use dlt645_rs::{Dlt645Error, SerialConfig};
use tempfile::NamedTempFile;

#[test]
fn test_load_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "port": "/dev/ttyUSB1",
            "baudrate": 9600,
            "data_bits": 8,
            "parity": "odd",
            "stop_bits": 2,
            "timeout": 2000,
            "idle_timeout": 0,
            "slave_address": 304257140001
        }}"#
    )
    .unwrap();

    let config = SerialConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.port, "/dev/ttyUSB1");
    assert_eq!(config.baudrate, 9600);
    assert_eq!(config.parity, Parity::Odd);
    assert_eq!(config.stop_bits, 2);
    assert_eq!(config.timeout, Duration::from_secs(2));
    assert_eq!(config.idle_timeout, Duration::ZERO);
    assert_eq!(config.slave_address, 304_257_140_001);
}

#[test]
fn test_config_serializes_durations_as_millis() {
    let mut config = SerialConfig::new("COM3");
    config.timeout = Duration::from_millis(750);
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["timeout"], 750);
    assert_eq!(json["idle_timeout"], 60_000);
    assert_eq!(json["parity"], "even");

    let back = SerialConfig::from_json_str(&json.to_string()).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = SerialConfig::from_json_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(Dlt645Error::ConfigError(_))));
}

#[test]
fn test_invalid_config_values() {
    let result = SerialConfig::from_json_str(r#"{"port": "/dev/ttyS0", "data_bits": 4}"#);
    assert!(matches!(result, Err(Dlt645Error::ConfigError(_))));

    let result = SerialConfig::from_json_str(r#"{"slave_address": 1000000000000}"#);
    assert!(matches!(result, Err(Dlt645Error::ConfigError(_))));

    let result = SerialConfig::from_json_str(r#"{"parity": "mark"}"#);
    assert!(matches!(result, Err(Dlt645Error::ConfigError(_))));
}
