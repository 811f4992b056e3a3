//! Integration tests for loading rig configuration from disk.

use cbla_daq::config::RigConfig;
use cbla_daq::series::PlotKind;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_partial_file() {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
        [connection]
        com_port = "/dev/ttyACM0"

        [timing]
        acquisition_period_ms = 20
        "#
    )
    .expect("write config");

    let config = RigConfig::load_from(file.path()).expect("load config");
    assert_eq!(config.connection.com_port, "/dev/ttyACM0");
    assert_eq!(config.connection.serial_number, 141960);
    assert_eq!(config.timing.acquisition_period_ms, 20);
    assert_eq!(config.timing.presentation_period_ms, 100);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = RigConfig::load_from(dir.path().join("absent.toml")).expect("load config");
    assert_eq!(config.learner, RigConfig::default().learner);
}

#[test]
fn test_bundled_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/cbla.toml");
    let config = RigConfig::load_from(path).expect("load bundled config");
    config.validate().expect("bundled config validates");
    assert_eq!(
        config.plots.enabled,
        vec![PlotKind::ExpertNumber, PlotKind::PredictionError]
    );
    assert_eq!(config.learner.cycle_time, 100);
}

#[test]
fn test_validation_rejects_empty_port() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "[connection]\ncom_port = \"  \"").expect("write config");

    let config = RigConfig::load_from(file.path()).expect("load config");
    let err = config.validate().expect_err("empty port rejected");
    assert!(err.to_string().contains("com_port"));
}
