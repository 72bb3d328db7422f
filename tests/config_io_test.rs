use eos::config::Config;
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.gateway.base_url = "http://10.0.0.5:8123".to_string();
    cfg.charger.maximum_amps = 20.0;
    cfg.prices.area = "SE3".to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.gateway.base_url, "http://10.0.0.5:8123");
    assert_eq!(loaded.charger.maximum_amps, 20.0);
    assert_eq!(loaded.prices.area, "SE3");
}

#[test]
fn partial_yaml_fills_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"charger:\n  minimum_amps: 8.0\nsafety:\n  fuse_setpoint_amps: 25.0\n",
    )
    .unwrap();

    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.charger.minimum_amps, 8.0);
    assert_eq!(cfg.charger.maximum_amps, 16.0);
    assert_eq!(cfg.safety.fuse_setpoint_amps, 25.0);
    assert_eq!(cfg.safety.restart_headroom_amps, 8.0);
    assert_eq!(cfg.gateway.poll_interval_ms, 1000);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // Empty gateway URL
    cfg.gateway.base_url.clear();
    assert!(cfg.validate().is_err());

    // Zero poll interval
    cfg = Config::default();
    cfg.gateway.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());

    // No phase sensors
    cfg = Config::default();
    cfg.charger.phase_entities.clear();
    assert!(cfg.validate().is_err());

    // Inverted amp range
    cfg = Config::default();
    cfg.charger.minimum_amps = 16.0;
    cfg.charger.maximum_amps = 6.0;
    assert!(cfg.validate().is_err());

    // Non-positive fuse setpoint
    cfg = Config::default();
    cfg.safety.fuse_setpoint_amps = -1.0;
    assert!(cfg.validate().is_err());

    // Zero decision interval
    cfg = Config::default();
    cfg.safety.decision_interval_seconds = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
