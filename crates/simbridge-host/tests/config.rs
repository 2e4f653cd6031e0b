use std::io::Write;

use simbridge_host::config::ENV_DATA_LOG_RATE_HZ;
use simbridge_host::{
    ConfigError, ConfiguredInput, HostConfig, HostError, InputSource, MarshalError, VariantKind,
};
use simbridge_sys::{CrashInput, DistanceInput};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_file_and_builds_constant_input() {
    let file = write_config(
        r#"{
            "variant": "crash",
            "input": { "kind": "constant", "values": { "speed": 40.0, "ay": -8.0 } }
        }"#,
    );
    let config = HostConfig::load(file.path()).expect("load");
    assert_eq!(config.variant, VariantKind::Crash);

    let mut source =
        ConfiguredInput::<CrashInput>::from_config("crash", &config.input, None).expect("input");
    let mut input = CrashInput::default();
    source.refresh(0.0, &mut input);
    assert_eq!(input.speed, 40.0);
    assert_eq!(input.ay, -8.0);
    assert_eq!(input.curr, 0.0);
}

#[test]
fn field_of_another_variant_aborts_startup() {
    let config = HostConfig::from_json(
        r#"{ "input": { "kind": "constant", "values": { "entropy_diff": 1.0 } } }"#,
    )
    .expect("parse");
    let err = ConfiguredInput::<DistanceInput>::from_config("distance", &config.input, None)
        .unwrap_err();
    assert!(matches!(
        err,
        HostError::Contract(MarshalError::UnknownField { variant: "distance", .. })
    ));
}

#[test]
fn random_field_ranges_apply() {
    let config = HostConfig::from_json(
        r#"{ "input": { "kind": "random", "range": [0.0, 1.0], "fields": { "speed": [50.0, 60.0] } } }"#,
    )
    .expect("parse");
    let mut source =
        ConfiguredInput::<CrashInput>::from_config("crash", &config.input, Some(11)).expect("input");
    let mut input = CrashInput::default();
    for step in 0..100 {
        source.refresh(step as f64, &mut input);
        assert!((50.0..60.0).contains(&input.speed));
        assert!((0.0..1.0).contains(&input.ay));
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = HostConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn environment_overrides_file_values() {
    let file = write_config(r#"{ "record_rate_hz": 1.0 }"#);
    let mut config = HostConfig::load(file.path()).expect("load");
    config
        .apply_vars([(ENV_DATA_LOG_RATE_HZ, "25")])
        .expect("apply");
    assert_eq!(config.record_rate_hz, 25.0);
}
