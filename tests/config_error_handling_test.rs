use anyhow::Result;
use nibe_exporter::config::Config;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// Write `contents` as a config file, check that loading fails with a message
/// containing `expected` and that a loadable sample file was written
fn assert_rejected(contents: &str, expected: &str) -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents)?;

    let err = Config::from_file(&config_path).expect_err("config should be rejected");
    let message = format!("{:#}", err);
    assert!(
        message.contains(expected),
        "error '{}' does not mention '{}'",
        message,
        expected
    );

    // The invalid file is left alone
    assert_eq!(fs::read_to_string(&config_path)?, contents);

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "Sample config file was not created"
    );
    assert_eq!(Config::from_file(&sample_path)?, Config::default());
    Ok(())
}

#[test]
fn test_schema_violation_creates_sample_file() -> Result<()> {
    assert_rejected(
        r#"
metrics:
  port: 99999
"#,
        "Configuration validation failed",
    )
}

#[test]
fn test_unknown_section_is_rejected() -> Result<()> {
    assert_rejected(
        r#"
visualization:
  port: 8080
"#,
        "Configuration validation failed",
    )
}

#[test]
fn test_type_mismatch_is_rejected() -> Result<()> {
    assert_rejected(
        r#"
device:
  port: "not-an-integer"
"#,
        "Configuration validation failed",
    )
}

#[test]
fn test_unsupported_encoding_is_rejected() -> Result<()> {
    assert_rejected(
        r#"
registers:
  - address: 1
    encoding: f32
    factor: 10
    name: outdoor_temperature
"#,
        "Unsupported register encoding 'f32'",
    )
}

#[test]
fn test_zero_factor_is_rejected() -> Result<()> {
    assert_rejected(
        r#"
registers:
  - address: 1
    encoding: s16
    factor: 0
    name: outdoor_temperature
"#,
        "Configuration validation failed",
    )
}

#[test]
fn test_duplicate_register_names_are_rejected() -> Result<()> {
    assert_rejected(
        r#"
registers:
  - address: 1
    encoding: s16
    factor: 10
    name: temperature
  - address: 5
    encoding: s16
    factor: 10
    name: temperature
"#,
        "duplicate register name 'temperature'",
    )
}

#[test]
fn test_tls_key_without_certificate_is_rejected() -> Result<()> {
    assert_rejected(
        r#"
metrics:
  key: "bm90IGEga2V5"
"#,
        "SSL key provided without a certificate",
    )
}

#[test]
fn test_invalid_yaml_is_an_error() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, "device: [unclosed")?;

    assert!(Config::from_file(&config_path).is_err());
    Ok(())
}
