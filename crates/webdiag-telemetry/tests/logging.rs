//! Global subscriber installation.
//!
//! Kept in a single test: the subscriber can be installed once per process.

use webdiag_telemetry::{init_logging, LogConfig, LogLevel, TelemetryError};

#[test]
fn test_init_logging_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("webdiag.log");

    let config = LogConfig::default()
        .with_level(LogLevel::Debug)
        .with_file(Some(path.clone()));
    init_logging(&config).unwrap();

    let span = tracing::info_span!("request", request_id = "qX3f9A0000000001");
    span.in_scope(|| tracing::debug!("hello handler"));

    let contents = std::fs::read_to_string(&path).unwrap();
    let records: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["fields"]["message"], "logging initialized");
    assert_eq!(records[0]["fields"]["level"], "debug");
    assert_eq!(records[0]["fields"]["format"], "json");
    assert_eq!(records[1]["level"], "DEBUG");
    assert_eq!(records[1]["span"]["request_id"], "qX3f9A0000000001");

    // A second installation is refused and leaves the first in place.
    let err = init_logging(&LogConfig::default()).unwrap_err();
    assert!(matches!(err, TelemetryError::LoggingInit(_)));

    tracing::debug!("still debug");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("still debug"));
}

#[test]
fn test_init_logging_unopenable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("webdiag.log");

    let config = LogConfig::default().with_file(Some(path));
    let err = init_logging(&config).unwrap_err();
    assert!(matches!(err, TelemetryError::LogFile { .. }));
}
