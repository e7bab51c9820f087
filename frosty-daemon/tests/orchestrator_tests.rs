//! Orchestrator bootstrap and end-to-end lifecycle tests.
//!
//! A fake sensor socket and a temporary event log stand in for the sensor.
//! Ruleset sync is disabled where a test would otherwise reach the network.

mod common;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use frosty_core::config::FrostyConfig;
use frosty_daemon::modules::ruleset::{DEFAULT_RULES_DIR, resolve_rules_dir};
use frosty_daemon::orchestrator::Orchestrator;
use frosty_ruleset::SocketSensor;

use common::{RecordingTransport, spawn_sensor};

fn config_for(dir: &Path, socket: &Path) -> FrostyConfig {
    let mut config = FrostyConfig::default();
    config.general.pid_file = dir.join("frosty.pid").display().to_string();
    config.sensor.control_socket = socket.display().to_string();
    config.sensor.event_log = dir.join("eve.json").display().to_string();
    config.sensor.command_timeout_secs = 5;
    config.pipeline.watch_timeout_ms = 100;
    config.ruleset.enabled = false;
    config.supervisor.poll_interval_ms = 50;
    config.supervisor.stop_timeout_secs = 5;
    config
}

fn append(path: &Path, text: &str) {
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .expect("should open event log");
    f.write_all(text.as_bytes()).expect("should append to event log");
}

#[tokio::test]
async fn test_build_fails_when_sensor_unreachable() {
    // Given: A config pointing at a socket nobody listens on
    let dir = tempfile::tempdir().expect("should create temp dir");
    let config = config_for(dir.path(), &dir.path().join("missing.socket"));

    // When: Building the orchestrator
    let result =
        Orchestrator::build_with_transport(config, Arc::new(RecordingTransport::default())).await;

    // Then: Startup is refused
    let err = result.err().expect("build should fail").to_string();
    assert!(err.contains("failed to talk to sensor"), "got: {err}");
}

#[tokio::test]
async fn test_build_reads_sensor_version() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let socket = spawn_sensor(dir.path(), None);
    let config = config_for(dir.path(), &socket);

    let orchestrator =
        Orchestrator::build_with_transport(config, Arc::new(RecordingTransport::default()))
            .await
            .expect("build should succeed");

    assert_eq!(orchestrator.sensor_version(), &semver_7_0_2());
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let socket = spawn_sensor(dir.path(), None);
    let mut config = config_for(dir.path(), &socket);
    config.pipeline.batch_limit = 0;

    let result =
        Orchestrator::build_with_transport(config, Arc::new(RecordingTransport::default())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_rules_dir_falls_back_when_sensor_has_none() {
    // Given: A sensor that answers NOK to conf-get
    let dir = tempfile::tempdir().expect("should create temp dir");
    let socket = spawn_sensor(dir.path(), None);
    let sensor = SocketSensor::new(&socket, Duration::from_secs(5));

    // When/Then: The built-in default is used
    let resolved = resolve_rules_dir("", &sensor).await.expect("should resolve");
    assert_eq!(resolved, Path::new(DEFAULT_RULES_DIR));
}

#[tokio::test]
async fn test_rules_dir_comes_from_sensor_or_config() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let socket = spawn_sensor(dir.path(), Some("/var/lib/suricata/rules"));
    let sensor = SocketSensor::new(&socket, Duration::from_secs(5));

    let from_sensor = resolve_rules_dir("", &sensor).await.expect("should resolve");
    assert_eq!(from_sensor, Path::new("/var/lib/suricata/rules"));

    let configured = resolve_rules_dir("/opt/rules", &sensor).await.expect("should resolve");
    assert_eq!(configured, Path::new("/opt/rules"));
}

#[tokio::test]
async fn test_alert_is_forwarded_then_signal_shuts_down_gracefully() {
    // Given: A running daemon with a fake sensor and an empty event log
    let dir = tempfile::tempdir().expect("should create temp dir");
    let socket = spawn_sensor(dir.path(), None);
    let config = config_for(dir.path(), &socket);
    let log = dir.path().join("eve.json");
    append(&log, "");
    let pid_file = dir.path().join("frosty.pid");

    let transport = Arc::new(RecordingTransport::default());
    let orchestrator = Orchestrator::build_with_transport(config, Arc::clone(&transport))
        .await
        .expect("build should succeed");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        let _ = stop_rx.await;
        "SIGTERM"
    };

    let driver = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(pid_file.exists(), "PID file should exist while running");

        // When: The sensor logs an alert
        append(
            &log,
            "{\"event_type\":\"alert\",\"alert\":{\"signature\":\"ET POLICY curl\"},\"flow_id\":42,\
             \"flow\":{\"start\":\"2024-01-01T00:00:00\"},\"timestamp\":\"2024-01-01T00:00:05\"}\n",
        );
        for _ in 0..100 {
            if !transport.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let _ = stop_tx.send(());
    };

    let (report, ()) = tokio::join!(orchestrator.run_until(shutdown), driver);
    let report = report.expect("run should succeed");

    // Then: One notification was delivered and the shutdown was graceful
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("ET POLICY curl"));
    assert!(report.graceful, "report: {report:?}");
    assert_eq!(report.workers.len(), 2);
    assert!(!pid_file.exists(), "PID file should be removed at exit");
}

#[tokio::test]
async fn test_missing_event_log_is_not_graceful() {
    // Given: An event log that does not exist
    let dir = tempfile::tempdir().expect("should create temp dir");
    let socket = spawn_sensor(dir.path(), None);
    let config = config_for(dir.path(), &socket);

    let transport = Arc::new(RecordingTransport::default());
    let orchestrator = Orchestrator::build_with_transport(config, Arc::clone(&transport))
        .await
        .expect("build should succeed");

    // When: Running with no signal
    let report = orchestrator
        .run_until(std::future::pending::<&'static str>())
        .await
        .expect("run should succeed");

    // Then: The tailer failure stopped everything and one notice went out
    assert!(!report.graceful);
    assert_eq!(report.notice_delivered, Some(true));
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.ends_with("frosty shutdown was not graceful"));
}

fn semver_7_0_2() -> semver::Version {
    semver::Version::new(7, 0, 2)
}
