//! Daemon bootstrap -- sensor discovery, worker assembly, and lifecycle.
//!
//! The [`Orchestrator`] is the central coordinator of `frosty-daemon`.
//! It validates configuration, talks to the sensor once to learn its version
//! and rules directory, builds the three workers, and hands them to the
//! [`Supervisor`].
//!
//! # Startup Order
//!
//! 1. RulesetManager (installs current rules, reloads the sensor)
//! 2. Notifier (waits on the alert queue)
//! 3. Tailer (starts reading the event log at its end)
//!
//! # Shutdown Order (producers first)
//!
//! 1. Tailer and RulesetManager
//! 2. Notifier (drains alerts still queued)

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use frosty_core::config::FrostyConfig;
use frosty_eve_pipeline::{Notifier, SmtpTransport, Tailer, Transport};
use frosty_ruleset::{RulesetManager, SensorControl, SocketSensor};

use crate::metrics_server;
use crate::modules::{self, WorkerRegistry, WorkerRole};
use crate::supervisor::{Supervisor, SupervisorReport};

/// The main daemon orchestrator.
///
/// Holds the built but not yet running workers.
pub struct Orchestrator<T: Transport = SmtpTransport> {
    /// Loaded and validated configuration.
    config: FrostyConfig,
    /// Sensor version reported at startup.
    sensor_version: semver::Version,
    /// Shared by the tailer, notifier and supervisor.
    transport: Arc<T>,
    tailer: Tailer<T>,
    notifier: Notifier<T>,
    /// `None` when ruleset sync is disabled.
    ruleset: Option<RulesetManager<SocketSensor>>,
}

impl Orchestrator<SmtpTransport> {
    /// Load configuration from `config_path` and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = FrostyConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration, delivering over SMTP.
    pub async fn build_from_config(config: FrostyConfig) -> Result<Self> {
        let transport = Arc::new(SmtpTransport::from_config(&config.notify));
        Self::build_with_transport(config, transport).await
    }
}

impl<T: Transport> Orchestrator<T> {
    /// Build from configuration with a caller-provided transport.
    ///
    /// # Errors
    ///
    /// - Configuration validation fails
    /// - The sensor does not answer `version` on its control socket
    /// - Any worker fails to initialize
    pub async fn build_with_transport(config: FrostyConfig, transport: Arc<T>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let sensor = SocketSensor::from_config(&config.sensor);
        let sensor_version = sensor.version().await.map_err(|e| {
            anyhow::anyhow!(
                "failed to talk to sensor on {}: {e}",
                config.sensor.control_socket
            )
        })?;
        tracing::info!(
            version = %sensor_version,
            socket = %config.sensor.control_socket,
            "sensor reachable"
        );

        let ruleset = modules::ruleset::init(&config, sensor, &sensor_version).await?;
        let (tailer, notifier) = modules::eve_pipeline::init(&config, Arc::clone(&transport))?;

        tracing::info!(
            workers = if ruleset.is_some() { 3 } else { 2 },
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            sensor_version,
            transport,
            tailer,
            notifier,
            ruleset,
        })
    }

    /// Sensor version reported at startup.
    pub fn sensor_version(&self) -> &semver::Version {
        &self.sensor_version
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &FrostyConfig {
        &self.config
    }

    /// Start all workers and supervise them until SIGTERM/SIGINT or the first
    /// worker stops.
    pub async fn run(self) -> Result<SupervisorReport> {
        let shutdown = shutdown_signal()?;
        self.run_until(shutdown).await
    }

    /// Start all workers and supervise them until `shutdown` resolves or the
    /// first worker stops.
    pub async fn run_until(
        self,
        shutdown: impl std::future::Future<Output = &'static str>,
    ) -> Result<SupervisorReport> {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        let mut workers = WorkerRegistry::new();
        if let Some(ruleset) = self.ruleset {
            workers.spawn(ruleset, WorkerRole::Producer);
        }
        workers.spawn(self.notifier, WorkerRole::Consumer);
        workers.spawn(self.tailer, WorkerRole::Producer);
        record_daemon_metrics(workers.count());

        let supervisor = Supervisor::new(
            workers,
            self.transport,
            self.config.notify.subject.clone(),
            &self.config.supervisor,
        );
        let report = supervisor.run(shutdown).await;

        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }
        Ok(report)
    }
}

/// Install SIGTERM and SIGINT handlers and return a future that resolves to
/// the name of the first one received.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
fn shutdown_signal() -> Result<impl std::future::Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file
/// - Creates parent directory with restrictive permissions (0o700)
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new().mode(0o700).recursive(true).create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{pid}")?;

    tracing::info!(pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info, workers started).
fn record_daemon_metrics(worker_count: usize) {
    use frosty_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    metrics::gauge!(m::DAEMON_WORKERS_RUNNING).set(worker_count as f64);
}
