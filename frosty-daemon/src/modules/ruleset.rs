//! Ruleset manager initialization.
//!
//! Resolves the rules directory, builds one feed per configured source and
//! wraps them in a [`RulesetManager`] bound to the sensor's control socket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use frosty_core::config::{FEED_KIND_EMERGING_THREATS, FrostyConfig};
use frosty_ruleset::{EmergingThreatsFeed, RulesetManager, SensorControl, SocketSensor};

/// Rules directory used when neither the config nor the sensor names one.
pub const DEFAULT_RULES_DIR: &str = "/etc/suricata/rules";

/// Sensor configuration key holding its rules directory.
const RULE_PATH_VARIABLE: &str = "default-rule-path";

/// Build the ruleset manager.
///
/// Returns `None` if ruleset sync is disabled in configuration.
///
/// # Errors
///
/// - The sensor cannot be asked for its rules directory
/// - A source has an unknown kind or its HTTP client cannot be built
pub async fn init(
    config: &FrostyConfig,
    sensor: SocketSensor,
    sensor_version: &semver::Version,
) -> Result<Option<RulesetManager<SocketSensor>>> {
    if !config.ruleset.enabled {
        tracing::info!("ruleset sync disabled in configuration");
        return Ok(None);
    }

    let rules_dir = resolve_rules_dir(&config.ruleset.rules_dir, &sensor).await?;
    tracing::info!(
        rules_dir = %rules_dir.display(),
        sources = config.ruleset.sources.len(),
        "initializing ruleset manager"
    );

    let mut manager = RulesetManager::new(
        sensor,
        rules_dir,
        Duration::from_secs(config.ruleset.refresh_interval_secs),
    );
    let scratch_dir = Path::new(&config.ruleset.scratch_dir);
    let http_timeout = Duration::from_secs(config.ruleset.http_timeout_secs);

    for source in &config.ruleset.sources {
        if source.kind != FEED_KIND_EMERGING_THREATS {
            return Err(anyhow::anyhow!(
                "unknown feed kind '{}' for source '{}'",
                source.kind,
                source.name
            ));
        }
        let feed = EmergingThreatsFeed::new(source, sensor_version, scratch_dir, http_timeout)
            .map_err(|e| anyhow::anyhow!("failed to build feed '{}': {e}", source.name))?;
        tracing::debug!(source = %source.name, url = feed.url(), "rule feed configured");
        manager
            .add_feed(Box::new(feed))
            .map_err(|e| anyhow::anyhow!("failed to register feed '{}': {e}", source.name))?;
    }

    Ok(Some(manager))
}

/// Pick the rules directory: configured value, else the sensor's
/// `default-rule-path`, else [`DEFAULT_RULES_DIR`].
pub async fn resolve_rules_dir<S: SensorControl>(configured: &str, sensor: &S) -> Result<PathBuf> {
    if !configured.is_empty() {
        return Ok(PathBuf::from(configured));
    }
    let reported = sensor
        .conf_get(RULE_PATH_VARIABLE)
        .await
        .map_err(|e| anyhow::anyhow!("failed to query sensor {RULE_PATH_VARIABLE}: {e}"))?;
    Ok(match reported {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            tracing::info!(default = DEFAULT_RULES_DIR, "sensor has no {RULE_PATH_VARIABLE}");
            PathBuf::from(DEFAULT_RULES_DIR)
        }
    })
}
