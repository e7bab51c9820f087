use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use frosty_core::FrostyConfig;
use frosty_daemon::cli::DaemonCli;
use frosty_daemon::logging;
use frosty_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = DaemonCli::parse();

    let mut config = FrostyConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    if cli.validate {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "frosty-daemon starting"
    );

    let orchestrator = Orchestrator::build_from_config(config).await?;
    let report = orchestrator.run().await?;

    if report.graceful {
        tracing::info!("frosty-daemon shut down");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(trigger = %report.trigger, "frosty-daemon shut down abnormally");
        Ok(ExitCode::FAILURE)
    }
}
