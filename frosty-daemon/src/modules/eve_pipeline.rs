//! Event pipeline initialization.
//!
//! Builds the Tailer and Notifier from `FrostyConfig` around one bounded
//! alert queue.
//!
//! # Wiring
//!
//! ```text
//! eve.json --> Tailer --AlertEvent--> AlertQueue --> Notifier --> Transport
//!                 \                                                  ^
//!                  `------------- error cap notice -----------------'
//! ```

use std::sync::Arc;

use anyhow::Result;

use frosty_core::config::FrostyConfig;
use frosty_eve_pipeline::{EvePipelineBuilder, Notifier, Tailer, Transport};

/// Build the tailer and notifier workers sharing `transport`.
pub fn init<T: Transport>(
    config: &FrostyConfig,
    transport: Arc<T>,
) -> Result<(Tailer<T>, Notifier<T>)> {
    tracing::info!(
        event_log = %config.sensor.event_log,
        queue_capacity = config.pipeline.queue_capacity,
        batch_limit = config.pipeline.batch_limit,
        "initializing event pipeline"
    );

    EvePipelineBuilder::from_core(config)
        .build(transport)
        .map_err(|e| anyhow::anyhow!("failed to build event pipeline: {e}"))
}
