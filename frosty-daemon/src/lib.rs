//! frosty daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `frosty-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;
pub mod supervisor;
