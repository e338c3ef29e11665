// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging initialization for bindings embedding the lifecycle layer.
//!
//! The crate logs through the `log` facade. Hosts that have no logger of
//! their own can install `env_logger` with one of these helpers.

use crate::{Error, Result};

/// Log level for lifecycle logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Initialize console logging at `level`.
///
/// # Errors
///
/// Returns `Error::LoggerAlreadyInitialized` if a global logger is already set.
pub fn init(level: LogLevel) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level.into())
        .format_timestamp_millis()
        .try_init()
        .map_err(|_| Error::LoggerAlreadyInitialized)
}

/// Initialize console logging, letting `RUST_LOG` override `default_level`.
///
/// # Errors
///
/// Returns `Error::LoggerAlreadyInitialized` if a global logger is already set.
pub fn init_from_env(default_level: LogLevel) -> Result<()> {
    let filter: log::LevelFilter = default_level.into();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(filter.to_string()),
    )
    .format_timestamp_millis()
    .try_init()
    .map_err(|_| Error::LoggerAlreadyInitialized)
}

/// Initialize console logging with an `env_logger` filter string
/// (e.g. `"hdds_entity=debug,warn"`).
///
/// # Errors
///
/// Returns `Error::Config` for an empty filter and
/// `Error::LoggerAlreadyInitialized` if a global logger is already set.
pub fn init_with_filter(filter: &str) -> Result<()> {
    if filter.trim().is_empty() {
        return Err(Error::Config("empty log filter".to_string()));
    }

    env_logger::Builder::new()
        .parse_filters(filter)
        .format_timestamp_millis()
        .try_init()
        .map_err(|_| Error::LoggerAlreadyInitialized)
}
