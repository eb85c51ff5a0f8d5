//! # Profiling Guide
//!
//! The asset subsystem logs through `tracing` and wraps every load batch
//! (`asset_batch`) and update (`asset_update`) in a span.
//!
//! ## Basic Usage
//!
//! Enable the `profiling` feature in your Cargo.toml:
//!
//! ```toml
//! [dependencies]
//! archetype_assets = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! Then install a subscriber once at start-up:
//!
//! ```ignore
//! use archetype_assets::profiling::{init_tracing, LogFormat, TracingConfig};
//!
//! let _guard = init_tracing(&TracingConfig {
//!     format: LogFormat::Json,
//!     log_dir: Some("logs".into()),
//!     ..TracingConfig::default()
//! })?;
//! ```
//!
//! Keep the guard alive: dropping it flushes and stops the file writer.
//!
//! ## Performance Tips
//!
//! 1. Profile in release mode for accurate metrics
//! 2. Use `Level::DEBUG` to see batch spans and per-asset load results

use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

/// Console output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub format: LogFormat,
    pub level: Level,
    /// Also write JSON logs to a daily rolling file in this directory
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: Level::INFO,
            log_dir: None,
            file_prefix: "assets.log".to_string(),
        }
    }
}

/// Keeps the file writer running
#[must_use]
pub struct TracingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<TracingGuard, TryInitError> {
    let pretty = (config.format == LogFormat::Pretty).then(tracing_subscriber::fmt::layer);
    let json = (config.format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(config.level))
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()?;

    Ok(TracingGuard { _file: guard })
}
