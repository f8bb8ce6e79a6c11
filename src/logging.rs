//! Tracing setup: stderr plus one log file per process.

use crate::error::{PipelineError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `sql_pipeline_<YYYY-mm-dd_HH-MM-SS>.log`
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("sql_pipeline_{}.log", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// Returns the path of the log file.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(log_file_name(chrono::Local::now()));
    let file = File::create(&path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| PipelineError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(path)
}
