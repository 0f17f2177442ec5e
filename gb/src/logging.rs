//! Log file setup
//!
//! Everything at or above the configured level goes to `girobot.log`. Errors
//! are also copied to `errors.log` next to it, so failures stand out from
//! routine traffic.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{Level, Subscriber, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::get_log_path;

const ERROR_LOG_NAME: &str = "errors.log";

/// Parse a level name; unknown names fall back to INFO with a warning
pub fn parse_level(name: &str) -> Level {
    match name.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", name);
            Level::INFO
        }
    }
}

/// Path of the error-only log, beside the main log
pub fn get_error_log_path() -> PathBuf {
    get_log_path().with_file_name(ERROR_LOG_NAME)
}

fn open_append(path: &Path) -> Result<File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Subscriber with the main log layer and the error-only layer
fn build_subscriber(filter: EnvFilter, log_file: File, error_file: File) -> impl Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_filter(filter),
        )
        .with(
            fmt::layer()
                .with_writer(error_file)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
}

/// Install the global subscriber
///
/// Priority: CLI --log-level > config file > INFO
pub fn init(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    let error_log_path = get_error_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    let level = cli_log_level.or(config_log_level).map_or(Level::INFO, parse_level);

    // Client commands and the daemon share the same files
    let subscriber = build_subscriber(
        EnvFilter::from_default_env().add_directive(level.into()),
        open_append(&log_path)?,
        open_append(&error_log_path)?,
    );
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}
