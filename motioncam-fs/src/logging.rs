//! Logging setup.
//!
//! The library only emits `tracing` events; embedding applications call
//! [`init`] once to install a subscriber that logs to the console and to
//! `motioncam-fs.log` in the configured directory.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = "motioncam-fs.log";

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub fn default_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open log file: {0}")]
    Appender(#[from] InitError),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Keeps background log writers alive; flushes them on drop.
pub struct LoggingGuard {
    _file: WorkerGuard,
    #[cfg(feature = "profiling")]
    _chrome: tracing_chrome::FlushGuard,
    log_path: PathBuf,
}

impl LoggingGuard {
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Log files go to
/// `config.directory`, or `logs/` under the working directory.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let directory = config
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("logs"));
    let log_path = directory.join(LOG_FILE_NAME);

    std::fs::create_dir_all(&directory)?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(&directory)?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let level = config.level.as_deref().unwrap_or(default_level());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    #[cfg(feature = "profiling")]
    let (chrome_layer, chrome_guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file(directory.join("motioncam-fs-trace.json"))
        .build();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false));

    #[cfg(feature = "profiling")]
    let registry = registry.with(chrome_layer);

    registry.try_init()?;

    Ok(LoggingGuard {
        _file: file_guard,
        #[cfg(feature = "profiling")]
        _chrome: chrome_guard,
        log_path,
    })
}
