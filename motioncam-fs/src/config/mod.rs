//! Host configuration.
//!
//! [`HostConfig`] sizes the shared cache and worker pools. It can be built
//! in code or loaded from an INI file via [`ConfigFile`]:
//!
//! ```ini
//! [cache]
//! max_size_mb = 1024
//!
//! [pipeline]
//! io_threads = 4
//! processing_threads = 8
//! failure_backoff_ms = 2000
//!
//! [fuse]
//! attr_ttl_ms = 1000
//!
//! [logging]
//! directory = /var/log/motioncam-fs
//! level = debug
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::cache::DEFAULT_FAILURE_BACKOFF;

/// Default cache budget: 1 GiB.
pub const DEFAULT_CACHE_SIZE_BYTES: u64 = 1024 * 1024 * 1024;

/// Default I/O pool size.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Default FUSE attribute TTL.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);

/// Config file name under the per-user config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Application directory name under the per-user config directory.
pub const APP_DIR_NAME: &str = "motioncam-fs";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Sizing of the shared host resources.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    /// Frame cache budget in bytes.
    pub cache_size_bytes: u64,
    /// I/O (decode) pool size.
    pub io_threads: usize,
    /// Processing (render) pool size.
    pub processing_threads: usize,
    /// How long a failed frame is not retried.
    pub failure_backoff: Duration,
    /// Attribute/entry TTL reported to the kernel.
    pub attr_ttl: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: DEFAULT_CACHE_SIZE_BYTES,
            io_threads: DEFAULT_IO_THREADS,
            processing_threads: default_processing_threads(),
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            attr_ttl: DEFAULT_ATTR_TTL,
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_size_bytes(mut self, bytes: u64) -> Self {
        self.cache_size_bytes = bytes;
        self
    }

    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    pub fn with_processing_threads(mut self, threads: usize) -> Self {
        self.processing_threads = threads.max(1);
        self
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    pub fn with_attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }
}

fn default_processing_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Logging settings from the `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    /// Filter directive, e.g. `info` or `motioncam_fs=debug`.
    pub level: Option<String>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub host: HostConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Default location: `<config dir>/motioncam-fs/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location; defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from `path`. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Read {
            path: PathBuf::from("<string>"),
            reason: err.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let host = &mut config.host;

        if let Some(mb) = parse_value::<u64>(ini, "cache", "max_size_mb")? {
            host.cache_size_bytes = mb * BYTES_PER_MB;
        }
        if let Some(threads) = parse_value::<usize>(ini, "pipeline", "io_threads")? {
            host.io_threads = threads.max(1);
        }
        if let Some(threads) = parse_value::<usize>(ini, "pipeline", "processing_threads")? {
            host.processing_threads = threads.max(1);
        }
        if let Some(ms) = parse_value::<u64>(ini, "pipeline", "failure_backoff_ms")? {
            host.failure_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_value::<u64>(ini, "fuse", "attr_ttl_ms")? {
            host.attr_ttl = Duration::from_millis(ms);
        }

        if let Some(logging) = ini.section(Some("logging")) {
            config.logging.directory = logging
                .get("directory")
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from);
            config.logging.level = logging
                .get("level")
                .map(str::trim)
                .filter(|level| !level.is_empty())
                .map(str::to_string);
        }

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(
    ini: &Ini,
    section: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = ini.section(Some(section)).and_then(|props| props.get(key)) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
        })
}
