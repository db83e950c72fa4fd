//! Shared configuration for the soloist binaries.
//!
//! Values are layered by [`ortho_config`]: built-in defaults, then a
//! configuration file (`--config-path` or the discovered `.soloist.toml`),
//! then `SOLOIST_*` environment variables, and finally command-line flags.
//! The core library never reads configuration itself; front-ends resolve a
//! [`Config`] and pass the relevant values into a service handle.

use std::path::PathBuf;
use std::time::Duration;

pub use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;
mod runtime;
mod trap;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STOP_TIMEOUT_MS, default_directory,
    default_log_filter, default_log_filter_string, default_log_format, default_poll_interval_ms,
    default_stop_timeout_ms,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use runtime::{RuntimeDirectory, RuntimeDirectoryError};
pub use trap::TrapPreference;

/// Resolved configuration shared by the soloist front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SOLOIST")]
pub struct Config {
    /// Directory holding lock, record and flag files. Falls back to
    /// [`default_directory`] when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log events.
    #[serde(default)]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Pause and termination-flag poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Remote stop budget in milliseconds.
    #[serde(default = "default_stop_timeout_ms")]
    #[ortho_config(default = DEFAULT_STOP_TIMEOUT_MS)]
    pub stop_timeout_ms: u64,
    /// How running services observe external stop requests.
    #[serde(default)]
    #[ortho_config(default = TrapPreference::default())]
    pub trap_mode: TrapPreference,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            trap_mode: TrapPreference::default(),
        }
    }
}

impl Config {
    /// Directory holding the service artefacts.
    #[must_use]
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_directory)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for log events.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Pause and termination-flag poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Remote stop budget.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Preferred stop-request mechanism.
    #[must_use]
    pub const fn trap_mode(&self) -> TrapPreference {
        self.trap_mode
    }
}
