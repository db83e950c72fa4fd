use std::env;
use std::path::PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Interval between pause and termination-flag polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Budget granted to a remote service to exit after a stop request.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::default()
}

/// Default pause poll interval in milliseconds.
#[must_use]
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default remote stop budget in milliseconds.
#[must_use]
pub const fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

/// Computes the directory holding lock, record and flag files when none is
/// configured.
///
/// Prefers `$XDG_RUNTIME_DIR/soloist`; otherwise falls back to a per-user
/// namespace under the system temporary directory.
#[must_use]
pub fn default_directory() -> PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = runtime_dir() {
            dir.push("soloist");
            return dir;
        }
        let mut dir = env::temp_dir();
        dir.push("soloist");
        // SAFETY: geteuid(2) cannot fail and touches no memory.
        dir.push(format!("uid-{}", unsafe { geteuid() }));
        dir
    }

    #[cfg(not(unix))]
    {
        let mut dir = env::temp_dir();
        dir.push("soloist");
        dir
    }
}
