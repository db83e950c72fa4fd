use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a running service learns that another process wants it to stop.
///
/// `Signals` traps the graceful shutdown signals directly. `TouchFile`
/// polls a termination flag file instead and suits platforms where signal
/// delivery to the service process is unavailable.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TrapPreference {
    /// Install handlers for the graceful shutdown signals.
    Signals,
    /// Poll the `<name>.term` flag file.
    TouchFile,
}

impl Default for TrapPreference {
    fn default() -> Self {
        if cfg!(unix) {
            Self::Signals
        } else {
            Self::TouchFile
        }
    }
}
