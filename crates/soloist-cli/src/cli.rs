//! Command-line argument definitions.

use clap::{Parser, Subcommand};

/// Control cooperative single-instance services.
///
/// Configuration flags such as `--directory` must precede the command.
#[derive(Parser, Debug)]
#[command(name = "soloist", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations on a named service.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Prints the holder PID and flag state of a service.
    Status {
        /// Service name.
        name: String,
        /// Emits a JSON object instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Asks the running holder to stop and waits for it to exit.
    Stop {
        /// Service name.
        name: String,
    },
    /// Raises the pause flag.
    Pause {
        /// Service name.
        name: String,
    },
    /// Clears the pause flag.
    Resume {
        /// Service name.
        name: String,
    },
    /// Clears the stop flag so the service may start again.
    Clear {
        /// Service name.
        name: String,
    },
    /// Runs PROGRAM as the named service, again and again, until it exits
    /// unsuccessfully or a stop is requested.
    Run {
        /// Service name.
        name: String,
        /// Program and arguments, given after `--`.
        #[arg(last = true, required = true, num_args = 1.., value_name = "PROGRAM")]
        program: Vec<String>,
    },
}

impl CliCommand {
    /// Name of the service the command targets.
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Status { name, .. }
            | Self::Stop { name }
            | Self::Pause { name }
            | Self::Resume { name }
            | Self::Clear { name }
            | Self::Run { name, .. } => name,
        }
    }
}
