//! Entry point for the `soloist` binary.
//!
//! All work is delegated to [`soloist_cli::run`] so that tests can drive the
//! same code path with substituted IO streams.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    soloist_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
