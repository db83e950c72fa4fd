//! Execution of parsed CLI commands against a service handle.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use serde::Serialize;
use tracing::{info, warn};

use soloist::{RemoteStop, ServiceHandle};
use soloist_config::{Config, RuntimeDirectory, TrapPreference};

use crate::cli::CliCommand;
use crate::errors::AppError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::commands");

/// Snapshot printed by `status`.
#[derive(Debug, Serialize)]
struct StatusReport {
    name: String,
    directory: PathBuf,
    pid: Option<u32>,
    stopped: bool,
    paused: bool,
}

pub(crate) fn execute<W, E>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<ExitCode, AppError>
where
    W: Write,
    E: Write,
{
    let runtime = RuntimeDirectory::from_config(config);
    let directory = runtime.prepare()?;
    let handle = build_handle(command.name(), directory.to_path_buf(), config)?;

    match command {
        CliCommand::Status { json, .. } => status(&handle, json, stdout),
        CliCommand::Stop { .. } => stop(&handle, config, stdout),
        CliCommand::Pause { .. } => {
            handle.pause()?;
            writeln!(stdout, "{}: paused", handle.identity().name())?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Resume { .. } => {
            handle.resume()?;
            writeln!(stdout, "{}: resumed", handle.identity().name())?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Clear { .. } => {
            handle.start()?;
            writeln!(stdout, "{}: stop flag cleared", handle.identity().name())?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Run { program, .. } => run(&handle, &program, stderr),
    }
}

fn build_handle(
    name: &str,
    directory: PathBuf,
    config: &Config,
) -> Result<ServiceHandle, AppError> {
    let handle = ServiceHandle::new(name, directory)?.with_poll_interval(config.poll_interval());
    Ok(match config.trap_mode() {
        TrapPreference::TouchFile => handle.with_touch_file(config.poll_interval()),
        TrapPreference::Signals => handle,
    })
}

fn status<W: Write>(
    handle: &ServiceHandle,
    json: bool,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let report = StatusReport {
        name: handle.identity().name().to_owned(),
        directory: handle.identity().directory().to_path_buf(),
        pid: handle.running_pid()?,
        stopped: handle.is_stopped()?,
        paused: handle.is_paused()?,
    };
    if json {
        let encoded = serde_json::to_string(&report).map_err(AppError::SerialiseStatus)?;
        writeln!(stdout, "{encoded}")?;
        return Ok(ExitCode::SUCCESS);
    }

    let running = report
        .pid
        .map_or_else(|| "not running".to_owned(), |pid| format!("running (pid {pid})"));
    writeln!(stdout, "{}: {running}", report.name)?;
    writeln!(stdout, "  directory: {}", report.directory.display())?;
    writeln!(stdout, "  stopped: {}", yes_no(report.stopped))?;
    writeln!(stdout, "  paused: {}", yes_no(report.paused))?;
    Ok(ExitCode::SUCCESS)
}

fn stop<W: Write>(
    handle: &ServiceHandle,
    config: &Config,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let name = handle.identity().name();
    let outcome = handle.request_remote_stop(config.stop_timeout(), config.poll_interval())?;
    match outcome {
        RemoteStop::NotRunning => writeln!(stdout, "{name}: not running")?,
        RemoteStop::Local => writeln!(stdout, "{name}: stop flag raised")?,
        RemoteStop::Stopped { pid } => writeln!(stdout, "{name}: stopped (pid {pid})")?,
        RemoteStop::StillRunning { pid } => writeln!(
            stdout,
            "{name}: still running (pid {pid}) after {} ms",
            config.stop_timeout_ms
        )?,
    }
    Ok(if outcome.is_stopped() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run<E: Write>(
    handle: &ServiceHandle,
    program: &[String],
    stderr: &mut E,
) -> Result<ExitCode, AppError> {
    let name = handle.identity().name();
    let Some((executable, arguments)) = program.split_first() else {
        writeln!(stderr, "{name}: no program given")?;
        return Ok(ExitCode::FAILURE);
    };

    let mut launch_error = None;
    let ran = handle.service(|| {
        match Command::new(executable).args(arguments).status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                info!(target: CLI_TARGET, service = name, %status, "program exited unsuccessfully");
                false
            }
            Err(source) => {
                launch_error = Some(source);
                false
            }
        }
    })?;

    if let Some(source) = launch_error {
        return Err(AppError::Launch {
            program: executable.clone(),
            source,
        });
    }
    if ran {
        return Ok(ExitCode::SUCCESS);
    }
    let reason = if handle.is_stopped()? {
        "stop flag is raised; run `soloist clear` first"
    } else {
        "already running in another process"
    };
    warn!(target: CLI_TARGET, service = name, reason, "service did not start");
    writeln!(stderr, "{name}: {reason}")?;
    Ok(ExitCode::FAILURE)
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
