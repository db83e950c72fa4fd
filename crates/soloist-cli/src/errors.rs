//! Error type for the CLI runtime.

use std::io;
use std::sync::Arc;

use soloist::ServiceError;
use soloist_config::RuntimeDirectoryError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    RuntimeDirectory(#[from] RuntimeDirectoryError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialise status: {0}")]
    SerialiseStatus(serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
