//! Reads and writes the PID record shared with observer processes.
//!
//! The record holds a single decimal PID followed by a newline. Writers
//! replace it atomically so readers never observe a partial line, and
//! release truncates it in place rather than unlinking it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

/// Atomically replaces the record at `path` with `pid`.
///
/// Data is flushed and fsync'd before the temporary file is renamed into
/// place.
pub(crate) fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "record path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("soloist"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o644));
    }

    let mut file = builder.tempfile_in(directory)?;
    writeln!(file, "{pid}")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Reads the PID stored at `path`.
///
/// A missing file, an empty file, and content that is not a single decimal
/// integer all yield `None`; only genuine read failures are errors.
pub(crate) fn read_pid(path: &Path) -> io::Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse_pid(&content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Empties the record at `path`, leaving the file in place.
pub(crate) fn truncate(path: &Path) -> io::Result<()> {
    match OpenOptions::new().write(true).truncate(true).open(path) {
        Ok(_) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn parse_pid(content: &str) -> Option<u32> {
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}
