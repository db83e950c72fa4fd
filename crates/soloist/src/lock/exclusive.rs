//! Advisory locking on the lock file itself.
//!
//! A holder keeps an exclusive `flock` on the file it created for as long as
//! its token lives, and unlinks the path before the lock is dropped. A
//! reclaimer therefore only deletes a lock file whose `flock` it holds and
//! which is still linked at the lock path; two reclaimers can never both
//! remove a live claim.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};

/// Lock file owned by a holder.
#[cfg(unix)]
pub(super) type Held = Flock<File>;
#[cfg(not(unix))]
pub(super) type Held = File;

/// Takes the holder's lock on a freshly created lock file.
///
/// Blocks only while a reclaimer briefly inspects the new file.
#[cfg(unix)]
pub(super) fn hold(file: File) -> io::Result<Held> {
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| io::Error::from(errno))
}

#[cfg(not(unix))]
pub(super) fn hold(file: File) -> io::Result<Held> {
    Ok(file)
}

/// State of an existing lock file as seen by a would-be reclaimer.
#[derive(Debug)]
pub(super) enum Inspection {
    /// The path vanished before it could be opened.
    Missing,
    /// A live holder owns the file.
    Held,
    /// Nobody holds the file; the reclaimer now does until this is dropped.
    Abandoned(Candidate),
}

/// Abandoned lock file locked by the reclaimer.
#[derive(Debug)]
pub(super) struct Candidate {
    file: Held,
}

impl Candidate {
    /// Open file for reading the stamp and modification time.
    pub(super) fn file(&self) -> &File {
        &self.file
    }

    /// Reports whether `path` still names this file rather than a successor's.
    #[cfg(unix)]
    pub(super) fn still_linked(&self, path: &Path) -> io::Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let ours = self.file.metadata()?;
        match std::fs::metadata(path) {
            Ok(current) => Ok(current.dev() == ours.dev() && current.ino() == ours.ino()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    #[cfg(not(unix))]
    pub(super) fn still_linked(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }
}

/// Opens the existing lock file and tries to take its lock without waiting.
pub(super) fn inspect(path: &Path) -> io::Result<Inspection> {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Inspection::Missing),
        Err(error) => return Err(error),
    };
    try_lock(file)
}

#[cfg(unix)]
fn try_lock(file: File) -> io::Result<Inspection> {
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(file) => Ok(Inspection::Abandoned(Candidate { file })),
        Err((_, Errno::EWOULDBLOCK)) => Ok(Inspection::Held),
        Err((_, errno)) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn try_lock(file: File) -> io::Result<Inspection> {
    Ok(Inspection::Abandoned(Candidate { file }))
}
