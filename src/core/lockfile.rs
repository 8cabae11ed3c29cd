//! The exclusive downstream lock (spec §4.C, first half).
//!
//! One process at a time may hold `.mirror.lock` for a downstream
//! repository. Built directly on `libc::flock` rather than a guard-typed
//! wrapper: the lock must stay held across an entire [`crate::manager::Manager`]
//! run, which a value returned from a short-lived function call can't
//! express without becoming self-referential. This mirrors the original's
//! `FileSystemLock`, a thin dataclass over `fcntl.flock` whose `__del__`
//! releases on drop — the same contract `Drop` gives us here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;

use crate::path::AbsFile;
use crate::state::MirrorState;

/// Owns the open file descriptor backing `.mirror.lock`. The advisory lock
/// is released when this value drops, closing the descriptor.
pub struct DownstreamLock {
    file: File,
    path: AbsFile,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("already installed")]
    AlreadyInstalled,
    #[error("in use")]
    InUse,
    #[error("not installed")]
    NotInstalled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    State(#[from] crate::state::StateError),
}

fn flock(file: &File, operation: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn try_exclusive(file: &File) -> std::io::Result<bool> {
    match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

impl DownstreamLock {
    /// Create a brand new lock file. Fails with [`LockError::AlreadyInstalled`]
    /// if the file already exists, or [`LockError::InUse`] if somehow a
    /// concurrent creator wins the race and holds the lock first.
    pub fn create(path: &AbsFile) -> Result<Self, LockError> {
        let file = match OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path.as_path())
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyInstalled);
            }
            Err(e) => return Err(e.into()),
        };
        if !try_exclusive(&file)? {
            return Err(LockError::InUse);
        }
        Ok(Self {
            file,
            path: path.clone(),
        })
    }

    /// Open an existing lock file for edit. Fails with
    /// [`LockError::NotInstalled`] if it's missing, [`LockError::InUse`] if
    /// another process holds it.
    pub fn edit(path: &AbsFile) -> Result<Self, LockError> {
        let file = match OpenOptions::new().read(true).write(true).open(path.as_path()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LockError::NotInstalled);
            }
            Err(e) => return Err(e.into()),
        };
        if !try_exclusive(&file)? {
            return Err(LockError::InUse);
        }
        Ok(Self {
            file,
            path: path.clone(),
        })
    }

    /// Read and parse the currently-recorded state (used by `check`/`sync`
    /// before overwriting it).
    pub fn load_state(&mut self) -> Result<MirrorState, LockError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        self.file.read_to_string(&mut contents)?;
        Ok(MirrorState::load(&contents)?)
    }

    /// Serialise `state` into the file (truncate-then-write), then release
    /// the lock. The descriptor is released even if serialisation fails;
    /// the error is still surfaced to the caller.
    pub fn unlock(mut self, state: &MirrorState) -> Result<(), LockError> {
        let dump_result = (|| -> Result<(), LockError> {
            let text = state.dump();
            self.file.seek(SeekFrom::Start(0))?;
            self.file.set_len(0)?;
            self.file.write_all(text.as_bytes())?;
            self.file.sync_all()?;
            Ok(())
        })();
        let _ = flock(&self.file, libc::LOCK_UN);
        dump_result
    }

    /// Delete the lock file from disk without attempting to serialise
    /// anything (the first-install-failure path). Never raises; errors are
    /// logged by the caller if desired.
    pub fn delete(self) -> std::io::Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path.as_path())
    }

    pub fn path(&self) -> &AbsFile {
        &self.path
    }
}

impl Drop for DownstreamLock {
    fn drop(&mut self) {
        let _ = flock(&self.file, libc::LOCK_UN);
    }
}
