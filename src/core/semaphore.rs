//! Cache-slot leader/follower semaphore (spec §4.C, second half).
//!
//! Coordinates concurrent processes that might try to clone or fetch the
//! same upstream at the same time. Built on the same `libc::flock` raw
//! primitive as [`crate::lockfile`], because the protocol needs a true
//! exclusive→shared *downgrade on one fd* in step 2: `flock(fd, LOCK_SH)`
//! while still holding `LOCK_EX` replaces the lock atomically on Linux, with
//! no window where the slot is unlocked. A guard-returning API (acquire one
//! lock kind, drop it, acquire another) cannot make that atomicity
//! guarantee. This is the direct analogue of the original's
//! `FileSystemSemaphore`, built the same way on `fcntl.flock`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::path::AbsFile;

/// Followers poll the monitor file at this interval while waiting for the
/// leader to finish (spec §4.C step 5: "short sleep").
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Default follower wait bound (spec §4.C step 5, §5 "Cancellation/timeouts").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SemaphoreError {
    #[error("timed out waiting for the leader")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn flock(file: &File, operation: i32) -> std::io::Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// A monotonic-enough key identifying one round of leader work. Nanosecond
/// timestamps are sufficient here: the key only has to be distinct from the
/// *previous* round's key, never globally unique.
fn fresh_key() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// A held semaphore. Kept alive for as long as the caller holds the cache
/// slot, exactly like the original caching the semaphore object to stop its
/// destructor running mid-process — here that's just "don't drop it early".
pub struct Semaphore {
    sem: File,
    key: u128,
    leader: bool,
}

impl Semaphore {
    /// Run the acquire protocol (spec §4.C steps 1-3) against `sem_path`.
    pub fn acquire(sem_path: &AbsFile) -> Result<Self, SemaphoreError> {
        let sem = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(sem_path.as_path())?;

        let leader = match flock(&sem, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) => return Err(e.into()),
        };

        if leader {
            let key = fresh_key();
            write_key(&sem, key)?;
            // Atomic downgrade: no window where `sem` is unlocked.
            flock(&sem, libc::LOCK_SH)?;
            Ok(Self { sem, key, leader })
        } else {
            flock(&sem, libc::LOCK_SH)?;
            let key = read_key(&sem)?.unwrap_or(0);
            Ok(Self { sem, key, leader })
        }
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Spec §4.C steps 4-5: the leader publishes its key to `sync_path`;
    /// followers busy-wait until that key appears, bounded by `timeout`.
    pub fn synchronize(
        &self,
        sync_path: &AbsFile,
        timeout: Duration,
    ) -> Result<(), SemaphoreError> {
        if self.leader {
            let mut sync_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(sync_path.as_path())?;
            write!(sync_file, "{}", self.key)?;
            sync_file.sync_all()?;
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(contents) = std::fs::read_to_string(sync_path.as_path())
                && let Ok(observed) = contents.trim().parse::<u128>()
                && observed == self.key
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SemaphoreError::Timeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let _ = flock(&self.sem, libc::LOCK_UN);
    }
}

fn write_key(sem: &File, key: u128) -> std::io::Result<()> {
    let mut sem = sem.try_clone()?;
    sem.set_len(0)?;
    sem.seek(SeekFrom::Start(0))?;
    write!(sem, "{key}")?;
    sem.sync_all()
}

fn read_key(sem: &File) -> std::io::Result<Option<u128>> {
    let mut sem = sem.try_clone()?;
    sem.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    sem.read_to_string(&mut contents)?;
    Ok(contents.trim().parse().ok())
}
