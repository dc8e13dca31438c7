use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::io::settings_io::SETTINGS_DIR;

const LOCK_FILE: &str = ".lock";

/// Advisory lock serializing document read-modify-write cycles across
/// `tsync` processes working on the same vault.
///
/// The lock file under the settings directory is never removed. Every
/// process must flock the same inode, so unlinking it while a waiter holds
/// an open handle would let a third process lock a fresh file alongside it.
/// The holder's pid is written into the file for diagnostics.
pub struct VaultLock {
    file: File,
    path: PathBuf,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not acquire lock on {path}: {}", holder_text(.holder))]
    Timeout { path: PathBuf, holder: Option<u32> },
}

fn holder_text(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!("held by tsync process {}", pid),
        None => "another tsync process may be writing".to_string(),
    }
}

impl VaultLock {
    /// Lock the vault rooted at `root`, waiting up to `timeout`
    pub fn acquire(root: &Path, timeout: Duration) -> Result<Self, LockError> {
        let dir = root.join(SETTINGS_DIR);
        let lock_path = dir.join(LOCK_FILE);
        let create_error = |source| LockError::CreateError {
            path: lock_path.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(create_error)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(create_error)?;

        let start = Instant::now();
        loop {
            match try_lock(&file) {
                Ok(()) => break,
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => {
                    let holder = read_holder(&lock_path);
                    tracing::debug!(path = %lock_path.display(), ?holder, "vault lock timed out");
                    return Err(LockError::Timeout {
                        path: lock_path,
                        holder,
                    });
                }
            }
        }

        let mut lock = VaultLock {
            file,
            path: lock_path,
        };
        if let Err(e) = lock.record_holder() {
            tracing::debug!(
                path = %lock.path.display(),
                error = %e,
                "could not record lock holder"
            );
        }
        tracing::trace!(path = %lock.path.display(), "vault lock acquired");
        Ok(lock)
    }

    /// Acquire with the default timeout (5 seconds)
    pub fn acquire_default(root: &Path) -> Result<Self, LockError> {
        Self::acquire(root, Duration::from_secs(5))
    }

    fn record_holder(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        writeln!(self.file, "{}", std::process::id())?;
        self.file.flush()
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        // Clear the pid while still holding the flock; closing the handle
        // releases it
        let _ = self.file.set_len(0);
        tracing::trace!(path = %self.path.display(), "vault lock released");
    }
}

fn read_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}
