//! Single-scheduler lock on the data directory
//!
//! Two schedulers writing the same snapshot root would interleave commits on
//! the same item, so `cw start` holds an exclusive flock for its lifetime.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "locks/scheduler.lock";

pub struct SchedulerLock {
    path: PathBuf,
    // Holding the descriptor holds the flock
    _file: File,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub snapshot_root: PathBuf,
}

impl SchedulerLock {
    /// Take the lock or fail if a live scheduler holds it
    pub fn acquire(data_dir: &Path, snapshot_root: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create locks directory")?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if !try_flock_exclusive(&file)? {
            match read_owner(&mut file) {
                Ok(owner) if is_process_alive(owner.pid) => bail!(
                    "Scheduler already running (pid {}, since {})",
                    owner.pid,
                    owner.started_at.format("%Y-%m-%d %H:%M:%S")
                ),
                _ => bail!("Lock file {} is held by another process", path.display()),
            }
        }

        write_owner(&mut file, snapshot_root)?;
        tracing::debug!(path = %path.display(), "scheduler lock acquired");

        Ok(Self { path, _file: file })
    }

    /// Who holds the lock, if anyone wrote it
    pub fn owner(data_dir: &Path) -> Result<Option<LockOwner>> {
        let path = data_dir.join(LOCK_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&path).context("Failed to open lock file")?;
        match read_owner(&mut file) {
            Ok(owner) if is_process_alive(owner.pid) => Ok(Some(owner)),
            _ => Ok(None),
        }
    }
}

impl Drop for SchedulerLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn write_owner(file: &mut File, snapshot_root: &Path) -> Result<()> {
    let owner = LockOwner {
        pid: std::process::id(),
        started_at: Utc::now(),
        snapshot_root: snapshot_root.to_path_buf(),
    };
    let serialized = serde_json::to_string(&owner).context("Failed to serialize lock owner")?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn read_owner(file: &mut File) -> Result<LockOwner> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).context("Failed to parse lock owner")
}

#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Null signal only checks existence
    match kill(Pid::from_raw(pid as i32), None::<Signal>) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("snapshots");

        let first = SchedulerLock::acquire(dir.path(), &root).unwrap();
        let err = SchedulerLock::acquire(dir.path(), &root).err().unwrap();
        assert!(err.to_string().contains("already running"));

        drop(first);
        assert!(SchedulerLock::acquire(dir.path(), &root).is_ok());
    }

    #[test]
    fn test_owner_is_recorded_and_cleared() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("snapshots");

        assert!(SchedulerLock::owner(dir.path()).unwrap().is_none());

        let lock = SchedulerLock::acquire(dir.path(), &root).unwrap();
        let owner = SchedulerLock::owner(dir.path()).unwrap().unwrap();
        assert_eq!(owner.pid, std::process::id());
        assert_eq!(owner.snapshot_root, root);

        drop(lock);
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn test_process_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(999_999));
    }
}
