//! Single-instance lock for the state directory
//!
//! - Lock file holds the owner's PID and acquisition time
//! - Created with create_new so two daemons cannot both win
//! - A lock left by a dead process (or unreadable) is reclaimed
//! - Released on drop

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    /// Unix epoch seconds
    pub acquired_at: u64,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: process::id(),
            acquired_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn process_exists(&self) -> bool {
        Path::new(&format!("/proc/{}", self.pid)).exists()
    }
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("State directory locked by running PID {} ({})", .holder.pid, .path.display())]
    AlreadyLocked { holder: LockInfo, path: PathBuf },

    #[error("Lock IO error: {0}")]
    Io(#[from] io::Error),
}

/// Lock handle - releases the lock on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // One reclaim attempt: a second collision means a live contender
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let content = serde_json::to_string(&LockInfo::current())
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    file.write_all(content.as_bytes())?;
                    file.sync_all()?;
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok());
                    match holder {
                        Some(holder) if holder.process_exists() && holder.pid != process::id() => {
                            return Err(LockError::AlreadyLocked {
                                holder,
                                path: path.to_path_buf(),
                            });
                        }
                        Some(holder) => {
                            warn!("Reclaiming stale lock left by PID {}", holder.pid);
                        }
                        None => warn!("Reclaiming unreadable lock {}", path.display()),
                    }
                    fs::remove_file(path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let holder = fs::read_to_string(path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            .unwrap_or_else(LockInfo::current);
        Err(LockError::AlreadyLocked {
            holder,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gradesweepd.lock");
        {
            let lock = InstanceLock::acquire(&path).unwrap();
            assert!(lock.path().exists());
            let info: LockInfo = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(info.pid, process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_live_holder_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gradesweepd.lock");
        // PID 1 always exists
        fs::write(&path, r#"{"pid":1,"acquired_at":0}"#).unwrap();

        match InstanceLock::acquire(&path) {
            Err(LockError::AlreadyLocked { holder, .. }) => assert_eq!(holder.pid, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(path.exists());
    }

    #[test]
    fn test_dead_holder_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gradesweepd.lock");
        fs::write(&path, r#"{"pid":4000000,"acquired_at":0}"#).unwrap();

        let lock = InstanceLock::acquire(&path).unwrap();
        let info: LockInfo = serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(info.pid, process::id());
    }

    #[test]
    fn test_garbage_lock_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gradesweepd.lock");
        fs::write(&path, "not a lock").unwrap();
        assert!(InstanceLock::acquire(&path).is_ok());
    }
}
