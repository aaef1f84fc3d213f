//! State file helpers
//!
//! Every file the engine owns goes through here:
//! - atomic_write: temp file + fsync + rename, never a partial file on disk
//! - load_json_or_default: fail-soft read, corrupt or missing data yields Default
//!
//! Corruption is never fatal. It is logged and the caller starts fresh.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Question memory file name
pub const MEMORY_FILE: &str = "question_memory.json";

/// Run state file name
pub const RUN_STATE_FILE: &str = "run_state.json";

/// Submission log file name
pub const LOG_FILE: &str = "questions_log.jsonl";

/// Daemon lock file name
pub const LOCK_FILE: &str = "gradesweepd.lock";

/// Resolved locations of all state files under one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub dir: PathBuf,
}

impl StatePaths {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn memory(&self) -> PathBuf {
        self.dir.join(MEMORY_FILE)
    }

    pub fn run_state(&self) -> PathBuf {
        self.dir.join(RUN_STATE_FILE)
    }

    pub fn log(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn lock(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }
}

/// Write data to a file atomically using temp file + rename
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // Temp file must live in the same directory for rename to be atomic
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Serialize as pretty JSON and write atomically
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(path, content.as_bytes())
}

/// Load a JSON file, falling back to `T::default()` on any problem.
///
/// Missing file: silent fresh start. Empty, unreadable or unparseable file:
/// warning, then fresh start.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    if !path.exists() {
        debug!("No {} at {}, starting fresh", what, path.display());
        return T::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Cannot read {} at {}: {}, starting fresh", what, path.display(), e);
            return T::default();
        }
    };

    if content.trim().is_empty() {
        warn!("{} at {} is empty, starting fresh", what, path.display());
        return T::default();
    }

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!("{} at {} is corrupted ({}), starting fresh", what, path.display(), e);
            T::default()
        }
    }
}

/// Delete a file if present
pub fn safe_delete(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
