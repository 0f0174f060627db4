//! Rate state persistence.
//!
//! `load` never fails: a missing, unreadable or corrupt record yields the
//! default state (never notified, zero active artifacts). A reset counter can
//! at worst cause one early notification, which is preferable to stopping
//! the monitoring loop.
//!
//! The file store is single-writer. It takes an advisory `fs2` lock around
//! each read and write so a manual `reset-state` cannot interleave with the
//! daemon, but it is not meant to be shared by parallel monitors.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::model::NotificationState;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable record of the notification state.
pub trait StateStore {
    fn load(&self) -> NotificationState;
    fn save(&self, state: &NotificationState) -> Result<(), StateError>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// Stores the state as a small JSON document:
/// `{"last_notified_at": "2026-01-10T18:00:00Z", "active_count": 3}`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_text(&self) -> std::io::Result<String> {
        let mut file = File::open(&self.path)?;
        file.lock_shared()?;
        let mut text = String::new();
        let result = file.read_to_string(&mut text);
        file.unlock()?;
        result.map(|_| text)
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> NotificationState {
        let text = match self.read_text() {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet, starting fresh");
                return NotificationState::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file unreadable, starting fresh");
                return NotificationState::default();
            }
        };

        match serde_json::from_str::<NotificationState>(&text) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file corrupt, starting fresh");
                NotificationState::default()
            }
        }
    }

    fn save(&self, state: &NotificationState) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        file.lock_exclusive().map_err(|e| self.io_error(e))?;
        let written = file
            .set_len(0)
            .and_then(|_| file.write_all(json.as_bytes()))
            .and_then(|_| file.sync_all());
        file.unlock().map_err(|e| self.io_error(e))?;
        written.map_err(|e| self.io_error(e))?;

        debug!(
            path = %self.path.display(),
            active_count = state.active_count,
            "notification state saved"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store. Clones share the same state, so a test can keep a handle
/// while the monitor owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<NotificationState>>,
}

impl MemoryStore {
    pub fn new(initial: NotificationState) -> Self {
        Self {
            state: Arc::new(Mutex::new(initial)),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> NotificationState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, state: &NotificationState) -> Result<(), StateError> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
