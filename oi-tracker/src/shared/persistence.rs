//! Persistence of the tracked set
//!
//! The tracked set lives in a single named slot holding the JSON array of
//! `{symbol, supported}` entries. Missing or malformed data loads as an empty set;
//! storage failures are logged and never reach the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::PersistenceError;
use super::types::TrackedEntry;

/// A durable key-value slot holding one string value
pub trait Slot: Send + Sync {
    /// Read the slot. Ok(None) when nothing was stored yet.
    fn read(&self) -> Result<Option<String>, PersistenceError>;

    /// Replace the slot contents
    fn write(&self, value: &str) -> Result<(), PersistenceError>;
}

/// Slot backed by `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Slot for FileSlot {
    fn read(&self) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, value: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Replace atomically via a sibling temp file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory slot, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    value: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-filled with raw contents
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(value.into()))),
        }
    }

    /// Current raw contents
    pub fn value(&self) -> Option<String> {
        self.value.lock().clone()
    }
}

impl Slot for MemorySlot {
    fn read(&self) -> Result<Option<String>, PersistenceError> {
        Ok(self.value.lock().clone())
    }

    fn write(&self, value: &str) -> Result<(), PersistenceError> {
        *self.value.lock() = Some(value.to_string());
        Ok(())
    }
}

/// Persistence adapter for the tracked set
pub struct TrackedStore {
    slot: Box<dyn Slot>,
}

impl std::fmt::Debug for TrackedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedStore").finish_non_exhaustive()
    }
}

impl TrackedStore {
    pub fn new(slot: impl Slot + 'static) -> Self {
        Self {
            slot: Box::new(slot),
        }
    }

    /// Store backed by a file in `dir`
    pub fn file(dir: impl AsRef<Path>, key: &str) -> Self {
        Self::new(FileSlot::new(dir, key))
    }

    /// Store that keeps nothing across sessions
    pub fn in_memory() -> Self {
        Self::new(MemorySlot::new())
    }

    /// Persist the tracked set
    pub fn save(&self, entries: &[TrackedEntry]) {
        if let Err(e) = self.try_save(entries) {
            warn!("Failed to persist tracked set: {}", e);
        }
    }

    /// Load the tracked set. Empty when absent or malformed.
    pub fn load(&self) -> Vec<TrackedEntry> {
        match self.try_load() {
            Ok(entries) => {
                debug!("Loaded {} tracked entries", entries.len());
                entries
            }
            Err(e) => {
                warn!("Ignoring saved tracked set: {}", e);
                Vec::new()
            }
        }
    }

    fn try_save(&self, entries: &[TrackedEntry]) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(entries)?;
        self.slot.write(&json)
    }

    fn try_load(&self) -> Result<Vec<TrackedEntry>, PersistenceError> {
        match self.slot.read()? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }
}
