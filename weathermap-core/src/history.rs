//! Bounded, persisted, most-recently-used search history.

use crate::{error::PersistenceError, model::HistoryEntry};
use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

/// Name of the record holding the serialized history list.
pub const HISTORY_KEY: &str = "weatherMapSearchHistory";

/// Most entries kept.
pub const MAX_HISTORY: usize = 5;

/// Local persistent key-value storage.
pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replaces the whole record; readers never observe a partial write.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;

        // Write aside, then rename over the record.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory storage for sessions that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Most-recent-first, unique by id, at most [`MAX_HISTORY`] entries.
///
/// The in-memory list is authoritative for the session: persistence failures
/// are logged and otherwise ignored.
#[derive(Debug)]
pub struct SearchHistoryStore {
    storage: Arc<dyn KeyValueStore>,
    entries: Vec<HistoryEntry>,
}

impl SearchHistoryStore {
    /// Opens the store and loads whatever was persisted.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut store = Self { storage, entries: Vec::new() };
        store.entries = store.load();
        store
    }

    /// Reads the persisted list. Missing or corrupt data reads as empty.
    pub fn load(&self) -> Vec<HistoryEntry> {
        let raw = match self.storage.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(error = %err, "failed to read search history, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => normalize(entries),
            Err(err) => {
                warn!(error = %err, "search history is corrupt, starting empty");
                Vec::new()
            }
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Moves an existing id to the front, or inserts it there; then caps and persists.
    pub fn add(&mut self, entry: HistoryEntry) {
        self.entries.retain(|e| e.id() != entry.id());
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY);
        self.persist();
    }

    pub fn remove(&mut self, id: &str) {
        let before = self.entries.len();
        self.entries.retain(|e| e.id() != id);
        if self.entries.len() != before {
            self.persist();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.entries)
            .map_err(PersistenceError::from)
            .and_then(|json| self.storage.set(HISTORY_KEY, &json));

        match result {
            Ok(()) => debug!(entries = self.entries.len(), "search history saved"),
            Err(err) => warn!(error = %err, "failed to save search history"),
        }
    }
}

/// Keeps the first occurrence of each id and applies the cap.
fn normalize(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.id().to_string()))
        .take(MAX_HISTORY)
        .collect()
}
