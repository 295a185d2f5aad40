use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::state::{Settings, StoreState, Theme};
use crate::task::{Task, TaskRecord, stored_instant};

/// Key the state document is stored under.
pub const STORAGE_KEY: &str = "taskflow-pro-data";

/// Key/value medium the bridge mirrors state into.
pub trait StateStorage: Send {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One JSON file per key inside a data directory.
#[derive(Debug)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl StateStorage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "no stored document");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "writing document atomically");

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-process storage. Clones share the same entries, so a caller can keep
/// a handle after moving one into a bridge.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    /// Makes every following write fail, for exercising save errors.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("memory storage rejected write to {key}"));
        }
        self.insert(key, value);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState<'a> {
    tasks: &'a [Task],
    theme: Theme,
    settings: &'a Settings,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument {
    #[serde(default)]
    tasks: Option<Vec<Value>>,
    #[serde(default)]
    theme: Option<Value>,
    #[serde(default)]
    settings: Option<Value>,
    #[serde(default)]
    last_updated: Option<Value>,
}

/// Loads the store at startup and mirrors every persisted change.
///
/// Only tasks, theme, settings and `lastUpdated` are written; filter and
/// search belong to the session.
pub struct PersistenceBridge {
    storage: Box<dyn StateStorage>,
    key: String,
}

impl PersistenceBridge {
    pub fn new(storage: Box<dyn StateStorage>) -> Self {
        Self {
            storage,
            key: STORAGE_KEY.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads stored state, falling back to `None` on any failure.
    #[tracing::instrument(skip(self, now), fields(key = %self.key))]
    pub fn load(&self, now: DateTime<Utc>) -> Option<StoreState> {
        match self.try_load(now) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "failed loading stored state; using defaults");
                None
            }
        }
    }

    /// Like [`PersistenceBridge::load`] but reports why loading failed.
    ///
    /// Individual task records that cannot be read are skipped with a
    /// warning rather than failing the whole document; malformed fields
    /// fall back to their defaults.
    pub fn try_load(&self, now: DateTime<Utc>) -> Result<Option<StoreState>, StoreError> {
        let Some(raw) = self
            .storage
            .read(&self.key)
            .map_err(StoreError::persistence)?
        else {
            return Ok(None);
        };

        let doc: StoredDocument = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing stored document {}", self.key))
            .map_err(StoreError::persistence)?;

        let raw_tasks = doc.tasks.unwrap_or_default();
        let mut tasks = Vec::with_capacity(raw_tasks.len());
        let mut seen = HashSet::new();
        for (idx, value) in raw_tasks.into_iter().enumerate() {
            let task = serde_json::from_value::<TaskRecord>(value)
                .map_err(|err| StoreError::InvalidFormat(err.to_string()))
                .and_then(|record| record.into_task(now));
            match task {
                Ok(task) if seen.insert(task.id.clone()) => tasks.push(task),
                Ok(task) => warn!(index = idx, id = %task.id, "skipping duplicate stored task"),
                Err(err) => warn!(index = idx, error = %err, "skipping unreadable stored task"),
            }
        }

        let theme = match doc.theme {
            None | Some(Value::Null) => Theme::default(),
            Some(Value::String(raw)) => Theme::from(Some(raw)),
            Some(other) => {
                warn!(value = %other, "ignoring stored theme");
                Theme::default()
            }
        };

        debug!(count = tasks.len(), "loaded stored tasks");
        Ok(Some(StoreState {
            tasks,
            theme,
            settings: doc
                .settings
                .map(|value| Settings::from_stored(&value))
                .unwrap_or_default(),
            last_updated: doc
                .last_updated
                .and_then(|value| stored_instant("lastUpdated", &value)),
            ..StoreState::default()
        }))
    }

    #[tracing::instrument(skip(self, state), fields(key = %self.key, tasks = state.tasks.len()))]
    pub fn save(&mut self, state: &StoreState) -> Result<(), StoreError> {
        let doc = PersistedState {
            tasks: &state.tasks,
            theme: state.theme,
            settings: &state.settings,
            last_updated: state.last_updated,
        };
        let serialized = serde_json::to_string(&doc)
            .context("failed serializing state")
            .map_err(StoreError::persistence)?;
        self.storage
            .write(&self.key, &serialized)
            .map_err(StoreError::persistence)?;
        debug!(bytes = serialized.len(), "saved state");
        Ok(())
    }
}
