use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const TASKS_KEY: &str = "tasks";
pub const DELETED_TASKS_KEY: &str = "deletedTasks";

/// String-valued key-value persistence. Every save carries the whole
/// aggregate for its key.
pub trait KeyValueStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!(file = %path.display(), "no stored value");
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), "saving atomically");

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;

        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-process store. `fail_saves` makes every save return an error,
/// which lets callers exercise the "persistence failed" path.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    pub fail_saves: bool,
    pub save_count: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.fail_saves {
            return Err(anyhow!("memory store rejecting save of {key}"));
        }
        self.values.insert(key.to_string(), value.to_string());
        self.save_count += 1;
        Ok(())
    }
}

/// Reads a JSON array stored under `key`. Missing, unreadable, or
/// malformed values all come back as an empty list.
#[tracing::instrument(skip(store))]
pub fn load_list<S, T>(store: &S, key: &str) -> Vec<T>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "failed to load; starting empty");
            return Vec::new();
        }
    };

    if raw.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => {
            debug!(key, count = items.len(), "loaded stored list");
            items
        }
        Err(err) => {
            warn!(key, error = %err, "stored value is malformed; starting empty");
            Vec::new()
        }
    }
}

#[tracing::instrument(skip(store, items), fields(count = items.len()))]
pub fn save_list<S, T>(store: &mut S, key: &str, items: &[T]) -> anyhow::Result<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize,
{
    let encoded =
        serde_json::to_string(items).with_context(|| format!("failed to encode {key}"))?;
    store
        .save(key, &encoded)
        .with_context(|| format!("failed to save {key}"))
}
