/// Key-value persistence for engine progress.
///
/// Each engine writes its whole per-animal map as one RON document under a
/// single key. Durability is best-effort: callers log and drop failures.
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON serialization error: {0}")]
    Serialize(#[from] ron::Error),
    #[error("RON deserialization error: {0}")]
    Deserialize(#[from] ron::error::SpannedError),
    #[error("invalid store key '{0}'")]
    InvalidKey(String),
}

/// Minimal key-value contract the engines persist through.
pub trait Store {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store. Used by tests and by hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Store for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Durable store keeping one `<key>.ron` file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.ron", key)))
    }
}

impl Store for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // Readers only ever see a complete document.
        let tmp = path.with_extension("ron.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }
}

/// Load a flat `(id, record)` list stored under `key`.
pub fn load_records<K, V>(store: &dyn Store, key: &str) -> Result<Vec<(K, V)>, StoreError>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    match store.read(key)? {
        Some(text) => Ok(ron::from_str(&text)?),
        None => Ok(Vec::new()),
    }
}

/// Overwrite `key` with a flat `(id, record)` list.
pub fn save_records<K, V>(store: &dyn Store, key: &str, records: &[(K, V)]) -> Result<(), StoreError>
where
    K: Serialize,
    V: Serialize,
{
    let text = ron::to_string(records)?;
    store.write(key, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.read("missing").unwrap(), None);
        store.write("k", "v").unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn records_round_trip_through_store() {
        let store = MemoryStore::new();
        let records = vec![(1u64, "fox".to_string()), (2u64, "owl".to_string())];
        save_records(&store, "animals", &records).unwrap();
        let loaded: Vec<(u64, String)> = load_records(&store, "animals").unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn missing_key_loads_empty() {
        let store = MemoryStore::new();
        let loaded: Vec<(u64, String)> = load_records(&store, "nothing").unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let store = MemoryStore::new();
        store.write("broken", "[(1, ").unwrap();
        let loaded: Result<Vec<(u64, String)>, _> = load_records(&store, "broken");
        assert!(matches!(loaded, Err(StoreError::Deserialize(_))));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("taming-store-{}", std::process::id()));
        {
            let store = FileStore::open(&dir).unwrap();
            store.write("taming-progress", "[]").unwrap();
        }
        let reopened = FileStore::open(&dir).unwrap();
        assert_eq!(reopened.read("taming-progress").unwrap().as_deref(), Some("[]"));
        assert_eq!(reopened.read("other").unwrap(), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = std::env::temp_dir().join(format!("taming-store-keys-{}", std::process::id()));
        let store = FileStore::open(&dir).unwrap();
        assert!(matches!(store.write("../escape", "x"), Err(StoreError::InvalidKey(_))));
        std::fs::remove_dir_all(&dir).ok();
    }
}
