//! Flat JSON document storage.
//!
//! Every persisted collection (command replies, trusted mods, ignore list,
//! per-channel points) is one named document, read fully on load and
//! rewritten fully on save. The documents are small enough that synchronous
//! i/o on the dispatch path is not a concern.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

pub trait Store: Send + Sync {
    /// Loads a document. Ok(None) when the document does not exist yet.
    fn load(&self, doc: &str) -> Result<Option<Value>, StoreError>;

    /// Writes a document, replacing any previous content.
    fn save(&self, doc: &str, value: &Value) -> Result<(), StoreError>;
}

/// Loads a document and deserializes it, None when absent.
pub fn load_as<T: DeserializeOwned>(store: &dyn Store, doc: &str) -> Result<Option<T>, StoreError> {
    match store.load(doc)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serializes a value and writes it as a document.
pub fn save_as<T: Serialize>(store: &dyn Store, doc: &str, value: &T) -> Result<(), StoreError> {
    store.save(doc, &serde_json::to_value(value)?)
}

/// Stores every document as `<root>/<doc>.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> JsonFileStore {
        JsonFileStore { root: root.into() }
    }

    fn path_of(&self, doc: &str) -> PathBuf {
        self.root.join(format!("{}.json", doc))
    }
}

impl Store for JsonFileStore {
    fn load(&self, doc: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_of(doc);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, doc: &str, value: &Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_of(doc), serde_json::to_string_pretty(value)?)?;
        Ok(())
    }
}

/// In-memory store. Used by tests and by embedders that do not want
/// anything on disk.
#[derive(Default)]
pub struct MemStore {
    docs: RwLock<HashMap<String, Value>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }
}

impl Store for MemStore {
    fn load(&self, doc: &str) -> Result<Option<Value>, StoreError> {
        let docs = self.docs.read().expect("lock is poisoned, but this shouldn't have happened");
        Ok(docs.get(doc).cloned())
    }

    fn save(&self, doc: &str, value: &Value) -> Result<(), StoreError> {
        let mut docs = self.docs.write().expect("lock is poisoned, but this shouldn't have happened");
        docs.insert(doc.to_string(), value.clone());
        Ok(())
    }
}

/// Per-channel point totals, persisted as one document per channel.
///
/// Plain chat activity accumulates in memory only; an explicit award (game
/// win, completed pyramid) flushes the whole table to the store.
pub struct PointsLedger {
    doc: String,
    totals: HashMap<String, i64>,
    store: Arc<dyn Store>,
}

impl PointsLedger {
    pub fn load(store: Arc<dyn Store>, channel: &str) -> Result<PointsLedger, StoreError> {
        let doc = format!("points_{}", channel);
        let totals = load_as(store.as_ref(), &doc)?.unwrap_or_default();
        Ok(PointsLedger { doc, totals, store })
    }

    pub fn get(&self, user: &str) -> i64 {
        self.totals.get(user).copied().unwrap_or(0)
    }

    /// Bumps a user's total without persisting.
    pub fn add(&mut self, user: &str, amount: i64) {
        *self.totals.entry(user.to_string()).or_insert(0) += amount;
    }

    /// Bumps a user's total and persists the table.
    pub fn award(&mut self, user: &str, amount: i64) -> Result<(), StoreError> {
        self.add(user, amount);
        self.flush()
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        save_as(self.store.as_ref(), &self.doc, &self.totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> JsonFileStore {
        let unique = format!(
            "tmibot-test-{}-{:?}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        JsonFileStore::new(std::env::temp_dir().join(unique))
    }

    #[test]
    fn test_file_store_roundtrip() {
        let store = temp_store();

        assert!(store.load("things").unwrap().is_none());

        let mut table = HashMap::new();
        table.insert("hello".to_string(), "world".to_string());
        save_as(&store, "things", &table).unwrap();

        let loaded: HashMap<String, String> = load_as(&store, "things").unwrap().unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_mem_store_roundtrip() {
        let store = MemStore::new();
        save_as(&store, "things", &vec![1, 2, 3]).unwrap();
        let loaded: Vec<i32> = load_as(&store, "things").unwrap().unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn test_points_survive_reload() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());

        let mut points = PointsLedger::load(store.clone(), "chan").unwrap();
        points.add("somebody", 5);
        assert_eq!(points.get("somebody"), 5);
        points.award("somebody", 30).unwrap();

        let reloaded = PointsLedger::load(store.clone(), "chan").unwrap();
        assert_eq!(reloaded.get("somebody"), 35);
        assert_eq!(reloaded.get("anybody_else"), 0);
    }

    #[test]
    fn test_unflushed_points_are_not_persisted() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());

        let mut points = PointsLedger::load(store.clone(), "chan").unwrap();
        points.add("somebody", 5);

        let reloaded = PointsLedger::load(store, "chan").unwrap();
        assert_eq!(reloaded.get("somebody"), 0);
    }
}
