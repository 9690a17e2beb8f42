//! Document record store.
//!
//! # Responsibility
//! - Keep records as self-contained documents with a store-native `_id`.
//! - Optionally persist the whole collection as one JSON file.
//!
//! # Invariants
//! - `_id` is a generated UUID and never equals the shared record id.
//! - The shared id lives in the `recordId` field and is unique per collection.
//! - A mutation is visible in memory only after the file write succeeded.
//! - The collection file is replaced atomically: the temp file is synced,
//!   renamed over the old file, then the directory is synced.

use crate::model::filter::RecordFilter;
use crate::model::record::{title_key, Genre, Record, RecordId};
use crate::store::{RecordStore, StoreError, StoreResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Persisted document shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordDocument {
    #[serde(rename = "_id")]
    object_id: String,
    record_id: RecordId,
    title: String,
    author: String,
    year: i32,
    price: f64,
    genres: Vec<String>,
}

impl RecordDocument {
    fn from_record(record: &Record) -> Self {
        Self {
            object_id: Uuid::new_v4().to_string(),
            record_id: record.id,
            title: record.title.clone(),
            author: record.author.clone(),
            year: record.year,
            price: record.price,
            genres: record
                .genres
                .iter()
                .map(|genre| genre.as_tag().to_string())
                .collect(),
        }
    }

    fn to_record(&self, store: &str) -> StoreResult<Record> {
        let genres = self
            .genres
            .iter()
            .map(|tag| {
                tag.parse::<Genre>().map_err(|_| {
                    StoreError::invalid_data(
                        store,
                        format!(
                            "invalid genre `{tag}` in document {} (recordId {})",
                            self.object_id, self.record_id
                        ),
                    )
                })
            })
            .collect::<StoreResult<BTreeSet<_>>>()?;

        Ok(Record {
            id: self.record_id,
            title: self.title.clone(),
            author: self.author.clone(),
            year: self.year,
            price: self.price,
            genres,
        })
    }
}

/// In-memory collection with a secondary index on the shared id.
#[derive(Debug, Default)]
struct Collection {
    documents: BTreeMap<String, RecordDocument>,
    by_record_id: HashMap<RecordId, String>,
}

impl Collection {
    fn from_documents(store: &str, documents: Vec<RecordDocument>) -> StoreResult<Self> {
        let mut collection = Self::default();
        for document in documents {
            if collection.by_record_id.contains_key(&document.record_id) {
                return Err(StoreError::invalid_data(
                    store,
                    format!("duplicate recordId {} in collection", document.record_id),
                ));
            }
            collection.put(document);
        }
        Ok(collection)
    }

    fn put(&mut self, document: RecordDocument) {
        self.by_record_id
            .insert(document.record_id, document.object_id.clone());
        self.documents.insert(document.object_id.clone(), document);
    }

    fn remove(&mut self, id: RecordId) -> Option<RecordDocument> {
        let object_id = self.by_record_id.remove(&id)?;
        self.documents.remove(&object_id)
    }

    fn get(&self, id: RecordId) -> Option<&RecordDocument> {
        self.by_record_id
            .get(&id)
            .and_then(|object_id| self.documents.get(object_id))
    }

    fn get_mut(&mut self, id: RecordId) -> Option<&mut RecordDocument> {
        let object_id = self.by_record_id.get(&id)?;
        self.documents.get_mut(object_id)
    }

    fn max_record_id(&self) -> RecordId {
        self.by_record_id.keys().copied().max().unwrap_or(0)
    }
}

/// Document-oriented record store.
pub struct DocumentRecordStore {
    name: String,
    location: Option<PathBuf>,
    collection: RwLock<Option<Collection>>,
}

impl DocumentRecordStore {
    pub const DEFAULT_NAME: &'static str = "document";

    /// Store persisted to a JSON collection file, loaded on `initialize`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Some(path.into()))
    }

    /// Store kept in memory only.
    pub fn in_memory() -> Self {
        Self::with_location(None)
    }

    /// Overrides the adapter name used for selection and diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn with_location(location: Option<PathBuf>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            location,
            collection: RwLock::new(None),
        }
    }

    fn read<T>(&self, op: impl FnOnce(&Collection) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self
            .collection
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(collection) = guard.as_ref() else {
            return Err(StoreError::unavailable(&self.name, "store is not initialized"));
        };
        op(collection)
    }

    fn write<T>(&self, op: impl FnOnce(&mut Collection) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self
            .collection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(collection) = guard.as_mut() else {
            return Err(StoreError::unavailable(&self.name, "store is not initialized"));
        };
        op(collection)
    }

    fn load(&self) -> StoreResult<Collection> {
        let Some(path) = self.location.as_deref() else {
            return Ok(Collection::default());
        };
        if !path.exists() {
            return Ok(Collection::default());
        }

        let bytes = fs::read(path).map_err(|err| {
            StoreError::unavailable(
                &self.name,
                format!("failed to read collection `{}`: {err}", path.display()),
            )
        })?;
        let documents: Vec<RecordDocument> = serde_json::from_slice(&bytes).map_err(|err| {
            StoreError::unavailable(
                &self.name,
                format!("failed to parse collection `{}`: {err}", path.display()),
            )
        })?;
        Collection::from_documents(&self.name, documents)
            .map_err(|err| StoreError::unavailable(&self.name, err))
    }

    fn persist(&self, collection: &Collection) -> StoreResult<()> {
        let Some(path) = self.location.as_deref() else {
            return Ok(());
        };
        let documents: Vec<&RecordDocument> = collection.documents.values().collect();
        let bytes = serde_json::to_vec_pretty(&documents)
            .map_err(|err| StoreError::write_failed(&self.name, err))?;
        write_atomically(path, &bytes).map_err(|err| {
            StoreError::write_failed(
                &self.name,
                format!("failed to write collection `{}`: {err}", path.display()),
            )
        })
    }
}

impl RecordStore for DocumentRecordStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self) -> StoreResult<RecordId> {
        let mut guard = self
            .collection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        let max_id = guard.as_ref().map_or(0, Collection::max_record_id);
        info!(
            "event=store_init module=store status=ok store={} max_id={max_id} persisted={}",
            self.name,
            self.location.is_some()
        );
        Ok(max_id)
    }

    fn insert(&self, record: &Record) -> StoreResult<()> {
        self.write(|collection| {
            if collection.by_record_id.contains_key(&record.id) {
                return Err(StoreError::write_failed(
                    &self.name,
                    format!("recordId {} already exists", record.id),
                ));
            }

            collection.put(RecordDocument::from_record(record));
            if let Err(err) = self.persist(collection) {
                collection.remove(record.id);
                return Err(err);
            }
            Ok(())
        })
    }

    fn find_by_title(&self, title: &str) -> StoreResult<Option<RecordId>> {
        let key = title_key(title);
        self.read(|collection| {
            Ok(collection
                .documents
                .values()
                .filter(|document| title_key(&document.title) == key)
                .map(|document| document.record_id)
                .min())
        })
    }

    fn find_by_id(&self, id: RecordId) -> StoreResult<Option<Record>> {
        self.read(|collection| {
            collection
                .get(id)
                .map(|document| document.to_record(&self.name))
                .transpose()
        })
    }

    fn list_filtered(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>> {
        self.read(|collection| {
            let mut records = Vec::new();
            for document in collection.documents.values() {
                let record = document.to_record(&self.name)?;
                if filter.matches(&record) {
                    records.push(record);
                }
            }
            records.sort_by(|left, right| {
                title_key(&left.title)
                    .cmp(&title_key(&right.title))
                    .then(left.id.cmp(&right.id))
            });
            Ok(records)
        })
    }

    fn update_price(&self, id: RecordId, new_price: f64) -> StoreResult<Option<f64>> {
        self.write(|collection| {
            let Some(document) = collection.get_mut(id) else {
                return Ok(None);
            };
            let old_price = document.price;
            document.price = new_price;

            if let Err(err) = self.persist(collection) {
                if let Some(document) = collection.get_mut(id) {
                    document.price = old_price;
                }
                return Err(err);
            }
            Ok(Some(old_price))
        })
    }

    fn delete_by_id(&self, id: RecordId) -> StoreResult<bool> {
        self.write(|collection| {
            let Some(removed) = collection.remove(id) else {
                return Ok(false);
            };
            if let Err(err) = self.persist(collection) {
                collection.put(removed);
                return Err(err);
            }
            Ok(true)
        })
    }

    fn count(&self) -> StoreResult<u64> {
        self.read(|collection| Ok(collection.documents.len() as u64))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    // Once renamed, the new collection is the visible one: a failed
    // directory sync is logged, not returned.
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = File::open(parent).and_then(|dir| dir.sync_all()) {
            warn!(
                "event=collection_dir_sync module=store status=error dir={} error={err}",
                parent.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DocumentRecordStore, RecordDocument};
    use crate::model::record::{Genre, NewRecord};
    use crate::store::{RecordStore, StoreError};

    #[test]
    fn native_object_id_differs_from_shared_id() {
        let record = NewRecord::new("Dune", "Herbert", 1965, 20.0, [Genre::SciFi]).into_record(7);
        let document = RecordDocument::from_record(&record);
        assert_eq!(document.record_id, 7);
        assert_ne!(document.object_id, "7");

        let json = serde_json::to_value(&document).unwrap();
        assert!(json.get("_id").is_some());
        assert_eq!(json["recordId"], 7);
        assert_eq!(json["genres"][0], "SCI_FI");
    }

    #[test]
    fn collection_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = DocumentRecordStore::open(&path);
        assert_eq!(store.initialize().unwrap(), 0);
        let record = NewRecord::new("Dune", "Herbert", 1965, 20.0, [Genre::SciFi]).into_record(3);
        store.insert(&record).unwrap();
        drop(store);

        let reopened = DocumentRecordStore::open(&path);
        assert_eq!(reopened.initialize().unwrap(), 3);
        assert_eq!(reopened.find_by_id(3).unwrap(), Some(record));
    }

    #[test]
    fn stale_temp_file_is_replaced_and_not_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let tmp_path = dir.path().join("records.json.tmp");
        std::fs::write(&tmp_path, b"[{\"truncated").unwrap();

        let store = DocumentRecordStore::open(&path);
        store.initialize().unwrap();
        let record = NewRecord::new("Dune", "Herbert", 1965, 20.0, [Genre::SciFi]).into_record(1);
        store.insert(&record).unwrap();
        store.update_price(1, 25.0).unwrap();

        assert!(!tmp_path.exists());
        let reopened = DocumentRecordStore::open(&path);
        assert_eq!(reopened.initialize().unwrap(), 1);
        assert_eq!(reopened.find_by_id(1).unwrap().unwrap().price, 25.0);
    }

    #[test]
    fn failed_persist_does_not_apply_insert() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let store = DocumentRecordStore::open(blocker.join("records.json"));
        store.initialize().unwrap();
        let record = NewRecord::new("Dune", "Herbert", 1965, 20.0, [Genre::SciFi]).into_record(1);
        let err = store.insert(&record).unwrap_err();

        assert!(matches!(err, StoreError::WriteFailed { .. }));
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.find_by_id(1).unwrap(), None);
    }

    #[test]
    fn unreadable_collection_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = DocumentRecordStore::open(&path).initialize().unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }
}
