mod common;

use catalog_core::{DocumentRecordStore, Genre, NewRecord, RecordStore, SqliteRecordStore};
use common::{check_reopen_keeps_records, check_store_contract};

#[test]
fn sqlite_store_honors_contract() {
    check_store_contract(&SqliteRecordStore::in_memory());
}

#[test]
fn document_store_honors_contract() {
    check_store_contract(&DocumentRecordStore::in_memory());
}

#[test]
fn file_backed_stores_honor_contract() {
    let dir = tempfile::tempdir().unwrap();
    check_store_contract(&SqliteRecordStore::open(dir.path().join("records.sqlite3")));
    check_store_contract(&DocumentRecordStore::open(dir.path().join("records.json")));
}

#[test]
fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.sqlite3");
    check_reopen_keeps_records(
        &SqliteRecordStore::open(&path),
        &SqliteRecordStore::open(&path),
    );
}

#[test]
fn document_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");
    check_reopen_keeps_records(
        &DocumentRecordStore::open(&path),
        &DocumentRecordStore::open(&path),
    );
}

#[test]
fn adapter_names_are_configurable() {
    let store = SqliteRecordStore::in_memory().with_name("relational");
    assert_eq!(store.name(), "relational");
    assert_eq!(DocumentRecordStore::in_memory().name(), "document");
}

#[test]
fn record_round_trips_through_either_adapter() {
    let record = NewRecord::new("Dune", "Herbert", 1965, 20.0, [Genre::SciFi]).into_record(1);
    let sqlite = SqliteRecordStore::in_memory();
    let document = DocumentRecordStore::in_memory();
    let stores: [&dyn RecordStore; 2] = [&sqlite, &document];

    for store in stores {
        store.initialize().unwrap();
        store.insert(&record).unwrap();
        assert_eq!(store.find_by_id(1).unwrap().as_ref(), Some(&record));
        assert_eq!(store.find_by_id(1).unwrap().as_ref(), Some(&record));
        assert_eq!(store.find_by_title("DUNE").unwrap(), Some(1));
    }
}
