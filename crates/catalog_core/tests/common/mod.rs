#![allow(dead_code)]

use catalog_core::{
    ConsistencyManager, DocumentRecordStore, Genre, ManagerOptions, NewRecord, PartialWritePolicy,
    Record, RecordFilter, RecordId, RecordStore, SqliteRecordStore, StoreError, StoreResult,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Store wrapper whose writes can be switched to fail on demand.
pub struct FlakyStore {
    inner: Arc<dyn RecordStore>,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write_failed(self.inner.name(), "injected write failure"));
        }
        Ok(())
    }
}

impl RecordStore for FlakyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn initialize(&self) -> StoreResult<RecordId> {
        self.inner.initialize()
    }

    fn insert(&self, record: &Record) -> StoreResult<()> {
        self.check_write()?;
        self.inner.insert(record)
    }

    fn find_by_title(&self, title: &str) -> StoreResult<Option<RecordId>> {
        self.inner.find_by_title(title)
    }

    fn find_by_id(&self, id: RecordId) -> StoreResult<Option<Record>> {
        self.inner.find_by_id(id)
    }

    fn list_filtered(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>> {
        self.inner.list_filtered(filter)
    }

    fn update_price(&self, id: RecordId, new_price: f64) -> StoreResult<Option<f64>> {
        self.check_write()?;
        self.inner.update_price(id, new_price)
    }

    fn delete_by_id(&self, id: RecordId) -> StoreResult<bool> {
        self.check_write()?;
        self.inner.delete_by_id(id)
    }

    fn count(&self) -> StoreResult<u64> {
        self.inner.count()
    }
}

/// In-memory stores plus a manager over them.
pub struct Harness {
    pub primary: Arc<SqliteRecordStore>,
    pub secondary: Arc<DocumentRecordStore>,
    pub manager: ConsistencyManager,
}

pub fn harness() -> Harness {
    let primary = Arc::new(SqliteRecordStore::in_memory());
    let secondary = Arc::new(DocumentRecordStore::in_memory());
    let manager = ConsistencyManager::start(
        primary.clone(),
        secondary.clone(),
        ManagerOptions::default(),
    )
    .unwrap();
    Harness {
        primary,
        secondary,
        manager,
    }
}

/// Manager whose secondary store can be made to fail writes.
pub struct FlakyHarness {
    pub primary: Arc<SqliteRecordStore>,
    pub secondary: Arc<FlakyStore>,
    pub manager: ConsistencyManager,
}

pub fn flaky_harness(policy: PartialWritePolicy) -> FlakyHarness {
    let primary = Arc::new(SqliteRecordStore::in_memory());
    let secondary = Arc::new(FlakyStore::new(Arc::new(DocumentRecordStore::in_memory())));
    let options = ManagerOptions {
        partial_write_policy: policy,
        ..ManagerOptions::default()
    };
    let manager = ConsistencyManager::start(primary.clone(), secondary.clone(), options).unwrap();
    FlakyHarness {
        primary,
        secondary,
        manager,
    }
}

pub fn dune() -> NewRecord {
    NewRecord::new("Dune", "Frank Herbert", 1965, 10.0, [Genre::SciFi, Genre::Novel])
}

pub fn sample_records() -> Vec<Record> {
    vec![
        NewRecord::new("Dune", "Frank Herbert", 1965, 10.0, [Genre::SciFi, Genre::Novel])
            .into_record(1),
        NewRecord::new("akira", "Katsuhiro Otomo", 1982, 25.5, [Genre::Manga]).into_record(2),
        NewRecord::new("SPQR", "Mary Beard", 2015, 18.0, [Genre::History]).into_record(3),
        NewRecord::new("Children of Dune", "frank herbert", 1976, 9.0, [Genre::SciFi])
            .into_record(4),
        NewRecord::new("Clean Code", "Robert Martin", 2008, 40.0, []).into_record(5),
    ]
}

/// Behavior every `RecordStore` implementation must share.
///
/// `store` must be fresh and not yet initialized.
pub fn check_store_contract(store: &dyn RecordStore) {
    assert!(matches!(
        store.count(),
        Err(StoreError::Unavailable { .. })
    ));

    assert_eq!(store.initialize().unwrap(), 0);
    assert_eq!(store.initialize().unwrap(), 0);
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.list_filtered(&RecordFilter::default()).unwrap().is_empty());

    let records = sample_records();
    for record in &records {
        store.insert(record).unwrap();
    }
    assert!(matches!(
        store.insert(&records[0]),
        Err(StoreError::WriteFailed { .. })
    ));
    assert_eq!(store.count().unwrap(), 5);
    assert_eq!(store.initialize().unwrap(), 5);

    assert_eq!(store.find_by_title("dUNE").unwrap(), Some(1));
    assert_eq!(store.find_by_title("Dune Messiah").unwrap(), None);
    assert_eq!(store.find_by_id(3).unwrap().as_ref(), Some(&records[2]));
    assert_eq!(store.find_by_id(99).unwrap(), None);

    let titles = |filter: &RecordFilter| -> Vec<String> {
        store
            .list_filtered(filter)
            .unwrap()
            .into_iter()
            .map(|record| record.title)
            .collect()
    };
    assert_eq!(
        titles(&RecordFilter::default()),
        vec!["akira", "Children of Dune", "Clean Code", "Dune", "SPQR"]
    );
    assert_eq!(
        titles(&RecordFilter {
            author: Some("FRANK HERBERT".to_string()),
            ..RecordFilter::default()
        }),
        vec!["Children of Dune", "Dune"]
    );
    assert_eq!(
        titles(&RecordFilter {
            price_bigger_than: Some(10.0),
            price_less_than: Some(40.0),
            ..RecordFilter::default()
        }),
        vec!["akira", "SPQR"]
    );
    assert_eq!(
        titles(&RecordFilter {
            year_bigger_than: Some(1965),
            year_less_than: Some(2015),
            ..RecordFilter::default()
        }),
        vec!["akira", "Children of Dune", "Clean Code"]
    );
    assert_eq!(
        titles(&RecordFilter::default().with_genres_csv("MANGA,HISTORY").unwrap()),
        vec!["akira", "SPQR"]
    );
    assert_eq!(
        titles(&RecordFilter {
            author: Some("Frank Herbert".to_string()),
            genres: BTreeSet::from([Genre::Novel]),
            ..RecordFilter::default()
        }),
        vec!["Dune"]
    );

    assert_eq!(store.update_price(1, 12.5).unwrap(), Some(10.0));
    assert_eq!(store.find_by_id(1).unwrap().unwrap().price, 12.5);
    assert_eq!(store.update_price(99, 1.0).unwrap(), None);

    assert!(store.delete_by_id(5).unwrap());
    assert!(!store.delete_by_id(5).unwrap());
    assert_eq!(store.find_by_id(5).unwrap(), None);
    assert_eq!(store.count().unwrap(), 4);
}

/// Records written by one instance are visible to a reopened instance.
pub fn check_reopen_keeps_records(first: &dyn RecordStore, reopened: &dyn RecordStore) {
    first.initialize().unwrap();
    for record in sample_records() {
        first.insert(&record).unwrap();
    }
    first.delete_by_id(5).unwrap();

    assert_eq!(reopened.initialize().unwrap(), 4);
    assert_eq!(reopened.count().unwrap(), 4);
    assert_eq!(
        reopened.find_by_id(1).unwrap().as_ref(),
        Some(&sample_records()[0])
    );
}
