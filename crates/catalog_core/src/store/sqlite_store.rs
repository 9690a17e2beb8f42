//! Relational record store backed by SQLite.
//!
//! # Responsibility
//! - Map canonical records onto the `records` / `record_genres` tables.
//! - Keep SQL details inside the adapter boundary.
//!
//! # Invariants
//! - The shared id is the integer primary key `rawid`.
//! - Genres live in a child table and are removed by cascade on delete.
//! - Case-insensitive matching and ordering use the `*_key` columns, which
//!   hold `title_key()` output so both adapters agree byte for byte.

use crate::db::{open_db, open_db_in_memory};
use crate::model::filter::RecordFilter;
use crate::model::record::{title_key, Genre, Record, RecordId};
use crate::store::{RecordStore, StoreError, StoreResult};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

const RECORD_SELECT_SQL: &str = "SELECT
    rawid,
    title,
    author,
    year,
    price
FROM records";

#[derive(Debug, Clone)]
enum SqliteLocation {
    File(PathBuf),
    Memory,
}

/// Row shape before genre tags are parsed.
struct RecordRow {
    record: Record,
    genre_tags: Vec<String>,
}

/// SQLite-backed record store.
pub struct SqliteRecordStore {
    name: String,
    location: SqliteLocation,
    conn: Mutex<Option<Connection>>,
}

impl SqliteRecordStore {
    pub const DEFAULT_NAME: &'static str = "sqlite";

    /// Store persisted to a database file, opened on `initialize`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_location(SqliteLocation::File(path.into()))
    }

    /// Store held in a private in-memory database.
    pub fn in_memory() -> Self {
        Self::with_location(SqliteLocation::Memory)
    }

    /// Overrides the adapter name used for selection and diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn with_location(location: SqliteLocation) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            location,
            conn: Mutex::new(None),
        }
    }

    fn with_conn<T>(&self, op: impl FnOnce(&mut Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::unavailable(&self.name, "store is not initialized"));
        };
        op(conn)
    }

    fn read_error(&self, err: impl Display) -> StoreError {
        StoreError::read_failed(&self.name, err)
    }

    fn write_error(&self, err: impl Display) -> StoreError {
        StoreError::write_failed(&self.name, err)
    }

    fn load_records(
        &self,
        conn: &Connection,
        sql: &str,
        bind_values: Vec<Value>,
    ) -> StoreResult<Vec<Record>> {
        query_record_rows(conn, sql, bind_values)
            .map_err(|err| self.read_error(err))?
            .into_iter()
            .map(|row| self.finish_row(row))
            .collect()
    }

    fn finish_row(&self, row: RecordRow) -> StoreResult<Record> {
        let RecordRow {
            mut record,
            genre_tags,
        } = row;
        record.genres = genre_tags
            .iter()
            .map(|tag| {
                tag.parse::<Genre>().map_err(|_| {
                    StoreError::invalid_data(
                        &self.name,
                        format!("invalid genre `{tag}` in record_genres for record {}", record.id),
                    )
                })
            })
            .collect::<StoreResult<BTreeSet<_>>>()?;
        Ok(record)
    }
}

impl RecordStore for SqliteRecordStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self) -> StoreResult<RecordId> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let opened = match &self.location {
                SqliteLocation::File(path) => open_db(path),
                SqliteLocation::Memory => open_db_in_memory(),
            };
            *guard = Some(opened.map_err(|err| StoreError::unavailable(&self.name, err))?);
        }
        let Some(conn) = guard.as_ref() else {
            return Err(StoreError::unavailable(&self.name, "connection missing after open"));
        };

        let max_id: RecordId = conn
            .query_row("SELECT COALESCE(MAX(rawid), 0) FROM records;", [], |row| {
                row.get(0)
            })
            .map_err(|err| StoreError::unavailable(&self.name, err))?;
        info!(
            "event=store_init module=store status=ok store={} max_id={max_id}",
            self.name
        );
        Ok(max_id)
    }

    fn insert(&self, record: &Record) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| self.write_error(err))?;
            tx.execute(
                "INSERT INTO records (
                    rawid,
                    title,
                    title_key,
                    author,
                    author_key,
                    year,
                    price
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    record.id,
                    record.title.as_str(),
                    title_key(&record.title),
                    record.author.as_str(),
                    title_key(&record.author),
                    record.year,
                    record.price,
                ],
            )
            .map_err(|err| self.write_error(err))?;

            for genre in &record.genres {
                tx.execute(
                    "INSERT INTO record_genres (record_id, genre) VALUES (?1, ?2);",
                    params![record.id, genre.as_tag()],
                )
                .map_err(|err| self.write_error(err))?;
            }

            tx.commit().map_err(|err| self.write_error(err))
        })
    }

    fn find_by_title(&self, title: &str) -> StoreResult<Option<RecordId>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT rawid FROM records WHERE title_key = ?1;",
                [title_key(title)],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| self.read_error(err))
        })
    }

    fn find_by_id(&self, id: RecordId) -> StoreResult<Option<Record>> {
        self.with_conn(|conn| {
            let mut records = self.load_records(
                conn,
                &format!("{RECORD_SELECT_SQL} WHERE rawid = ?;"),
                vec![Value::Integer(id)],
            )?;
            Ok(records.pop())
        })
    }

    fn list_filtered(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>> {
        let mut sql = format!("{RECORD_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(author) = filter.author.as_deref() {
            sql.push_str(" AND author_key = ?");
            bind_values.push(Value::Text(title_key(author)));
        }
        if let Some(bound) = filter.price_bigger_than {
            sql.push_str(" AND price > ?");
            bind_values.push(Value::Real(bound));
        }
        if let Some(bound) = filter.price_less_than {
            sql.push_str(" AND price < ?");
            bind_values.push(Value::Real(bound));
        }
        if let Some(bound) = filter.year_bigger_than {
            sql.push_str(" AND year > ?");
            bind_values.push(Value::Integer(i64::from(bound)));
        }
        if let Some(bound) = filter.year_less_than {
            sql.push_str(" AND year < ?");
            bind_values.push(Value::Integer(i64::from(bound)));
        }
        if !filter.genres.is_empty() {
            let placeholders = vec!["?"; filter.genres.len()].join(", ");
            sql.push_str(&format!(
                " AND EXISTS (
                    SELECT 1
                    FROM record_genres g
                    WHERE g.record_id = records.rawid
                      AND g.genre IN ({placeholders})
                )"
            ));
            bind_values.extend(
                filter
                    .genres
                    .iter()
                    .map(|genre| Value::Text(genre.as_tag().to_string())),
            );
        }

        sql.push_str(" ORDER BY title_key ASC, rawid ASC;");
        self.with_conn(|conn| self.load_records(conn, &sql, bind_values))
    }

    fn update_price(&self, id: RecordId, new_price: f64) -> StoreResult<Option<f64>> {
        self.with_conn(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| self.write_error(err))?;
            let old_price: Option<f64> = tx
                .query_row(
                    "SELECT price FROM records WHERE rawid = ?1;",
                    [id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| self.write_error(err))?;
            let Some(old_price) = old_price else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE records
                 SET
                    price = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE rawid = ?1;",
                params![id, new_price],
            )
            .map_err(|err| self.write_error(err))?;
            tx.commit().map_err(|err| self.write_error(err))?;

            Ok(Some(old_price))
        })
    }

    fn delete_by_id(&self, id: RecordId) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM records WHERE rawid = ?1;", [id])
                .map_err(|err| self.write_error(err))?;
            Ok(changed == 1)
        })
    }

    fn count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM records;", [], |row| row.get(0))
                .map_err(|err| self.read_error(err))?;
            u64::try_from(count).map_err(|err| StoreError::invalid_data(&self.name, err))
        })
    }
}

fn query_record_rows(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> rusqlite::Result<Vec<RecordRow>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(Record {
            id: row.get("rawid")?,
            title: row.get("title")?,
            author: row.get("author")?,
            year: row.get("year")?,
            price: row.get("price")?,
            genres: BTreeSet::new(),
        });
    }

    records
        .into_iter()
        .map(|record| {
            let genre_tags = load_genre_tags(conn, record.id)?;
            Ok(RecordRow { record, genre_tags })
        })
        .collect()
}

fn load_genre_tags(conn: &Connection, id: RecordId) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT genre
         FROM record_genres
         WHERE record_id = ?1
         ORDER BY genre ASC;",
    )?;
    let mut rows = stmt.query([id])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get(0)?);
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::SqliteRecordStore;
    use crate::model::record::{Genre, NewRecord};
    use crate::store::{RecordStore, StoreError};

    #[test]
    fn operations_before_initialize_are_unavailable() {
        let store = SqliteRecordStore::in_memory();
        let err = store.count().unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { ref store, .. } if store == "sqlite"));
    }

    #[test]
    fn duplicate_id_insert_leaves_no_partial_genres() {
        let store = SqliteRecordStore::in_memory();
        store.initialize().unwrap();
        let first = NewRecord::new("Dune", "Herbert", 1965, 20.0, [Genre::SciFi]).into_record(1);
        store.insert(&first).unwrap();

        let clash = NewRecord::new("Other", "Someone", 1990, 5.0, [Genre::Manga]).into_record(1);
        let err = store.insert(&clash).unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed { .. }));

        let loaded = store.find_by_id(1).unwrap().unwrap();
        assert_eq!(loaded, first);
    }
}
