//! Entity store over an embedded key-value engine (redb).
//!
//! Records are serialized JSON stored under a type-prefixed primary key
//! (`<prefix>:id:<uuid>`). Each record also declares a set of secondary index
//! keys (by name, by status, by label, by parent + creation order) whose
//! values hold the primary key, so every index lookup is a two-hop read.
//! Index writes always happen in the same transaction as the primary write:
//! an update removes the index set derived from the pre-mutation record
//! before writing the new one, so mutable-field indexes never go stale.
//!
//! redb gives single-writer serializable transactions: writers queue at
//! `begin_write`, readers run against snapshots without blocking anyone.
//! That makes the check-then-write protocols below (uniqueness on create,
//! read-modify-write on update) atomic with respect to other writers.

use crate::error::{BerthError, Result};
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;


/// Single table holding every record and index entry, partitioned by key prefix.
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Capability contract for anything persisted by the store.
///
/// A record produces a primary key derived from its identity and zero or
/// more secondary index keys that map back to the primary key. Serialization
/// goes through serde (records are stored as JSON).
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Key-namespace prefix for this record type (e.g. `"stack"`).
    const PREFIX: &'static str;

    /// The record's identity.
    fn id(&self) -> Uuid;

    /// Secondary index keys for the record's current field values.
    fn index_keys(&self) -> Vec<String>;

    /// The primary key for this record.
    fn primary_key(&self) -> String {
        Self::key_of(self.id())
    }

    /// The primary key for an arbitrary id of this record type.
    fn key_of(id: Uuid) -> String {
        format!("{}:id:{}", Self::PREFIX, id)
    }

    /// The prefix under which all primary keys of this type live.
    fn primary_prefix() -> String {
        format!("{}:id:", Self::PREFIX)
    }
}

/// Handle to the embedded entity database.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BerthError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let db = Database::create(path).map_err(BerthError::storage)?;
        Self::init(db)
    }

    /// Create an in-memory store (for tests).
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(BerthError::storage)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        // Materialize the table so read transactions never race its creation.
        let txn = db.begin_write().map_err(BerthError::storage)?;
        txn.open_table(RECORDS).map_err(BerthError::storage)?;
        txn.commit().map_err(BerthError::storage)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a typed repository view over this store.
    pub fn repository<T: Record>(&self) -> Repository<T> {
        Repository { db: self.db.clone(), _record: PhantomData }
    }
}

/// Typed repository over the shared record table.
pub struct Repository<T: Record> {
    db: Arc<Database>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), _record: PhantomData }
    }
}

impl<T: Record> Repository<T> {
    /// Create a new record.
    ///
    /// `unique_keys` are checked for absence inside the same write
    /// transaction; a hit fails with Conflict and nothing is written.
    pub fn create(&self, record: &T, unique_keys: &[String]) -> Result<()> {
        let txn = self.db.begin_write().map_err(BerthError::storage)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(BerthError::storage)?;

            for key in unique_keys {
                let taken =
                    table.get(key.as_str()).map_err(BerthError::storage)?.is_some();
                if taken {
                    return Err(BerthError::Conflict { entity: T::PREFIX, key: key.clone() });
                }
            }

            let data = serde_json::to_vec(record).map_err(BerthError::serialization)?;
            let primary = record.primary_key();
            table.insert(primary.as_str(), data.as_slice()).map_err(|e| {
                metrics::counter!("berth_store_errors_total", "operation" => "create")
                    .increment(1);
                BerthError::storage(e)
            })?;
            for index in record.index_keys() {
                table
                    .insert(index.as_str(), primary.as_bytes())
                    .map_err(BerthError::storage)?;
            }
        }
        txn.commit().map_err(BerthError::storage)?;
        Ok(())
    }

    /// Read a record by id.
    pub fn get(&self, id: Uuid) -> Result<T> {
        let txn = self.db.begin_read().map_err(BerthError::storage)?;
        let table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
        Self::get_in(&table, id)
    }

    /// Read a record through a secondary index key.
    ///
    /// Resolves the index entry to a primary key, then performs the primary
    /// read; fails with NotFound if either hop misses.
    pub fn get_by_index(&self, index_key: &str) -> Result<T> {
        let txn = self.db.begin_read().map_err(BerthError::storage)?;
        let table = txn.open_table(RECORDS).map_err(BerthError::storage)?;

        let primary = {
            let guard = table
                .get(index_key)
                .map_err(BerthError::storage)?
                .ok_or_else(|| BerthError::not_found(T::PREFIX, index_key))?;
            String::from_utf8(guard.value().to_vec()).map_err(BerthError::serialization)?
        };

        let guard = table
            .get(primary.as_str())
            .map_err(BerthError::storage)?
            .ok_or_else(|| BerthError::not_found(T::PREFIX, &primary))?;
        serde_json::from_slice(guard.value()).map_err(BerthError::serialization)
    }

    /// Update a record through an explicit read-modify-write contract.
    ///
    /// The mutator receives the current record and returns the new value;
    /// the identity must not change. The index set derived from the old
    /// record is removed before the new set is written, all in one
    /// transaction. Returns the stored value.
    pub fn update<F>(&self, id: Uuid, mutate: F) -> Result<T>
    where
        F: FnOnce(&T) -> Result<T>,
    {
        let txn = self.db.begin_write().map_err(BerthError::storage)?;
        let updated = {
            let mut table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
            let old = Self::get_in(&table, id)?;
            let new = mutate(&old)?;
            if new.id() != old.id() {
                return Err(BerthError::NotAllowed {
                    reason: format!("{} identity is immutable", T::PREFIX),
                });
            }
            Self::write_in(&mut table, &old, &new)?;
            new
        };
        txn.commit().map_err(BerthError::storage)?;
        Ok(updated)
    }

    /// Update two records atomically in a single transaction.
    ///
    /// Either both new values are committed together with their reindexing,
    /// or the transaction aborts as one unit (including when the mutator
    /// rejects the pair).
    pub fn update_pair<F>(&self, first: Uuid, second: Uuid, mutate: F) -> Result<(T, T)>
    where
        F: FnOnce(&T, &T) -> Result<(T, T)>,
    {
        let txn = self.db.begin_write().map_err(BerthError::storage)?;
        let updated = {
            let mut table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
            let old_first = Self::get_in(&table, first)?;
            let old_second = Self::get_in(&table, second)?;
            let (new_first, new_second) = mutate(&old_first, &old_second)?;
            if new_first.id() != old_first.id() || new_second.id() != old_second.id() {
                return Err(BerthError::NotAllowed {
                    reason: format!("{} identity is immutable", T::PREFIX),
                });
            }
            Self::write_in(&mut table, &old_first, &new_first)?;
            Self::write_in(&mut table, &old_second, &new_second)?;
            (new_first, new_second)
        };
        txn.commit().map_err(BerthError::storage)?;
        Ok(updated)
    }

    /// Delete a record and its index entries.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let txn = self.db.begin_write().map_err(BerthError::storage)?;
        {
            let mut table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
            let old = Self::get_in(&table, id)?;
            for index in old.index_keys() {
                table.remove(index.as_str()).map_err(BerthError::storage)?;
            }
            table.remove(old.primary_key().as_str()).map_err(|e| {
                metrics::counter!("berth_store_errors_total", "operation" => "delete")
                    .increment(1);
                BerthError::storage(e)
            })?;
        }
        txn.commit().map_err(BerthError::storage)?;
        Ok(())
    }

    /// List all records of this type, in primary-key order.
    pub fn list(&self) -> Result<Vec<T>> {
        let txn = self.db.begin_read().map_err(BerthError::storage)?;
        let table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
        let prefix = T::primary_prefix();
        let end = scan_end(&prefix);

        let mut records = Vec::new();
        for item in table.range(prefix.as_str()..end.as_str()).map_err(BerthError::storage)? {
            let (_, value) = item.map_err(BerthError::storage)?;
            records
                .push(serde_json::from_slice(value.value()).map_err(BerthError::serialization)?);
        }
        Ok(records)
    }

    /// List records through an index prefix scan, in index-key order.
    ///
    /// Index keys embedding a sortable suffix (creation order) yield
    /// chronological results.
    pub fn list_by_index(&self, index_prefix: &str) -> Result<Vec<T>> {
        let txn = self.db.begin_read().map_err(BerthError::storage)?;
        let table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
        let end = scan_end(index_prefix);

        let mut primaries = Vec::new();
        for item in table.range(index_prefix..end.as_str()).map_err(BerthError::storage)? {
            let (_, value) = item.map_err(BerthError::storage)?;
            primaries.push(
                String::from_utf8(value.value().to_vec()).map_err(BerthError::serialization)?,
            );
        }

        let mut records = Vec::with_capacity(primaries.len());
        for primary in primaries {
            let guard = table
                .get(primary.as_str())
                .map_err(BerthError::storage)?
                .ok_or_else(|| BerthError::not_found(T::PREFIX, &primary))?;
            records
                .push(serde_json::from_slice(guard.value()).map_err(BerthError::serialization)?);
        }
        Ok(records)
    }

    /// Find the most recent record under an index prefix matching a predicate.
    ///
    /// Scans the index namespace in reverse, so keys with a sortable
    /// creation-order suffix are visited newest first. Absence of a match is
    /// not an error.
    pub fn latest_by_index<F>(&self, index_prefix: &str, predicate: F) -> Result<Option<T>>
    where
        F: Fn(&T) -> bool,
    {
        let txn = self.db.begin_read().map_err(BerthError::storage)?;
        let table = txn.open_table(RECORDS).map_err(BerthError::storage)?;
        let end = scan_end(index_prefix);

        for item in
            table.range(index_prefix..end.as_str()).map_err(BerthError::storage)?.rev()
        {
            let (_, value) = item.map_err(BerthError::storage)?;
            let primary =
                String::from_utf8(value.value().to_vec()).map_err(BerthError::serialization)?;
            let record: T = {
                let guard = table
                    .get(primary.as_str())
                    .map_err(BerthError::storage)?
                    .ok_or_else(|| BerthError::not_found(T::PREFIX, &primary))?;
                serde_json::from_slice(guard.value()).map_err(BerthError::serialization)?
            };
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn get_in(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        id: Uuid,
    ) -> Result<T> {
        let key = T::key_of(id);
        let guard = table
            .get(key.as_str())
            .map_err(BerthError::storage)?
            .ok_or_else(|| BerthError::not_found(T::PREFIX, id))?;
        serde_json::from_slice(guard.value()).map_err(BerthError::serialization)
    }

    /// Replace `old` with `new` inside an open write transaction, keeping the
    /// index namespace consistent with the new field values.
    fn write_in(
        table: &mut redb::Table<'_, &'static str, &'static [u8]>,
        old: &T,
        new: &T,
    ) -> Result<()> {
        for index in old.index_keys() {
            table.remove(index.as_str()).map_err(BerthError::storage)?;
        }
        let data = serde_json::to_vec(new).map_err(BerthError::serialization)?;
        let primary = new.primary_key();
        table.insert(primary.as_str(), data.as_slice()).map_err(|e| {
            metrics::counter!("berth_store_errors_total", "operation" => "update").increment(1);
            BerthError::storage(e)
        })?;
        for index in new.index_keys() {
            table.insert(index.as_str(), primary.as_bytes()).map_err(BerthError::storage)?;
        }
        Ok(())
    }
}

/// Exclusive upper bound for a prefix scan. Keys are ASCII, so a maximal
/// code point appended to the prefix sorts after every key in the namespace.
fn scan_end(prefix: &str) -> String {
    format!("{}\u{10FFFF}", prefix)
}
