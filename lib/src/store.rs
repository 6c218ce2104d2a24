//! A thin transactional layer over `redb`.
//!
//! One [`Store`] is one database file holding any number of named tables,
//! each a sorted map from byte-string keys to `u64` values. All access goes
//! through [`Store::read`] or [`Store::write`], which hand a transaction to a
//! closure and make sure it is released again: a write closure returning
//! `Ok` commits, anything else aborts and leaves the committed state as it
//! was.
use std::fs;
use std::path::Path;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableHandle};
use tracing::{debug, warn};

use crate::errors::{KmerError, KmerResult};

type Key = &'static [u8];

fn definition(name: &str) -> TableDefinition<'_, Key, u64> {
    TableDefinition::new(name)
}

/// Limits on how far a store is allowed to grow
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreConfig {
    pub max_tables: usize,
    /// Upper bound in bytes on the allocated size of the database file.
    pub max_size: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_tables: 400,
            max_size: 160_000_000_000,
        }
    }
}

pub struct Store {
    db: Database,
    config: StoreConfig,
    path: String,
}

impl Store {
    /// Open the store at `path`, creating it (and its parent directory) if
    /// needed.
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> KmerResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| KmerError::io(&shown, e))?;
            }
        }
        let db = Database::create(path).map_err(|e| database_error(&shown, e))?;
        debug!(path = %shown, "opened store");
        Ok(Store {
            db,
            config,
            path: shown,
        })
    }

    /// Open a store that must already exist.
    pub fn open_existing<P: AsRef<Path>>(path: P, config: StoreConfig) -> KmerResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        if !path.is_file() {
            return Err(KmerError::io(
                &shown,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no store at this path"),
            ));
        }
        let db = Database::open(path).map_err(|e| database_error(&shown, e))?;
        Ok(Store {
            db,
            config,
            path: shown,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run `f` against a read-only snapshot of the store.
    pub fn read<T, F>(&self, f: F) -> KmerResult<T>
    where
        F: FnOnce(&ReadTxn) -> KmerResult<T>,
    {
        let txn = ReadTxn {
            txn: self.db.begin_read()?,
        };
        f(&txn)
    }

    /// Run `f` inside a write transaction; commit if it succeeds and abort
    /// otherwise. Only one write transaction runs at a time.
    pub fn write<T, F>(&self, f: F) -> KmerResult<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> KmerResult<T>,
    {
        let mut txn = WriteTxn {
            txn: self.db.begin_write()?,
            config: &self.config,
        };
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "aborting write transaction");
                txn.abort();
                Err(e)
            }
        }
    }
}

fn database_error(path: &str, e: redb::DatabaseError) -> KmerError {
    match e {
        redb::DatabaseError::Storage(redb::StorageError::Io(io)) => KmerError::io(path, io),
        e => e.into(),
    }
}

pub struct ReadTxn {
    txn: redb::ReadTransaction,
}

impl ReadTxn {
    /// Open an existing table; `None` if it was never created.
    pub fn table(&self, name: &str) -> KmerResult<Option<TableRef>> {
        match self.txn.open_table(definition(name)) {
            Ok(inner) => Ok(Some(Table {
                inner,
                name: name.to_string(),
            })),
            Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn table_names(&self) -> KmerResult<Vec<String>> {
        Ok(self
            .txn
            .list_tables()?
            .map(|t| t.name().to_string())
            .collect())
    }
}

pub struct WriteTxn<'s> {
    txn: redb::WriteTransaction,
    config: &'s StoreConfig,
}

impl WriteTxn<'_> {
    /// Open a table, creating it if it doesn't exist yet.
    pub fn table(&self, name: &str) -> KmerResult<TableMut<'_>> {
        if !self.has_table(name)? {
            let existing = self.table_names()?.len();
            if existing >= self.config.max_tables {
                return Err(KmerError::Capacity(format!(
                    "cannot create table {}: store already holds {} of {} tables",
                    name, existing, self.config.max_tables
                )));
            }
        }
        let inner = self.txn.open_table(definition(name))?;
        Ok(Table {
            inner,
            name: name.to_string(),
        })
    }

    pub fn has_table(&self, name: &str) -> KmerResult<bool> {
        Ok(self.table_names()?.iter().any(|n| n == name))
    }

    pub fn table_names(&self) -> KmerResult<Vec<String>> {
        Ok(self
            .txn
            .list_tables()?
            .map(|t| t.name().to_string())
            .collect())
    }

    fn commit(self) -> KmerResult<()> {
        let WriteTxn { txn, config } = self;
        let stats = txn.stats()?;
        let size = stats.allocated_pages() * stats.page_size() as u64;
        if size > config.max_size {
            if let Err(e) = txn.abort() {
                warn!(error = %e, "failed to abort oversized transaction");
            }
            return Err(KmerError::Capacity(format!(
                "store would grow to {} bytes, over the {} byte limit",
                size, config.max_size
            )));
        }
        txn.commit()?;
        Ok(())
    }

    fn abort(self) {
        if let Err(e) = self.txn.abort() {
            warn!(error = %e, "failed to abort write transaction");
        }
    }
}

/// One named table; read access for any transaction, writes only when
/// opened through a [`WriteTxn`].
pub struct Table<T> {
    inner: T,
    name: String,
}

pub type TableRef = Table<redb::ReadOnlyTable<Key, u64>>;
pub type TableMut<'txn> = Table<redb::Table<'txn, Key, u64>>;

impl<T: ReadableTable<Key, u64>> Table<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &[u8]) -> KmerResult<Option<u64>> {
        Ok(self.inner.get(key)?.map(|v| v.value()))
    }

    pub fn contains(&self, key: &[u8]) -> KmerResult<bool> {
        Ok(self.inner.get(key)?.is_some())
    }

    pub fn len(&self) -> KmerResult<u64> {
        Ok(self.inner.len()?)
    }

    pub fn is_empty(&self) -> KmerResult<bool> {
        Ok(self.inner.is_empty()?)
    }

    /// All entries in ascending key order.
    pub fn cursor(&self) -> KmerResult<Cursor<'_>> {
        Ok(Cursor {
            inner: self.inner.iter()?,
        })
    }

    pub fn keys(&self) -> KmerResult<Vec<Vec<u8>>> {
        self.cursor()?.map(|e| e.map(|(k, _)| k)).collect()
    }
}

impl Table<redb::Table<'_, Key, u64>> {
    /// Store `value` under `key`. With `overwrite` unset an existing entry
    /// is left alone and `false` is returned.
    pub fn put(&mut self, key: &[u8], value: u64, overwrite: bool) -> KmerResult<bool> {
        if !overwrite {
            let exists = self.inner.get(key)?.is_some();
            if exists {
                return Ok(false);
            }
        }
        self.inner.insert(key, value)?;
        Ok(true)
    }

    pub fn delete(&mut self, key: &[u8]) -> KmerResult<bool> {
        let removed = self.inner.remove(key)?.is_some();
        Ok(removed)
    }

    /// Remove every entry; the table itself stays defined.
    pub fn clear(&mut self) -> KmerResult<u64> {
        let removed = self.len()?;
        self.inner.retain(|_, _| false)?;
        Ok(removed)
    }
}

pub struct Cursor<'t> {
    inner: redb::Range<'t, Key, u64>,
}

impl Iterator for Cursor<'_> {
    type Item = KmerResult<(Vec<u8>, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| {
            entry
                .map(|(k, v)| (k.value().to_vec(), v.value()))
                .map_err(KmerError::from)
        })
    }
}
