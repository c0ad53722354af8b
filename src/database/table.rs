//! In-memory keyed tables and append-only logs.
//!
//! `Table::update` runs the caller's closure against a copy of the record
//! while holding the table's write lock and only writes the copy back when
//! the closure succeeds, so a rejected operation never leaves a half-applied
//! record behind and two writers on the same table cannot lose each other's
//! updates.

use std::collections::HashMap;
use std::sync::RwLock;

use super::error::{StorageError, StorageResult};

pub struct Table<T> {
    entity: &'static str,
    rows: RwLock<HashMap<String, T>>,
}

impl<T: Clone> Table<T> {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned(&self) -> StorageError {
        StorageError::LockPoisoned(self.entity.to_string())
    }

    pub fn insert(&self, id: &str, row: T) -> StorageResult<()> {
        let mut rows = self.rows.write().map_err(|_| self.poisoned())?;
        if rows.contains_key(id) {
            return Err(StorageError::already_exists(self.entity, id));
        }
        rows.insert(id.to_string(), row);
        Ok(())
    }

    pub fn upsert(&self, id: &str, row: T) -> StorageResult<()> {
        let mut rows = self.rows.write().map_err(|_| self.poisoned())?;
        rows.insert(id.to_string(), row);
        Ok(())
    }

    pub fn get(&self, id: &str) -> StorageResult<Option<T>> {
        let rows = self.rows.read().map_err(|_| self.poisoned())?;
        Ok(rows.get(id).cloned())
    }

    pub fn require(&self, id: &str) -> StorageResult<T> {
        self.get(id)?
            .ok_or_else(|| StorageError::not_found(self.entity, id))
    }

    pub fn remove(&self, id: &str) -> StorageResult<Option<T>> {
        let mut rows = self.rows.write().map_err(|_| self.poisoned())?;
        Ok(rows.remove(id))
    }

    pub fn list<P>(&self, predicate: P) -> StorageResult<Vec<T>>
    where
        P: Fn(&T) -> bool,
    {
        let rows = self.rows.read().map_err(|_| self.poisoned())?;
        Ok(rows.values().filter(|row| predicate(row)).cloned().collect())
    }

    /// Atomic read-modify-write of one row
    pub fn update<R, E, F>(&self, id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
        E: From<StorageError>,
    {
        let mut rows = self.rows.write().map_err(|_| E::from(self.poisoned()))?;
        let current = rows
            .get(id)
            .ok_or_else(|| E::from(StorageError::not_found(self.entity, id)))?;

        let mut draft = current.clone();
        let result = f(&mut draft)?;
        rows.insert(id.to_string(), draft);
        Ok(result)
    }
}

/// Append-only record log
pub struct AppendLog<T> {
    entity: &'static str,
    entries: RwLock<Vec<T>>,
}

impl<T: Clone> AppendLog<T> {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn append(&self, entry: T) -> StorageResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned(self.entity.to_string()))?;
        entries.push(entry);
        Ok(())
    }

    /// Matching entries in insertion order
    pub fn query<P>(&self, predicate: P) -> StorageResult<Vec<T>>
    where
        P: Fn(&T) -> bool,
    {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned(self.entity.to_string()))?;
        Ok(entries.iter().filter(|e| predicate(e)).cloned().collect())
    }
}
