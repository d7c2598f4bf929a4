//! In-memory record collections backing the users/products endpoints.
//!
//! A store lives for the lifetime of the process and is shared through
//! `Arc<Mutex<_>>`; every operation here is synchronous.

use thiserror::Error;

use crate::envelope::Pagination;

pub mod products;
pub mod users;

pub use products::{Product, ProductFilter, ProductPatch};
pub use users::{User, UserFilter, UserPatch};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(u64),
    #[error("duplicate key: {0}")]
    Conflict(String),
}

/// A record with a numeric id and a uniqueness key.
pub trait Record: Clone {
    fn id(&self) -> u64;

    /// Normalised value that must be unique across the store.
    fn unique_key(&self) -> String;
}

#[derive(Debug)]
pub struct RecordStore<T> {
    records: Vec<T>,
    next_id: u64,
}

impl<T: Record> Default for RecordStore<T> {
    fn default() -> Self {
        Self::with_records(Vec::new())
    }
}

impl<T: Record> RecordStore<T> {
    pub fn with_records(records: Vec<T>) -> Self {
        let next_id = records.iter().map(Record::id).max().unwrap_or(0) + 1;
        Self { records, next_id }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filtered page of records in insertion order, plus the filtered total.
    pub fn list<F>(&self, filter: F, pagination: Pagination) -> (Vec<T>, usize)
    where
        F: Fn(&T) -> bool,
    {
        let matched: Vec<&T> = self.records.iter().filter(|r| filter(r)).collect();
        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit)
            .cloned()
            .collect();
        (items, total)
    }

    pub fn get(&self, id: u64) -> Result<&T, StoreError> {
        self.records
            .iter()
            .find(|r| r.id() == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Builds a record with the next identifier and inserts it. The identifier
    /// is only consumed when the insert succeeds.
    pub fn create<F>(&mut self, build: F) -> Result<T, StoreError>
    where
        F: FnOnce(u64) -> T,
    {
        let record = build(self.next_id);
        let key = record.unique_key();
        if self.records.iter().any(|r| r.unique_key() == key) {
            return Err(StoreError::Conflict(key));
        }
        self.next_id += 1;
        self.records.push(record.clone());
        Ok(record)
    }

    /// Applies `patch` to a copy of the record and commits it only if the
    /// uniqueness key stays free.
    pub fn update<F>(&mut self, id: u64, patch: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let index = self.index_of(id)?;
        let mut updated = self.records[index].clone();
        patch(&mut updated);

        let key = updated.unique_key();
        let taken = self
            .records
            .iter()
            .any(|r| r.id() != id && r.unique_key() == key);
        if taken {
            return Err(StoreError::Conflict(key));
        }

        self.records[index] = updated.clone();
        Ok(updated)
    }

    pub fn delete(&mut self, id: u64) -> Result<T, StoreError> {
        let index = self.index_of(id)?;
        Ok(self.records.remove(index))
    }

    fn index_of(&self, id: u64) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| r.id() == id)
            .ok_or(StoreError::NotFound(id))
    }
}
