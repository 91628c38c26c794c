//! Generic Repository: one CRUD + indexed-query API for every collection.
//!
//! Store calls run on tokio's blocking pool so the calling task suspends
//! until its transaction completes without stalling the executor. The
//! repository never enqueues sync actions and never retries; both are the
//! caller's decision.

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;

use crate::error::{Operation, StoreError};
use crate::local_store::RecordStore;
use crate::record::{format_timestamp, Clock, Key, Record, SystemClock};
use crate::schema::Schema;

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl Repository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    /// Current time in the textual form stored in records.
    pub fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }

    /// Upserts `record` and returns its key. An existing record with the same
    /// key is fully replaced, keeping its `createdAt` when `record` has none.
    pub async fn put(&self, collection: &str, record: Record) -> Result<Key, StoreError> {
        let now = self.now();
        self.run(collection, Operation::Put, move |store, name| {
            store.put(name, record, &now)
        })
        .await
    }

    /// `Ok(None)` for a missing key.
    pub async fn get(&self, collection: &str, key: impl Into<Key>) -> Result<Option<Record>, StoreError> {
        let key = key.into();
        self.run(collection, Operation::Get, move |store, name| store.get(name, &key))
            .await
    }

    /// Every record of `collection`, in no guaranteed order.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        self.run(collection, Operation::GetAll, |store, name| store.get_all(name))
            .await
    }

    /// Records whose `index` field equals `value`.
    pub async fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Record>, StoreError> {
        let index = index.to_string();
        let value = value.into();
        self.run(collection, Operation::QueryByIndex, move |store, name| {
            store.query_by_index(name, &index, &value)
        })
        .await
    }

    /// Removes the record if present; a missing key is not an error.
    pub async fn delete(&self, collection: &str, key: impl Into<Key>) -> Result<(), StoreError> {
        let key = key.into();
        let removed = self
            .run(collection, Operation::Delete, move |store, name| store.delete(name, &key))
            .await?;
        if !removed {
            debug!("Delete on {} matched no record", collection);
        }
        Ok(())
    }

    pub async fn clear(&self, collection: &str) -> Result<usize, StoreError> {
        self.run(collection, Operation::Clear, |store, name| store.clear(name))
            .await
    }

    async fn run<T, F>(&self, collection: &str, operation: Operation, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RecordStore, &str) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let name = collection.to_string();
        let result = tokio::task::spawn_blocking(move || f(store.as_ref(), &name))
            .await
            .unwrap_or_else(|e| Err(StoreError::persistence(collection, operation, e)));

        if let Err(e) = &result {
            warn!("{}", e);
        }
        result
    }
}
