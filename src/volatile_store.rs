//! In-memory [`RecordStore`] for running without offline capability.
//!
//! Used when the persistent store is unavailable and the caller opted into
//! degraded mode. Same contract as [`crate::local_store::LmdbStore`], nothing
//! survives the process. Index lookups scan the collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use log::debug;
use serde_json::Value;

use crate::error::{Operation, StoreError};
use crate::local_store::{assign_key, RecordStore};
use crate::record::{Key, Record};
use crate::schema::{CollectionDef, Schema};

#[derive(Default)]
struct VolatileCollection {
    records: BTreeMap<Key, Record>,
    counter: u64,
}

pub struct VolatileStore {
    schema: Schema,
    collections: Mutex<HashMap<String, VolatileCollection>>,
}

impl VolatileStore {
    pub fn new(schema: Schema) -> Self {
        let collections = schema
            .collections
            .iter()
            .map(|def| (def.name.clone(), VolatileCollection::default()))
            .collect();
        Self {
            schema,
            collections: Mutex::new(collections),
        }
    }

    fn lock(&self, collection: &str, operation: Operation) -> Result<MutexGuard<'_, HashMap<String, VolatileCollection>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::persistence(collection, operation, "volatile store lock poisoned"))
    }

    fn def(&self, collection: &str, operation: Operation) -> Result<&CollectionDef, StoreError> {
        self.schema
            .collection(collection)
            .ok_or_else(|| StoreError::persistence(collection, operation, "unknown collection"))
    }
}

impl RecordStore for VolatileStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn put(&self, collection: &str, mut record: Record, now: &str) -> Result<Key, StoreError> {
        let op = Operation::Put;
        let def = self.def(collection, op)?;
        let mut guard = self.lock(collection, op)?;
        let state = guard.entry(collection.to_string()).or_default();

        let next = state.counter + 1;
        let key = assign_key(def, &mut record, || Ok(next))?;
        if let Key::Seq(seq) = key {
            state.counter = state.counter.max(seq);
        }

        record.stamp(state.records.get(&key), now);
        state.records.insert(key.clone(), record);
        debug!("Stored {} in volatile {}", key, collection);
        Ok(key)
    }

    fn get(&self, collection: &str, key: &Key) -> Result<Option<Record>, StoreError> {
        let op = Operation::Get;
        self.def(collection, op)?;
        let guard = self.lock(collection, op)?;
        Ok(guard
            .get(collection)
            .and_then(|state| state.records.get(key))
            .cloned())
    }

    fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let op = Operation::GetAll;
        self.def(collection, op)?;
        let guard = self.lock(collection, op)?;
        Ok(guard
            .get(collection)
            .map(|state| state.records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        let op = Operation::QueryByIndex;
        let index_def = self.def(collection, op)?.find_index(index).ok_or_else(|| {
            StoreError::persistence(collection, op, format!("unknown index '{index}'"))
        })?;
        let guard = self.lock(collection, op)?;
        Ok(guard
            .get(collection)
            .map(|state| {
                state
                    .records
                    .values()
                    .filter(|record| index_def.value_of(record).as_ref() == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&self, collection: &str, key: &Key) -> Result<bool, StoreError> {
        let op = Operation::Delete;
        self.def(collection, op)?;
        let mut guard = self.lock(collection, op)?;
        Ok(guard
            .get_mut(collection)
            .and_then(|state| state.records.remove(key))
            .is_some())
    }

    fn clear(&self, collection: &str) -> Result<usize, StoreError> {
        let op = Operation::Clear;
        self.def(collection, op)?;
        let mut guard = self.lock(collection, op)?;
        Ok(guard
            .get_mut(collection)
            .map(|state| std::mem::take(&mut state.records).len())
            .unwrap_or(0))
    }
}
