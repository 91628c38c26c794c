//! Persistent collection store on LMDB.
//!
//! Layout inside one LMDB environment (`<name>.lmdb`):
//!
//! - `__meta`: the schema the store was created with and per-collection sequence counters
//! - `<collection>`: primary key bytes -> record JSON
//! - `<collection>.<index>`: a `DUP_SORT` database mapping the JSON-encoded
//!   indexed value to the primary key bytes of every record carrying it
//!
//! Encoded values longer than LMDB's key limit are indexed under a SHA-256
//! digest instead; lookups recheck the field against each record they load.
//!
//! Every operation runs in its own transaction scoped to one collection and its
//! indices. LMDB allows a single writer, so the index postings of a record are
//! always updated atomically with the record itself.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::StoreConfig;
use crate::error::{Operation, StoreError};
use crate::record::{Key, Record};
use crate::schema::{CollectionDef, IndexDef, KeyPolicy, Schema, RESERVED_PREFIX};

const META_DB: &str = "__meta";
const SCHEMA_KEY: &str = "schema";
/// LMDB's default maximum key size.
const MAX_KEY_BYTES: usize = 511;
/// Never the first byte of a JSON encoding.
const DIGEST_PREFIX: &str = "#sha256:";

/// Storage contract shared by the persistent and the volatile store.
///
/// Implementations are synchronous; [`crate::repository::Repository`] moves
/// calls off the async executor.
pub trait RecordStore: Send + Sync {
    fn schema(&self) -> &Schema;

    /// Whether records survive a process restart.
    fn is_persistent(&self) -> bool;

    /// Upserts `record`, stamping it with `now`, and returns its key.
    fn put(&self, collection: &str, record: Record, now: &str) -> Result<Key, StoreError>;

    fn get(&self, collection: &str, key: &Key) -> Result<Option<Record>, StoreError>;

    fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError>;

    fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError>;

    /// Returns whether a record was removed.
    fn delete(&self, collection: &str, key: &Key) -> Result<bool, StoreError>;

    /// Removes every record of `collection` and returns how many there were.
    fn clear(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Maps a failure of one operation into [`StoreError::Persistence`].
pub(crate) fn fail<E: Display>(
    collection: &str,
    operation: Operation,
) -> impl Fn(E) -> StoreError + '_ {
    move |err| StoreError::persistence(collection, operation, err)
}

/// Resolves the key of `record`, assigning the next sequence value for
/// auto-increment collections.
pub(crate) fn assign_key(
    def: &CollectionDef,
    record: &mut Record,
    next_seq: impl FnOnce() -> Result<u64, StoreError>,
) -> Result<Key, StoreError> {
    if let Some(key) = def.key_of(record).map_err(fail(&def.name, Operation::Put))? {
        return Ok(key);
    }
    match &def.key {
        KeyPolicy::AutoIncrement { field } => {
            let seq = next_seq()?;
            record.insert(field.clone(), seq);
            Ok(Key::Seq(seq))
        }
        KeyPolicy::Provided { field } => Err(StoreError::persistence(
            &def.name,
            Operation::Put,
            format!("record has no primary key '{field}'"),
        )),
    }
}

struct CollectionHandles {
    def: CollectionDef,
    data: Database,
    indices: Vec<(IndexDef, Database)>,
}

impl CollectionHandles {
    fn index(&self, name: &str) -> Option<&(IndexDef, Database)> {
        self.indices.iter().find(|(def, _)| def.name == name)
    }
}

pub struct LmdbStore {
    env: Environment,
    path: PathBuf,
    schema: Schema,
    meta: Database,
    collections: HashMap<String, CollectionHandles>,
}

impl LmdbStore {
    /// Opens (or creates) the store described by `config` with `schema`.
    ///
    /// - first run: every collection and index is created
    /// - same version: existing databases are opened untouched
    /// - higher version: only the additions are created; new indices on
    ///   existing collections are backfilled
    ///
    /// Any failure to reach a usable environment is [`StoreError::StoreUnavailable`].
    pub fn open(config: &StoreConfig, schema: Schema) -> Result<Self, StoreError> {
        let path = config.lmdb_dir();
        let display = path.display().to_string();
        let unavailable = |reason: &dyn Display| StoreError::unavailable(display.clone(), reason);

        schema.validate().map_err(|e| unavailable(&e))?;
        let needed = schema.database_count() + 1;
        if needed > config.max_collections as usize {
            return Err(unavailable(&format!(
                "schema needs {needed} databases, max_collections is {}",
                config.max_collections
            )));
        }

        info!("Opening local store at: {}", display);
        fs::create_dir_all(&path).map_err(|e| unavailable(&e))?;

        let env = Environment::new()
            .set_max_dbs(config.max_collections)
            .set_map_size(config.map_size_bytes())
            .open(&path)
            .map_err(|e| unavailable(&e))?;

        let meta = env
            .create_db(Some(META_DB), DatabaseFlags::empty())
            .map_err(|e| unavailable(&e))?;

        let stored = read_stored_schema(&env, meta).map_err(|e| unavailable(&e))?;

        let upgrade_from = match &stored {
            None => {
                info!("Creating schema v{} ({} collections)", schema.version, schema.collections.len());
                None
            }
            Some(previous) if previous.version == schema.version => {
                debug!("Schema v{} unchanged", schema.version);
                let collections = open_collections(&env, &schema).map_err(|e| {
                    unavailable(&format!("schema changed without a version bump: {e}"))
                })?;
                return Ok(Self {
                    env,
                    path,
                    schema,
                    meta,
                    collections,
                });
            }
            Some(previous) if previous.version > schema.version => {
                return Err(unavailable(&format!(
                    "on-disk schema v{} is newer than supported v{}",
                    previous.version, schema.version
                )));
            }
            Some(previous) => {
                schema.extends(previous).map_err(|e| unavailable(&e))?;
                info!("Upgrading schema v{} -> v{}", previous.version, schema.version);
                Some(previous)
            }
        };

        let collections = create_collections(&env, &schema).map_err(|e| unavailable(&e))?;

        let mut txn = env.begin_rw_txn().map_err(|e| unavailable(&e))?;
        if let Some(previous) = upgrade_from {
            for (collection, index) in schema.indices_added_since(previous) {
                let Some(handles) = collections.get(&collection.name) else {
                    continue;
                };
                let Some((_, index_db)) = handles.index(&index.name) else {
                    continue;
                };
                let indexed = backfill_index(&mut txn, handles, index, *index_db)?;
                info!(
                    "Backfilled index {}.{} with {} record(s)",
                    collection.name, index.name, indexed
                );
            }
        }
        let schema_json = serde_json::to_vec(&schema).map_err(|e| unavailable(&e))?;
        txn.put(meta, &SCHEMA_KEY, &schema_json, WriteFlags::empty())
            .map_err(|e| unavailable(&e))?;
        txn.commit().map_err(|e| unavailable(&e))?;

        Ok(Self {
            env,
            path,
            schema,
            meta,
            collections,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handles(&self, collection: &str, operation: Operation) -> Result<&CollectionHandles, StoreError> {
        self.collections
            .get(collection)
            .ok_or_else(|| StoreError::persistence(collection, operation, "unknown collection"))
    }

    fn next_seq(&self, txn: &RwTransaction, collection: &str) -> Result<u64, StoreError> {
        Ok(read_counter(txn, self.meta, collection)? + 1)
    }
}

impl RecordStore for LmdbStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn put(&self, collection: &str, mut record: Record, now: &str) -> Result<Key, StoreError> {
        let op = Operation::Put;
        let handles = self.handles(collection, op)?;
        let mut txn = self.env.begin_rw_txn().map_err(fail(collection, op))?;

        let key = assign_key(&handles.def, &mut record, || self.next_seq(&txn, collection))?;
        let key_bytes = key.to_bytes();

        let existing = read_record(&txn, handles.data, &key_bytes, collection, op)?;
        record.stamp(existing.as_ref(), now);

        for (index, index_db) in &handles.indices {
            let old = existing.as_ref().and_then(|r| index.value_of(r));
            let new = index.value_of(&record);
            if old == new {
                continue;
            }
            if let Some(old) = old {
                remove_posting(&mut txn, *index_db, &old, &key_bytes, collection, op)?;
            }
            if let Some(new) = new {
                add_posting(&mut txn, *index_db, &new, &key_bytes, collection, op)?;
            }
        }

        let json = serde_json::to_vec(&record).map_err(fail(collection, op))?;
        txn.put(handles.data, &key_bytes, &json, WriteFlags::empty())
            .map_err(fail(collection, op))?;

        if let Key::Seq(seq) = key {
            let counter = read_counter(&txn, self.meta, collection)?;
            if seq > counter {
                write_counter(&mut txn, self.meta, collection, seq)?;
            }
        }

        txn.commit().map_err(fail(collection, op))?;
        debug!("Stored {} in {}", key, collection);
        Ok(key)
    }

    fn get(&self, collection: &str, key: &Key) -> Result<Option<Record>, StoreError> {
        let op = Operation::Get;
        let handles = self.handles(collection, op)?;
        let txn = self.env.begin_ro_txn().map_err(fail(collection, op))?;
        read_record(&txn, handles.data, &key.to_bytes(), collection, op)
    }

    fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let op = Operation::GetAll;
        let handles = self.handles(collection, op)?;
        let txn = self.env.begin_ro_txn().map_err(fail(collection, op))?;
        let records = {
            let mut cursor = txn.open_ro_cursor(handles.data).map_err(fail(collection, op))?;
            cursor
                .iter()
                .map(|(_, value)| serde_json::from_slice::<Record>(value))
                .collect::<Result<Vec<_>, _>>()
        };
        records.map_err(fail(collection, op))
    }

    fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>, StoreError> {
        let op = Operation::QueryByIndex;
        let handles = self.handles(collection, op)?;
        let (index_def, index_db) = handles.index(index).ok_or_else(|| {
            StoreError::persistence(collection, op, format!("unknown index '{index}'"))
        })?;

        let txn = self.env.begin_ro_txn().map_err(fail(collection, op))?;
        let keys = read_posting(&txn, *index_db, value, collection, op)?;

        let mut records = Vec::with_capacity(keys.len());
        for key_bytes in keys {
            match read_record(&txn, handles.data, &key_bytes, collection, op)? {
                // digest keys can collide
                Some(record) if index_def.value_of(&record).as_ref() == Some(value) => {
                    records.push(record)
                }
                Some(_) => {}
                None => warn!("Index {}.{} points at a missing record", collection, index),
            }
        }
        Ok(records)
    }

    fn delete(&self, collection: &str, key: &Key) -> Result<bool, StoreError> {
        let op = Operation::Delete;
        let handles = self.handles(collection, op)?;
        let key_bytes = key.to_bytes();
        let mut txn = self.env.begin_rw_txn().map_err(fail(collection, op))?;

        let Some(existing) = read_record(&txn, handles.data, &key_bytes, collection, op)? else {
            txn.abort();
            return Ok(false);
        };

        for (index, index_db) in &handles.indices {
            if let Some(value) = index.value_of(&existing) {
                remove_posting(&mut txn, *index_db, &value, &key_bytes, collection, op)?;
            }
        }
        txn.del(handles.data, &key_bytes, None)
            .map_err(fail(collection, op))?;
        txn.commit().map_err(fail(collection, op))?;
        debug!("Deleted {} from {}", key, collection);
        Ok(true)
    }

    fn clear(&self, collection: &str) -> Result<usize, StoreError> {
        let op = Operation::Clear;
        let handles = self.handles(collection, op)?;
        let mut txn = self.env.begin_rw_txn().map_err(fail(collection, op))?;

        let count = {
            let mut cursor = txn.open_ro_cursor(handles.data).map_err(fail(collection, op))?;
            cursor.iter().count()
        };

        txn.clear_db(handles.data).map_err(fail(collection, op))?;
        for (_, index_db) in &handles.indices {
            txn.clear_db(*index_db).map_err(fail(collection, op))?;
        }
        txn.commit().map_err(fail(collection, op))?;
        info!("Cleared {} record(s) from {}", count, collection);
        Ok(count)
    }
}

fn index_db_name(collection: &str, index: &str) -> String {
    format!("{collection}.{index}")
}

fn counter_key(collection: &str) -> String {
    format!("{RESERVED_PREFIX}seq:{collection}")
}

fn read_stored_schema(env: &Environment, meta: Database) -> Result<Option<Schema>, String> {
    let txn = env.begin_ro_txn().map_err(|e| e.to_string())?;
    let stored = match txn.get(meta, &SCHEMA_KEY) {
        Ok(bytes) => Some(serde_json::from_slice::<Schema>(bytes).map_err(|e| e.to_string())?),
        Err(lmdb::Error::NotFound) => None,
        Err(e) => return Err(e.to_string()),
    };
    txn.abort();
    Ok(stored)
}

fn open_collections(
    env: &Environment,
    schema: &Schema,
) -> Result<HashMap<String, CollectionHandles>, lmdb::Error> {
    collect_handles(schema, |name, _| env.open_db(Some(name)))
}

fn create_collections(
    env: &Environment,
    schema: &Schema,
) -> Result<HashMap<String, CollectionHandles>, lmdb::Error> {
    collect_handles(schema, |name, flags| env.create_db(Some(name), flags))
}

fn collect_handles(
    schema: &Schema,
    mut open: impl FnMut(&str, DatabaseFlags) -> Result<Database, lmdb::Error>,
) -> Result<HashMap<String, CollectionHandles>, lmdb::Error> {
    let mut collections = HashMap::with_capacity(schema.collections.len());
    for def in &schema.collections {
        let data = open(&def.name, DatabaseFlags::empty())?;
        let mut indices = Vec::with_capacity(def.indices.len());
        for index in &def.indices {
            let db = open(&index_db_name(&def.name, &index.name), DatabaseFlags::DUP_SORT)?;
            indices.push((index.clone(), db));
        }
        collections.insert(
            def.name.clone(),
            CollectionHandles {
                def: def.clone(),
                data,
                indices,
            },
        );
    }
    Ok(collections)
}

fn read_record<T: Transaction>(
    txn: &T,
    data: Database,
    key_bytes: &[u8],
    collection: &str,
    op: Operation,
) -> Result<Option<Record>, StoreError> {
    match txn.get(data, &key_bytes) {
        Ok(bytes) => serde_json::from_slice(bytes)
            .map(Some)
            .map_err(fail(collection, op)),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(StoreError::persistence(collection, op, e)),
    }
}

fn read_counter<T: Transaction>(txn: &T, meta: Database, collection: &str) -> Result<u64, StoreError> {
    match txn.get(meta, &counter_key(collection)) {
        Ok(bytes) => {
            let raw: [u8; 8] = bytes
                .try_into()
                .map_err(|_| StoreError::persistence(collection, Operation::Put, "corrupted sequence counter"))?;
            Ok(u64::from_be_bytes(raw))
        }
        Err(lmdb::Error::NotFound) => Ok(0),
        Err(e) => Err(StoreError::persistence(collection, Operation::Put, e)),
    }
}

fn write_counter(
    txn: &mut RwTransaction,
    meta: Database,
    collection: &str,
    value: u64,
) -> Result<(), StoreError> {
    txn.put(meta, &counter_key(collection), &value.to_be_bytes(), WriteFlags::empty())
        .map_err(fail(collection, Operation::Put))
}

fn index_key(value: &Value, collection: &str, op: Operation) -> Result<Vec<u8>, StoreError> {
    let encoded = serde_json::to_vec(value).map_err(fail(collection, op))?;
    if encoded.len() <= MAX_KEY_BYTES {
        return Ok(encoded);
    }
    Ok(format!("{DIGEST_PREFIX}{:x}", Sha256::digest(&encoded)).into_bytes())
}

/// Primary key bytes filed under `value`.
fn read_posting<T: Transaction>(
    txn: &T,
    index_db: Database,
    value: &Value,
    collection: &str,
    op: Operation,
) -> Result<Vec<Vec<u8>>, StoreError> {
    let encoded = index_key(value, collection, op)?;
    // iter_dup_of requires the key to exist
    match txn.get(index_db, &encoded) {
        Ok(_) => {}
        Err(lmdb::Error::NotFound) => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::persistence(collection, op, e)),
    }
    let mut cursor = txn.open_ro_cursor(index_db).map_err(fail(collection, op))?;
    let keys = cursor
        .iter_dup_of(&encoded)
        .map_err(fail(collection, op))?
        .map(|(_, key_bytes)| key_bytes.to_vec())
        .collect();
    Ok(keys)
}

fn add_posting(
    txn: &mut RwTransaction,
    index_db: Database,
    value: &Value,
    key_bytes: &[u8],
    collection: &str,
    op: Operation,
) -> Result<(), StoreError> {
    let encoded = index_key(value, collection, op)?;
    match txn.put(index_db, &encoded, &key_bytes, WriteFlags::NO_DUP_DATA) {
        Ok(()) | Err(lmdb::Error::KeyExist) => Ok(()),
        Err(e) => Err(StoreError::persistence(collection, op, e)),
    }
}

fn remove_posting(
    txn: &mut RwTransaction,
    index_db: Database,
    value: &Value,
    key_bytes: &[u8],
    collection: &str,
    op: Operation,
) -> Result<(), StoreError> {
    let encoded = index_key(value, collection, op)?;
    match txn.del(index_db, &encoded, Some(key_bytes)) {
        Ok(()) | Err(lmdb::Error::NotFound) => Ok(()),
        Err(e) => Err(StoreError::persistence(collection, op, e)),
    }
}

fn backfill_index(
    txn: &mut RwTransaction,
    handles: &CollectionHandles,
    index: &IndexDef,
    index_db: Database,
) -> Result<usize, StoreError> {
    let collection = handles.def.name.as_str();
    let op = Operation::Open;
    let records = {
        let mut cursor = txn.open_ro_cursor(handles.data).map_err(fail(collection, op))?;
        cursor
            .iter()
            .map(|(key_bytes, value)| {
                serde_json::from_slice::<Record>(value).map(|record| (key_bytes.to_vec(), record))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail(collection, op))?
    };

    let mut indexed = 0;
    for (key_bytes, record) in records {
        if let Some(value) = index.value_of(&record) {
            add_posting(txn, index_db, &value, &key_bytes, collection, op)?;
            indexed += 1;
        }
    }
    Ok(indexed)
}
