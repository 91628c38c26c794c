//! # Offline Sync Core
//!
//! Local-first persistence and synchronization for field-worker applications
//! that lose connectivity at any time. Built on LMDB (Lightning Memory-Mapped
//! Database) and exposed both as a Rust library and through a C-compatible
//! FFI surface for Flutter and other cross-platform hosts.
//!
//! ## Features
//!
//! - **Schema-aware collections**: named collections with a primary key and secondary indices
//! - **Generic repository**: one `put`/`get`/`get_all`/`query_by_index`/`delete` API for every collection
//! - **Durable sync queue**: pending remote mutations survive restarts and replay in FIFO order
//! - **Connectivity-driven sync**: queued actions drain when the network comes back
//! - **Blob attachments**: photos keyed by their diary entry or form
//! - **Safe error handling**: No `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_sync_core::{create_store, put_record, set_connectivity};
//! use std::ffi::CString;
//!
//! let config = CString::new(r#"{"name":"field_app"}"#).unwrap();
//! let state = create_store(config.as_ptr(), None);
//!
//! let collection = CString::new("projects").unwrap();
//! let project = CString::new(r#"{"id":"project_1","name":"Roof","status":"active"}"#).unwrap();
//! let result = put_record(state, collection.as_ptr(), project.as_ptr());
//!
//! set_connectivity(state, true);
//! ```
//!
//! ## FFI Functions
//!
//! Every function returning `*const c_char` returns a JSON-serialized
//! [`app_response::AppResponse`]; release it with [`free_response`].
//!
//! - [`create_store`] - Open the store and start the synchronizer
//! - [`put_record`] / [`get_record`] / [`query_by_index`] / [`delete_record`] / [`clear_collection`]
//! - [`enqueue_action`] / [`pending_sync_count`] / [`sync_now`]
//! - [`set_connectivity`] / [`is_reachable`]
//! - [`put_blob`] / [`get_blobs`]
//! - [`close_store`] - Stop the synchronizer and release the handle

pub mod app_response;
pub mod blob_repository;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod ids;
pub mod local_store;
pub mod offline_state;
pub mod record;
pub mod repository;
pub mod retry_policy;
pub mod schema;
pub mod sync_queue;
pub mod synchronizer;
pub mod volatile_store;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use log::{info, warn};
use serde_json::Value;

use crate::app_response::AppResponse;
use crate::blob_repository::{BlobKind, BlobPayload};
use crate::config::StoreConfig;
use crate::offline_state::{callback_submitter, OfflineState, SubmitCallback};
use crate::record::{Key, Record};
use crate::schema::SYNC_QUEUE;
use crate::synchronizer::{LoggingSubmitter, RemoteSubmitter};

pub use crate::error::{StoreError, SyncError, SyncSubmissionError};

/// Opens the store described by a JSON [`StoreConfig`] and starts syncing.
///
/// The LMDB environment lives in the `<name>.lmdb` directory. The synchronizer
/// starts with connectivity unreachable; report the real state with
/// [`set_connectivity`].
///
/// # Parameters
///
/// * `config_json` - Null-terminated JSON [`StoreConfig`]; only `name` is required
/// * `submitter` - Optional [`SubmitCallback`] receiving each queued item as JSON and
///   returning `true` once the remote system accepted it. When null, items are
///   logged and accepted.
///
/// # Returns
///
/// A pointer to the [`OfflineState`] handle, or a null pointer on failure.
/// Release it with [`close_store`].
///
/// # Safety
///
/// `config_json` must be null or point to a valid null-terminated string.
/// The callback runs on a blocking thread and may call the record, blob and
/// [`enqueue_action`] functions re-entrantly. It must not call [`sync_now`] or
/// [`close_store`], which wait for the drain that invoked it.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use offline_sync_core::create_store;
///
/// let config = CString::new(r#"{"name":"field_app","map_size_mb":128}"#).unwrap();
/// let state = create_store(config.as_ptr(), None);
///
/// if !state.is_null() {
///     // Store ready
/// }
/// ```
///
/// # Errors
///
/// Returns null pointer if:
/// - The config pointer is null or not valid UTF-8
/// - The config is not valid JSON
/// - The store cannot be opened and `volatile_fallback` is disabled
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(
    config_json: *const c_char,
    submitter: Option<SubmitCallback>,
) -> *mut OfflineState {
    let json = match ptr_to_str(config_json) {
        Some(s) => s,
        None => {
            warn!("Null or invalid config pointer passed to create_store");
            return std::ptr::null_mut();
        }
    };

    let config = match StoreConfig::from_json(json) {
        Ok(config) => config,
        Err(e) => {
            warn!("Invalid store config: {e}");
            return std::ptr::null_mut();
        }
    };

    let submitter: Arc<dyn RemoteSubmitter> = match submitter {
        Some(callback) => callback_submitter(callback),
        None => Arc::new(LoggingSubmitter),
    };

    match OfflineState::init(config, submitter) {
        Ok(state) => {
            info!("✅ Store initialized successfully");
            Box::into_raw(Box::new(state))
        }
        Err(e) => {
            warn!("❌ Failed to initialize store: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Upserts a JSON record into `collection`.
///
/// A record with the same primary key is fully replaced. `createdAt` is set on
/// first write and kept across replacements; `updatedAt` is set on every write.
///
/// # Parameters
///
/// * `state` - Pointer returned by [`create_store`]
/// * `collection` - Collection name, e.g. `"projects"`
/// * `json_ptr` - Null-terminated JSON object carrying the primary key field
///
/// # Returns
///
/// An `Ok` response holding the record's key as JSON. The returned string must
/// be freed with [`free_response`].
///
/// # Safety
///
/// All pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use offline_sync_core::{create_store, put_record};
///
/// let config = CString::new(r#"{"name":"field_app"}"#).unwrap();
/// let state = create_store(config.as_ptr(), None);
///
/// let collection = CString::new("projects").unwrap();
/// let project = CString::new(r#"{"id":"project_1","status":"active"}"#).unwrap();
/// let result = put_record(state, collection.as_ptr(), project.as_ptr());
/// ```
///
/// # Errors
///
/// - `BadRequest`: null pointers, invalid UTF-8, or the `syncQueue` collection
///   (use [`enqueue_action`])
/// - `SerializationError`: the input is not a JSON object
/// - `DatabaseError`: unknown collection, missing key, or a failed transaction
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn put_record(
    state: *mut OfflineState,
    collection: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let state = match state_ref(state, "put_record") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let json = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(s) => s,
        Err(err) => return err,
    };
    if collection == SYNC_QUEUE {
        let error = AppResponse::BadRequest(format!("{SYNC_QUEUE} is written through enqueue_action"));
        return response_to_c_string(&error);
    }

    let record = match serde_json::from_str::<Value>(&json)
        .map_err(|e| e.to_string())
        .and_then(Record::try_from)
    {
        Ok(record) => record,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid record: {e}"));
            return response_to_c_string(&error);
        }
    };

    match state.block_on(state.repository().put(&collection, record)) {
        Ok(key) => json_response(&key),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Fetches one record by key, or every record of `collection` when `key` is null.
///
/// # Parameters
///
/// * `state` - Pointer returned by [`create_store`]
/// * `collection` - Collection name
/// * `key` - Primary key, or null for the whole collection. Keys of
///   auto-increment collections are passed as decimal text.
///
/// # Returns
///
/// An `Ok` response holding the record (or an array of records) as JSON.
///
/// # Safety
///
/// All pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use offline_sync_core::{create_store, get_record};
///
/// let config = CString::new(r#"{"name":"field_app"}"#).unwrap();
/// let state = create_store(config.as_ptr(), None);
///
/// let collection = CString::new("projects").unwrap();
/// let key = CString::new("project_1").unwrap();
/// let one = get_record(state, collection.as_ptr(), key.as_ptr());
/// let all = get_record(state, collection.as_ptr(), std::ptr::null());
/// ```
///
/// # Errors
///
/// - `NotFound`: no record under `key`
/// - `BadRequest`: null `state`/`collection` or invalid UTF-8
/// - `DatabaseError`: unknown collection or a failed transaction
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_record(
    state: *mut OfflineState,
    collection: *const c_char,
    key: *const c_char,
) -> *const c_char {
    let state = match state_ref(state, "get_record") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(s) => s,
        Err(err) => return err,
    };

    if key.is_null() {
        return match state.block_on(state.repository().get_all(&collection)) {
            Ok(records) => json_response(&records),
            Err(e) => response_to_c_string(&AppResponse::from(e)),
        };
    }

    let raw_key = match c_ptr_to_string(key, "key") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let key = parse_key(state, &collection, &raw_key);

    match state.block_on(state.repository().get(&collection, key)) {
        Ok(Some(record)) => json_response(&record),
        Ok(None) => {
            let not_found = AppResponse::NotFound(format!("No record in {collection} with key: {raw_key}"));
            response_to_c_string(&not_found)
        }
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Returns the records of `collection` whose `index` equals `value_json`.
///
/// Equality is on the JSON value, so `"1"` and `1` do not match each other.
/// Records without the indexed field are never returned.
///
/// # Parameters
///
/// * `state` - Pointer returned by [`create_store`]
/// * `collection` - Collection name
/// * `index` - Index name, e.g. `"projectId"`
/// * `value_json` - The value to match, JSON-encoded (`"\"P1\""` for a string)
///
/// # Returns
///
/// An `Ok` response holding a JSON array of records, in no particular order.
///
/// # Safety
///
/// All pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Errors
///
/// - `SerializationError`: `value_json` is not valid JSON
/// - `DatabaseError`: unknown collection or index
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn query_by_index(
    state: *mut OfflineState,
    collection: *const c_char,
    index: *const c_char,
    value_json: *const c_char,
) -> *const c_char {
    let state = match state_ref(state, "query_by_index") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let index = match c_ptr_to_string(index, "index") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let value_json = match c_ptr_to_string(value_json, "value") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let value: Value = match serde_json::from_str(&value_json) {
        Ok(value) => value,
        Err(e) => return response_to_c_string(&AppResponse::from(e)),
    };

    match state.block_on(state.repository().query_by_index(&collection, &index, value)) {
        Ok(records) => json_response(&records),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Deletes a record. Deleting a missing key succeeds.
///
/// No other collection is touched: records referring to the deleted one stay.
///
/// # Parameters
///
/// * `state` - Pointer returned by [`create_store`]
/// * `collection` - Collection name
/// * `key` - Primary key of the record
///
/// # Returns
///
/// An `Ok` response, whether or not a record was removed.
///
/// # Safety
///
/// All pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Errors
///
/// - `BadRequest`: null pointers or invalid UTF-8
/// - `DatabaseError`: unknown collection or a failed transaction
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_record(
    state: *mut OfflineState,
    collection: *const c_char,
    key: *const c_char,
) -> *const c_char {
    let state = match state_ref(state, "delete_record") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let raw_key = match c_ptr_to_string(key, "key") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let key = parse_key(state, &collection, &raw_key);

    match state.block_on(state.repository().delete(&collection, key)) {
        Ok(()) => response_to_c_string(&AppResponse::success("Record deleted successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Removes every record of `collection` together with its index entries.
///
/// # Returns
///
/// An `Ok` response naming how many records were removed.
///
/// # Safety
///
/// Both pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Errors
///
/// `DatabaseError` for an unknown collection or a failed transaction.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_collection(state: *mut OfflineState, collection: *const c_char) -> *const c_char {
    let state = match state_ref(state, "clear_collection") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(s) => s,
        Err(err) => return err,
    };

    match state.block_on(state.repository().clear(&collection)) {
        Ok(count) => response_to_c_string(&AppResponse::success(format!("{count} record(s) cleared"))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Queues a JSON action for the remote system.
///
/// The action is written to the durable queue first; this succeeds offline.
/// While reachable, the synchronizer is woken to drain right away, but the
/// call never waits for the remote system.
///
/// # Parameters
///
/// * `state` - Pointer returned by [`create_store`]
/// * `action_json` - Any JSON value describing the remote operation
///
/// # Returns
///
/// An `Ok` response holding the item's sequence id.
///
/// # Safety
///
/// Both pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use offline_sync_core::{create_store, enqueue_action};
///
/// let config = CString::new(r#"{"name":"field_app"}"#).unwrap();
/// let state = create_store(config.as_ptr(), None);
///
/// let action = CString::new(r#"{"op":"createProject","id":"project_1"}"#).unwrap();
/// let result = enqueue_action(state, action.as_ptr());
/// ```
///
/// # Errors
///
/// - `SerializationError`: `action_json` is not valid JSON
/// - `DatabaseError`: the queue write failed
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn enqueue_action(state: *mut OfflineState, action_json: *const c_char) -> *const c_char {
    let state = match state_ref(state, "enqueue_action") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let json = match c_ptr_to_string(action_json, "action") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let action: Value = match serde_json::from_str(&json) {
        Ok(action) => action,
        Err(e) => return response_to_c_string(&AppResponse::from(e)),
    };

    match state.block_on(state.synchronizer().enqueue(action)) {
        Ok(id) => json_response(&id),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Number of items still waiting in the sync queue.
///
/// # Returns
///
/// An `Ok` response holding the count as JSON.
///
/// # Safety
///
/// `state` must be null or come from [`create_store`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn pending_sync_count(state: *mut OfflineState) -> *const c_char {
    let state = match state_ref(state, "pending_sync_count") {
        Ok(state) => state,
        Err(err) => return err,
    };

    match state.block_on(state.synchronizer().queue().len()) {
        Ok(count) => json_response(&count),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// User-initiated sync.
///
/// Drains the queue in order, stopping at the first rejected item. If a
/// background drain is already running, waits for it and then drains again.
///
/// # Returns
///
/// An `Ok` response holding the number of items this call delivered.
///
/// # Safety
///
/// `state` must be null or come from [`create_store`]. Must not be called
/// from inside the submit callback.
///
/// # Errors
///
/// - `SyncError`: unreachable, or items are still queued afterwards
/// - `DatabaseError`: the queue could not be read or updated
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn sync_now(state: *mut OfflineState) -> *const c_char {
    let state = match state_ref(state, "sync_now") {
        Ok(state) => state,
        Err(err) => return err,
    };

    match state.block_on(state.synchronizer().sync_now()) {
        Ok(delivered) => json_response(&delivered),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Reports a platform network signal.
///
/// Only actual changes are propagated; becoming reachable starts a drain.
/// Repeated reports of the same state are ignored.
///
/// # Safety
///
/// `state` must be null or come from [`create_store`]. A null pointer is
/// logged and ignored.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn set_connectivity(state: *mut OfflineState, reachable: bool) {
    match unsafe { state.as_ref() } {
        Some(state) => {
            state.connectivity().report(reachable);
        }
        None => warn!("Null state pointer passed to set_connectivity"),
    }
}

/// Current connectivity state; `false` for a null handle.
///
/// # Safety
///
/// `state` must be null or come from [`create_store`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn is_reachable(state: *mut OfflineState) -> bool {
    match unsafe { state.as_ref() } {
        Some(state) => state.connectivity().is_reachable(),
        None => false,
    }
}

/// Stores a photo payload attached to a diary entry or a form.
///
/// # Parameters
///
/// * `state` - Pointer returned by [`create_store`]
/// * `payload_base64` - Base64-encoded payload
/// * `associated_id` - Id of the diary entry or form
/// * `kind` - `"diary"` or `"form"`
///
/// # Returns
///
/// An `Ok` response holding the generated `photo_...` id.
///
/// # Safety
///
/// All pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Errors
///
/// - `BadRequest`: null pointers or an unknown `kind`
/// - `DatabaseError`: the payload is not valid base64 or the write failed
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn put_blob(
    state: *mut OfflineState,
    payload_base64: *const c_char,
    associated_id: *const c_char,
    kind: *const c_char,
) -> *const c_char {
    let state = match state_ref(state, "put_blob") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let payload = match c_ptr_to_string(payload_base64, "payload") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let associated_id = match c_ptr_to_string(associated_id, "associated_id") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let kind = match c_ptr_to_kind(kind) {
        Ok(kind) => kind,
        Err(err) => return err,
    };

    let put = state
        .blobs()
        .put_blob(BlobPayload::Base64(payload), &associated_id, kind);
    match state.block_on(put) {
        Ok(key) => json_response(&key),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Photos of `kind` attached to `associated_id`.
///
/// # Returns
///
/// An `Ok` response holding a JSON array of blobs (`id`, `data` as base64,
/// `kind`, `associatedId`, `createdAt`). Lookup failures are logged and
/// yield an empty array.
///
/// # Safety
///
/// All pointers must be null or valid; `state` must come from [`create_store`].
///
/// # Errors
///
/// `BadRequest` for null pointers or an unknown `kind`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_blobs(
    state: *mut OfflineState,
    associated_id: *const c_char,
    kind: *const c_char,
) -> *const c_char {
    let state = match state_ref(state, "get_blobs") {
        Ok(state) => state,
        Err(err) => return err,
    };
    let associated_id = match c_ptr_to_string(associated_id, "associated_id") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let kind = match c_ptr_to_kind(kind) {
        Ok(kind) => kind,
        Err(err) => return err,
    };

    let blobs = state.block_on(state.blobs().get_blobs(&associated_id, kind));
    json_response(&blobs)
}

/// Stops the synchronizer and frees the handle.
///
/// The LMDB environment is closed when the handle drops. Queued items stay on
/// disk and are replayed by the next [`create_store`].
///
/// # Safety
///
/// `state` must come from [`create_store`] and must not be used afterwards.
/// Must not be called from inside the submit callback.
///
/// # Errors
///
/// `BadRequest` for a null pointer.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut OfflineState) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let mut state = unsafe { Box::from_raw(state) };
    state.close();
    drop(state);
    response_to_c_string(&AppResponse::success("Store closed successfully"))
}

/// Releases a response string returned by this library.
///
/// # Safety
///
/// `ptr` must be null or a string returned by this library, freed only once.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr as *mut c_char) });
    }
}

fn parse_key(state: &OfflineState, collection: &str, raw: &str) -> Key {
    match state.repository().schema().collection(collection) {
        Some(def) => def.parse_key(raw),
        None => Key::Text(raw.to_string()),
    }
}

fn state_ref<'a>(state: *mut OfflineState, function: &str) -> Result<&'a OfflineState, *const c_char> {
    match unsafe { state.as_ref() } {
        Some(state) => Ok(state),
        None => {
            let error = AppResponse::BadRequest(format!("Null state pointer passed to {function}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn c_ptr_to_kind(ptr: *const c_char) -> Result<BlobKind, *const c_char> {
    let raw = c_ptr_to_string(ptr, "kind")?;
    BlobKind::parse(&raw).ok_or_else(|| {
        let error = AppResponse::BadRequest(format!("Unknown blob kind '{raw}', expected 'diary' or 'form'"));
        response_to_c_string(&error)
    })
}

fn ptr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr).to_str().ok() }
}

/// Serializes `value` into an `Ok` response.
fn json_response<T: serde::Serialize>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Converts an [`AppResponse`] to a C-compatible string owned by the caller.
///
/// Returns a null pointer if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String, reporting null pointers and
/// invalid UTF-8 as a `BadRequest` response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
