use std::ffi::CString;
use std::future::Future;
use std::os::raw::c_char;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::blob_repository::BlobRepository;
use crate::config::StoreConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{StoreError, SyncSubmissionError};
use crate::local_store::{LmdbStore, RecordStore};
use crate::repository::Repository;
use crate::schema::Schema;
use crate::sync_queue::{SyncQueue, SyncQueueItem};
use crate::synchronizer::{RemoteSubmitter, Synchronizer};
use crate::volatile_store::VolatileStore;

/// Host callback receiving a queued item as JSON; returns `true` once the
/// remote system accepted it.
///
/// Runs on a blocking thread. It may call the record and blob functions and
/// `enqueue_action`, but not `sync_now` or `close_store`: both wait for the
/// drain that is waiting on the callback.
pub type SubmitCallback = extern "C" fn(item_json: *const c_char) -> bool;

struct CallbackSubmitter {
    callback: SubmitCallback,
}

#[async_trait]
impl RemoteSubmitter for CallbackSubmitter {
    async fn submit(&self, item: &SyncQueueItem) -> Result<(), SyncSubmissionError> {
        let json = serde_json::to_string(item)
            .map_err(|e| SyncSubmissionError::new(item.id, e.to_string()))?;
        let c_json = CString::new(json)
            .map_err(|e| SyncSubmissionError::new(item.id, e.to_string()))?;

        // Off the async workers, so the host may call back into the store.
        let callback = self.callback;
        let accepted = tokio::task::spawn_blocking(move || callback(c_json.as_ptr()))
            .await
            .map_err(|e| SyncSubmissionError::new(item.id, format!("host callback failed: {e}")))?;

        if accepted {
            Ok(())
        } else {
            Err(SyncSubmissionError::new(item.id, "rejected by host callback"))
        }
    }
}

pub(crate) fn callback_submitter(callback: SubmitCallback) -> Arc<dyn RemoteSubmitter> {
    Arc::new(CallbackSubmitter { callback })
}

/// Process-wide handle: one store, its repositories, the connectivity monitor
/// and the synchronizer's background loop, driven by an owned runtime.
pub struct OfflineState {
    runtime: Runtime,
    repository: Repository,
    blobs: BlobRepository,
    connectivity: Arc<ConnectivityMonitor>,
    synchronizer: Arc<Synchronizer>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl OfflineState {
    /// Opens the store and starts the synchronizer. Connectivity starts as
    /// unreachable until the host reports otherwise.
    pub fn init(config: StoreConfig, submitter: Arc<dyn RemoteSubmitter>) -> Result<Self, StoreError> {
        let store: Arc<dyn RecordStore> = match LmdbStore::open(&config, Schema::field_app()) {
            Ok(store) => Arc::new(store),
            Err(e) if e.is_unavailable() && config.volatile_fallback => {
                warn!("{}", e);
                warn!("Continuing without offline capability (volatile memory only)");
                Arc::new(VolatileStore::new(Schema::field_app()))
            }
            Err(e) => return Err(e),
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("offline-sync")
            .enable_all()
            .build()
            .map_err(|e| StoreError::unavailable(config.name.clone(), format!("runtime: {e}")))?;

        let repository = Repository::new(store);
        let blobs = BlobRepository::new(repository.clone());
        let connectivity = Arc::new(ConnectivityMonitor::new(false));
        let synchronizer = Arc::new(Synchronizer::new(
            SyncQueue::new(repository.clone()),
            submitter,
            Arc::clone(&connectivity),
            config.sync.clone(),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = runtime.spawn(Arc::clone(&synchronizer).run(shutdown_rx));

        info!("Offline state for '{}' ready (persistent: {})", config.name, repository.is_persistent());
        Ok(Self {
            runtime,
            repository,
            blobs,
            connectivity,
            synchronizer,
            shutdown,
            worker: Some(worker),
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn blobs(&self) -> &BlobRepository {
        &self.blobs
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Stops the background loop. The store closes when the handle drops.
    pub fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = self.runtime.block_on(worker) {
                warn!("Synchronizer task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for OfflineState {
    fn drop(&mut self) {
        self.close();
    }
}
