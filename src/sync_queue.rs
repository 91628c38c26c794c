//! Durable FIFO of actions waiting to reach the remote system.
//!
//! Items live in the `syncQueue` collection under auto-incremented ids, so
//! they survive restarts and replay in enqueue order.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Operation, StoreError};
use crate::record::{Key, Record};
use crate::repository::Repository;
use crate::schema::SYNC_QUEUE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Pending,
    InFlight,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: u64,
    /// Opaque description of the remote operation.
    pub action: Value,
    pub timestamp: String,
    pub status: SyncStatus,
}

impl SyncQueueItem {
    fn to_record(&self) -> Result<Record, StoreError> {
        serde_json::to_value(self)
            .map_err(|e| e.to_string())
            .and_then(Record::try_from)
            .map_err(|e| StoreError::persistence(SYNC_QUEUE, Operation::Put, e))
    }
}

#[derive(Clone)]
pub struct SyncQueue {
    repository: Repository,
}

impl SyncQueue {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Appends `action` as a pending item and returns its sequence id.
    /// Purely local: works the same online and offline.
    pub async fn enqueue(&self, action: Value) -> Result<u64, StoreError> {
        let record = Record::new()
            .with("action", action)
            .with("timestamp", self.repository.now())
            .with("status", "pending");

        let key = self.repository.put(SYNC_QUEUE, record).await?;
        let id = key.as_seq().ok_or_else(|| {
            StoreError::persistence(SYNC_QUEUE, Operation::Put, format!("expected a sequence key, got '{key}'"))
        })?;
        info!("Added sync item {} to queue", id);
        Ok(id)
    }

    /// All queued items in enqueue order.
    pub async fn items(&self) -> Result<Vec<SyncQueueItem>, StoreError> {
        let records = self.repository.get_all(SYNC_QUEUE).await?;
        let mut items: Vec<SyncQueueItem> = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record.into_value()) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping malformed sync item: {}", e);
                    None
                }
            })
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    /// Stored items, malformed ones included, so a record that can never be
    /// delivered still keeps the queue from reporting empty.
    pub async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.repository.get_all(SYNC_QUEUE).await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }

    pub async fn set_status(&self, item: &SyncQueueItem, status: SyncStatus) -> Result<(), StoreError> {
        let mut updated = item.clone();
        updated.status = status;
        self.repository.put(SYNC_QUEUE, updated.to_record()?).await?;
        Ok(())
    }

    pub async fn remove(&self, id: u64) -> Result<(), StoreError> {
        self.repository.delete(SYNC_QUEUE, Key::Seq(id)).await
    }

    /// Returns items left in-flight by an interrupted drain to pending.
    pub async fn reset_in_flight(&self) -> Result<usize, StoreError> {
        let mut reset = 0;
        for item in self.items().await? {
            if item.status == SyncStatus::InFlight {
                self.set_status(&item, SyncStatus::Pending).await?;
                reset += 1;
            }
        }
        if reset > 0 {
            info!("Reset {} interrupted sync item(s) to pending", reset);
        }
        Ok(reset)
    }
}
