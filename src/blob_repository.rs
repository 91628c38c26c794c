//! Binary attachments (photos) stored in the `photos` collection.
//!
//! Payloads are kept as base64 text next to their metadata. The record
//! carries `associatedId`, `kind`, and the kind's index field
//! (`diaryEntryId` or `formId`) so retrieval is a single index lookup.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Operation, StoreError};
use crate::ids::generate_id;
use crate::record::{Key, Record, CREATED_AT};
use crate::repository::Repository;
use crate::schema::PHOTOS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    Diary,
    Form,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Diary => "diary",
            BlobKind::Form => "form",
        }
    }

    /// Index of the `photos` collection holding this kind's parent id.
    pub fn index_name(&self) -> &'static str {
        match self {
            BlobKind::Diary => "diaryEntryId",
            BlobKind::Form => "formId",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "diary" => Some(BlobKind::Diary),
            "form" => Some(BlobKind::Form),
            _ => None,
        }
    }
}

pub enum BlobPayload {
    Bytes(Vec<u8>),
    Base64(String),
}

impl BlobPayload {
    fn into_base64(self) -> Result<String, base64::DecodeError> {
        match self {
            BlobPayload::Bytes(bytes) => Ok(STANDARD.encode(bytes)),
            BlobPayload::Base64(encoded) => {
                STANDARD.decode(&encoded)?;
                Ok(encoded)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub id: String,
    /// Base64-encoded payload.
    pub data: String,
    pub kind: BlobKind,
    pub associated_id: String,
    pub created_at: String,
}

impl Blob {
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

#[derive(Clone)]
pub struct BlobRepository {
    repository: Repository,
}

impl BlobRepository {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn put_blob(
        &self,
        payload: BlobPayload,
        associated_id: &str,
        kind: BlobKind,
    ) -> Result<Key, StoreError> {
        let data = payload
            .into_base64()
            .map_err(|e| StoreError::persistence(PHOTOS, Operation::Put, format!("invalid base64 payload: {e}")))?;

        let record = Record::new()
            .with("id", generate_id("photo"))
            .with("data", data)
            .with("kind", kind.as_str())
            .with("associatedId", associated_id)
            .with(kind.index_name(), associated_id)
            .with(CREATED_AT, self.repository.now());

        self.repository.put(PHOTOS, record).await
    }

    /// Blobs of `kind` attached to `associated_id`. Failures are logged and
    /// yield an empty list.
    pub async fn get_blobs(&self, associated_id: &str, kind: BlobKind) -> Vec<Blob> {
        let records = match self
            .repository
            .query_by_index(PHOTOS, kind.index_name(), associated_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load {} blobs for {}: {}", kind.as_str(), associated_id, e);
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Blob>(record.into_value()) {
                Ok(blob) => Some(blob),
                Err(e) => {
                    warn!("Skipping malformed blob record: {}", e);
                    None
                }
            })
            .filter(|blob| blob.associated_id == associated_id && blob.kind == kind)
            .collect()
    }
}
