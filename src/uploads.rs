//! Multipart upload coordination.
//!
//! Owns the lifecycle of upload sessions: initiate, accept parts,
//! assemble on completion, discard on abort.  A session is ACTIVE from
//! `initiate` until `complete` or `abort` removes it; an upload ID that
//! is not in the active set is invalid for every other operation.
//!
//! The session map is the one piece of mutable shared state in the
//! protocol core.  It is owned by this coordinator (injected with its
//! blob store at construction, not a process-wide singleton) and guarded
//! by `tokio::sync::RwLock`, which gives `complete` a happens-before
//! view of every `upload_part` the client already saw succeed.

use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::etag;
use crate::store::blob::{BlobStore, StoreError};

/// Failure modes of coordinator operations.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload ID is unknown (never issued, completed, or aborted).
    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    /// The underlying blob store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single uploaded part tracked within a session.
#[derive(Debug, Clone)]
pub struct PartInfo {
    /// Client-assigned part number (positive; not necessarily dense).
    pub part_number: u32,
    /// Quoted single-part ETag of the part's content.
    pub etag: String,
    /// Opaque temp-blob handle holding the part's bytes.
    pub temp: String,
}

/// An ACTIVE upload session.
#[derive(Debug, Clone)]
struct UploadSession {
    bucket: String,
    key: String,
    /// Parts in arrival order; duplicates by part number allowed.
    parts: Vec<PartInfo>,
}

/// Result of a successful `complete`.
#[derive(Debug)]
pub struct CompletedUpload {
    /// Total size of the assembled object in bytes.
    pub size: u64,
    /// Composite multipart ETag.
    pub etag: String,
    /// Part ETags in assembly (ascending part-number) order.
    pub part_etags: Vec<String>,
}

/// Coordinates multipart upload sessions against a blob store.
pub struct UploadCoordinator {
    store: Arc<dyn BlobStore>,
    sessions: tokio::sync::RwLock<HashMap<String, UploadSession>>,
}

impl UploadCoordinator {
    /// Create a coordinator writing through to `store`.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            sessions: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Start a new upload session and return its fresh upload ID.
    pub async fn initiate(&self, bucket: &str, key: &str) -> String {
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.sessions.write().await.insert(
            upload_id.clone(),
            UploadSession {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: Vec::new(),
            },
        );
        upload_id
    }

    /// Whether `upload_id` refers to an ACTIVE session.
    pub async fn contains(&self, upload_id: &str) -> bool {
        self.sessions.read().await.contains_key(upload_id)
    }

    /// Store one part's payload and register it with the session.
    ///
    /// Safe under concurrent calls for the same upload: the temp write
    /// happens outside the lock, the registration inside it.  Returns
    /// the part's ETag.
    pub async fn upload_part(
        &self,
        upload_id: &str,
        part_number: u32,
        payload: Bytes,
    ) -> Result<String, UploadError> {
        if !self.contains(upload_id).await {
            return Err(UploadError::NoSuchUpload(upload_id.to_string()));
        }

        let temp = self.store.create_temp("part-").await?;
        self.store.write_temp(&temp, payload.clone()).await?;
        let part_etag = etag::object_etag(&payload);

        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(upload_id) {
            Some(session) => {
                session.parts.push(PartInfo {
                    part_number,
                    etag: part_etag.clone(),
                    temp,
                });
                Ok(part_etag)
            }
            None => {
                // The session was completed or aborted while we were
                // writing the temp blob; clean up and reject.
                drop(sessions);
                self.store.delete_temp(&temp).await.ok();
                Err(UploadError::NoSuchUpload(upload_id.to_string()))
            }
        }
    }

    /// Assemble the session's parts into the final object at
    /// `bucket`/`key` and retire the session.
    ///
    /// Parts are deduplicated by part number (the later registration
    /// wins) and concatenated in ascending part-number order.  If
    /// assembly fails the session stays ACTIVE with its temp blobs
    /// intact, so the client can retry or abort.
    pub async fn complete(
        &self,
        upload_id: &str,
        bucket: &str,
        key: &str,
    ) -> Result<CompletedUpload, UploadError> {
        let parts = {
            let sessions = self.sessions.read().await;
            match sessions.get(upload_id) {
                Some(session) => session.parts.clone(),
                None => return Err(UploadError::NoSuchUpload(upload_id.to_string())),
            }
        };

        // Last registration wins for a repeated part number.
        let mut by_number: HashMap<u32, PartInfo> = HashMap::new();
        for part in parts {
            by_number.insert(part.part_number, part);
        }
        let mut ordered: Vec<PartInfo> = by_number.into_values().collect();
        ordered.sort_by_key(|p| p.part_number);

        // Read the parts and assemble outside the lock; any failure here
        // leaves the session untouched.
        let mut assembled = BytesMut::new();
        for part in &ordered {
            let data = self.store.read_temp(&part.temp).await?;
            assembled.extend_from_slice(&data);
        }
        let assembled = assembled.freeze();
        let size = assembled.len() as u64;

        self.store.put(bucket, key, assembled).await?;

        let part_etags: Vec<String> = ordered.iter().map(|p| p.etag.clone()).collect();
        let composite = etag::multipart_etag(&part_etags);

        // Only now retire the session, taking the final part list so a
        // part registered during assembly still gets its temp removed.
        let session = self.sessions.write().await.remove(upload_id);
        if let Some(session) = session {
            for part in &session.parts {
                if let Err(e) = self.store.delete_temp(&part.temp).await {
                    warn!(upload_id, temp = %part.temp, "failed to delete temp blob: {e}");
                }
            }
        }

        Ok(CompletedUpload {
            size,
            etag: composite,
            part_etags,
        })
    }

    /// Discard the session and every associated temp blob.
    pub async fn abort(&self, upload_id: &str) -> Result<(), UploadError> {
        let session = self.sessions.write().await.remove(upload_id);
        match session {
            None => Err(UploadError::NoSuchUpload(upload_id.to_string())),
            Some(session) => {
                for part in &session.parts {
                    if let Err(e) = self.store.delete_temp(&part.temp).await {
                        warn!(upload_id, temp = %part.temp, "failed to delete temp blob: {e}");
                    }
                }
                Ok(())
            }
        }
    }

    /// The bucket and key a session was initiated for, if it is ACTIVE.
    pub async fn session_target(&self, upload_id: &str) -> Option<(String, String)> {
        self.sessions
            .read()
            .await
            .get(upload_id)
            .map(|s| (s.bucket.clone(), s.key.clone()))
    }
}
