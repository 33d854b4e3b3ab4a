//! Abstract blob store trait.
//!
//! Every storage backend must implement [`BlobStore`].  The trait covers
//! bucket lifecycle, whole-object reads/writes, key listing, server-side
//! copy, and a temporary-blob area used while multipart uploads are in
//! flight.  Callers pattern-match on [`StoreError`] rather than catching
//! exceptions deep in read paths.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;
use thiserror::Error;

/// Failure modes of blob store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The named object does not exist.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A bucket with this name already exists.
    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// The bucket still contains objects and cannot be deleted.
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// The temporary blob handle is unknown.
    #[error("temp blob not found: {0}")]
    TempNotFound(String),

    /// The key or bucket name is not acceptable (e.g. path traversal).
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Underlying I/O failure.
    #[error("i/o failure")]
    Io(#[from] std::io::Error),
}

/// A single entry returned by [`BlobStore::list_keys`] or
/// [`BlobStore::list_buckets`].
#[derive(Debug, Clone)]
pub struct BlobEntry {
    /// Key relative to the bucket (or bucket name for bucket listings).
    pub path: String,
    /// Whether this entry is a directory-like node rather than an object.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub last_modified: SystemTime,
}

/// Convenience alias for the boxed futures used throughout the trait.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Async blob storage contract.
///
/// Both the local filesystem and the in-memory backend satisfy this
/// trait; the server selects one at startup via configuration.
pub trait BlobStore: Send + Sync + 'static {
    // ── Buckets ─────────────────────────────────────────────────────

    /// Check whether a bucket exists.
    fn bucket_exists(&self, bucket: &str) -> StoreFuture<'_, bool>;

    /// Create a new bucket. Fails with `BucketAlreadyExists` if present.
    fn create_bucket(&self, bucket: &str) -> StoreFuture<'_, ()>;

    /// Delete a bucket. Fails with `BucketNotEmpty` if it still holds
    /// objects, and `BucketNotFound` if it does not exist.
    fn delete_bucket(&self, bucket: &str) -> StoreFuture<'_, ()>;

    /// List all buckets as entries (name + creation/modification time).
    fn list_buckets(&self) -> StoreFuture<'_, Vec<BlobEntry>>;

    // ── Objects ─────────────────────────────────────────────────────

    /// Check whether an object exists.
    fn object_exists(&self, bucket: &str, key: &str) -> StoreFuture<'_, bool>;

    /// Write `data` as the full content of `bucket`/`key`, replacing any
    /// previous content.
    fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreFuture<'_, ()>;

    /// Read the full content of `bucket`/`key`.
    fn get(&self, bucket: &str, key: &str) -> StoreFuture<'_, Bytes>;

    /// Delete the object at `bucket`/`key`.
    fn delete(&self, bucket: &str, key: &str) -> StoreFuture<'_, ()>;

    /// Size in bytes of the object at `bucket`/`key`.
    fn size(&self, bucket: &str, key: &str) -> StoreFuture<'_, u64>;

    /// Last-modified timestamp of the object at `bucket`/`key`.
    fn last_modified(&self, bucket: &str, key: &str) -> StoreFuture<'_, SystemTime>;

    /// List every entry under `bucket`, objects and directory-like nodes
    /// alike. Keys are reported relative to the bucket.
    fn list_keys(&self, bucket: &str) -> StoreFuture<'_, Vec<BlobEntry>>;

    /// Server-side copy of `src_bucket`/`src_key` to `dst_bucket`/`dst_key`.
    fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreFuture<'_, ()>;

    // ── Temporary blobs ─────────────────────────────────────────────

    /// Allocate a fresh temporary blob and return its opaque handle.
    fn create_temp(&self, prefix: &str) -> StoreFuture<'_, String>;

    /// Write the full content of the temporary blob at `handle`.
    fn write_temp(&self, handle: &str, data: Bytes) -> StoreFuture<'_, ()>;

    /// Read the full content of the temporary blob at `handle`.
    fn read_temp(&self, handle: &str) -> StoreFuture<'_, Bytes>;

    /// Delete the temporary blob at `handle`. Idempotent.
    fn delete_temp(&self, handle: &str) -> StoreFuture<'_, ()>;
}
