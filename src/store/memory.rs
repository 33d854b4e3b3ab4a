//! In-memory blob store.
//!
//! Buckets, objects, and temporary blobs are held in hash maps behind
//! `tokio::sync::RwLock`.  Useful for tests and for running the server
//! without touching disk; contents do not survive a restart.

use bytes::Bytes;
use std::collections::HashMap;
use std::time::SystemTime;

use super::blob::{BlobEntry, BlobStore, StoreError, StoreFuture};

/// A stored object's bytes plus its modification time.
#[derive(Debug, Clone)]
struct MemObject {
    data: Bytes,
    last_modified: SystemTime,
}

/// A single in-memory bucket.
#[derive(Debug, Clone)]
struct MemBucket {
    created: SystemTime,
    objects: HashMap<String, MemObject>,
}

/// Stores all blobs in process memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    buckets: tokio::sync::RwLock<HashMap<String, MemBucket>>,
    temps: tokio::sync::RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Create an empty `MemoryBlobStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn bucket_exists(&self, bucket: &str) -> StoreFuture<'_, bool> {
        let bucket = bucket.to_string();
        Box::pin(async move { Ok(self.buckets.read().await.contains_key(&bucket)) })
    }

    fn create_bucket(&self, bucket: &str) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            if buckets.contains_key(&bucket) {
                return Err(StoreError::BucketAlreadyExists(bucket));
            }
            buckets.insert(
                bucket,
                MemBucket {
                    created: SystemTime::now(),
                    objects: HashMap::new(),
                },
            );
            Ok(())
        })
    }

    fn delete_bucket(&self, bucket: &str) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            match buckets.get(&bucket) {
                None => Err(StoreError::BucketNotFound(bucket)),
                Some(b) if !b.objects.is_empty() => Err(StoreError::BucketNotEmpty(bucket)),
                Some(_) => {
                    buckets.remove(&bucket);
                    Ok(())
                }
            }
        })
    }

    fn list_buckets(&self) -> StoreFuture<'_, Vec<BlobEntry>> {
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let mut entries: Vec<BlobEntry> = buckets
                .iter()
                .map(|(name, b)| BlobEntry {
                    path: name.clone(),
                    is_directory: true,
                    size: 0,
                    last_modified: b.created,
                })
                .collect();
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(entries)
        })
    }

    fn object_exists(&self, bucket: &str, key: &str) -> StoreFuture<'_, bool> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            Ok(buckets
                .get(&bucket)
                .is_some_and(|b| b.objects.contains_key(&key)))
        })
    }

    fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            let b = buckets
                .get_mut(&bucket)
                .ok_or(StoreError::BucketNotFound(bucket))?;
            b.objects.insert(
                key,
                MemObject {
                    data,
                    last_modified: SystemTime::now(),
                },
            );
            Ok(())
        })
    }

    fn get(&self, bucket: &str, key: &str) -> StoreFuture<'_, Bytes> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            buckets
                .get(&bucket)
                .and_then(|b| b.objects.get(&key))
                .map(|o| o.data.clone())
                .ok_or_else(|| StoreError::ObjectNotFound(format!("{bucket}/{key}")))
        })
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            let b = buckets
                .get_mut(&bucket)
                .ok_or_else(|| StoreError::BucketNotFound(bucket.clone()))?;
            b.objects
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| StoreError::ObjectNotFound(format!("{bucket}/{key}")))
        })
    }

    fn size(&self, bucket: &str, key: &str) -> StoreFuture<'_, u64> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            buckets
                .get(&bucket)
                .and_then(|b| b.objects.get(&key))
                .map(|o| o.data.len() as u64)
                .ok_or_else(|| StoreError::ObjectNotFound(format!("{bucket}/{key}")))
        })
    }

    fn last_modified(&self, bucket: &str, key: &str) -> StoreFuture<'_, SystemTime> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            buckets
                .get(&bucket)
                .and_then(|b| b.objects.get(&key))
                .map(|o| o.last_modified)
                .ok_or_else(|| StoreError::ObjectNotFound(format!("{bucket}/{key}")))
        })
    }

    fn list_keys(&self, bucket: &str) -> StoreFuture<'_, Vec<BlobEntry>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let b = buckets
                .get(&bucket)
                .ok_or(StoreError::BucketNotFound(bucket))?;
            Ok(b.objects
                .iter()
                .map(|(key, o)| BlobEntry {
                    path: key.clone(),
                    is_directory: false,
                    size: o.data.len() as u64,
                    last_modified: o.last_modified,
                })
                .collect())
        })
    }

    fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreFuture<'_, ()> {
        let src_bucket = src_bucket.to_string();
        let src_key = src_key.to_string();
        let dst_bucket = dst_bucket.to_string();
        let dst_key = dst_key.to_string();
        Box::pin(async move {
            let mut buckets = self.buckets.write().await;
            let data = buckets
                .get(&src_bucket)
                .and_then(|b| b.objects.get(&src_key))
                .map(|o| o.data.clone())
                .ok_or_else(|| StoreError::ObjectNotFound(format!("{src_bucket}/{src_key}")))?;
            let dst = buckets
                .get_mut(&dst_bucket)
                .ok_or(StoreError::BucketNotFound(dst_bucket))?;
            dst.objects.insert(
                dst_key,
                MemObject {
                    data,
                    last_modified: SystemTime::now(),
                },
            );
            Ok(())
        })
    }

    fn create_temp(&self, prefix: &str) -> StoreFuture<'_, String> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let handle = format!("{prefix}{}", uuid::Uuid::new_v4());
            self.temps
                .write()
                .await
                .insert(handle.clone(), Bytes::new());
            Ok(handle)
        })
    }

    fn write_temp(&self, handle: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let handle = handle.to_string();
        Box::pin(async move {
            let mut temps = self.temps.write().await;
            match temps.get_mut(&handle) {
                Some(slot) => {
                    *slot = data;
                    Ok(())
                }
                None => Err(StoreError::TempNotFound(handle)),
            }
        })
    }

    fn read_temp(&self, handle: &str) -> StoreFuture<'_, Bytes> {
        let handle = handle.to_string();
        Box::pin(async move {
            self.temps
                .read()
                .await
                .get(&handle)
                .cloned()
                .ok_or(StoreError::TempNotFound(handle))
        })
    }

    fn delete_temp(&self, handle: &str) -> StoreFuture<'_, ()> {
        let handle = handle.to_string();
        Box::pin(async move {
            self.temps.write().await.remove(&handle);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = MemoryBlobStore::new();
        store.create_bucket("b1").await.unwrap();
        assert!(store.bucket_exists("b1").await.unwrap());
        assert!(matches!(
            store.create_bucket("b1").await,
            Err(StoreError::BucketAlreadyExists(_))
        ));
        store.put("b1", "k", Bytes::from("v")).await.unwrap();
        assert!(matches!(
            store.delete_bucket("b1").await,
            Err(StoreError::BucketNotEmpty(_))
        ));
        store.delete("b1", "k").await.unwrap();
        store.delete_bucket("b1").await.unwrap();
        assert!(!store.bucket_exists("b1").await.unwrap());
    }

    #[tokio::test]
    async fn test_object_roundtrip() {
        let store = MemoryBlobStore::new();
        store.create_bucket("b1").await.unwrap();
        store.put("b1", "key", Bytes::from("hello")).await.unwrap();
        assert_eq!(store.get("b1", "key").await.unwrap().as_ref(), b"hello");
        assert_eq!(store.size("b1", "key").await.unwrap(), 5);
        store.delete("b1", "key").await.unwrap();
        assert!(matches!(
            store.get("b1", "key").await,
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_into_missing_bucket() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.put("nope", "k", Bytes::from("v")).await,
            Err(StoreError::BucketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_between_buckets() {
        let store = MemoryBlobStore::new();
        store.create_bucket("a").await.unwrap();
        store.create_bucket("b").await.unwrap();
        store.put("a", "k", Bytes::from("data")).await.unwrap();
        store.copy("a", "k", "b", "k").await.unwrap();
        assert_eq!(store.get("b", "k").await.unwrap().as_ref(), b"data");
    }

    #[tokio::test]
    async fn test_temp_blobs() {
        let store = MemoryBlobStore::new();
        let h = store.create_temp("part-").await.unwrap();
        store.write_temp(&h, Bytes::from("x")).await.unwrap();
        assert_eq!(store.read_temp(&h).await.unwrap().as_ref(), b"x");
        store.delete_temp(&h).await.unwrap();
        assert!(matches!(
            store.read_temp(&h).await,
            Err(StoreError::TempNotFound(_))
        ));
    }
}
