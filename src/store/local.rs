//! Local filesystem blob store.
//!
//! Buckets are directories under a configurable root; objects are flat
//! files whose key is used as a relative path (keys containing `/`
//! create intermediate directories).  Temporary blobs live under a
//! dedicated `.tmp` directory next to the buckets.
//!
//! Object writes follow the temp-fsync-rename pattern so a crash never
//! leaves a partially written object visible.

use bytes::Bytes;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::blob::{BlobEntry, BlobStore, StoreError, StoreFuture};

/// Directory under the root reserved for temporary blobs.
const TEMP_DIR: &str = ".tmp";

/// Stores blobs on the local filesystem.
pub struct LocalBlobStore {
    /// Root directory holding one subdirectory per bucket.
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a new `LocalBlobStore` rooted at `root`.
    ///
    /// The root and its temp area are created if they do not exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(TEMP_DIR))?;
        Ok(Self { root })
    }

    /// Reject names that would escape the root directory.
    fn validate(name: &str) -> Result<(), StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        for component in Path::new(name).components() {
            if matches!(component, Component::ParentDir | Component::RootDir) {
                return Err(StoreError::InvalidName(name.to_string()));
            }
        }
        Ok(())
    }

    /// Resolve a bucket name to its directory.
    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        Self::validate(bucket)?;
        Ok(self.root.join(bucket))
    }

    /// Resolve a bucket + key to an object file path.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        Self::validate(bucket)?;
        Self::validate(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    /// Resolve a temp handle (relative to the temp area) to a file path.
    fn temp_path(&self, handle: &str) -> Result<PathBuf, StoreError> {
        Self::validate(handle)?;
        Ok(self.root.join(TEMP_DIR).join(handle))
    }

    /// Write `data` to `path` via a temp file and atomic rename.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self
            .root
            .join(TEMP_DIR)
            .join(format!("staging-{}", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&staging)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    /// Recursively collect entries under `dir`, reporting paths relative
    /// to `base`.
    fn walk(base: &Path, dir: &Path, out: &mut Vec<BlobEntry>) -> Result<(), StoreError> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let rel = entry
                .path()
                .strip_prefix(base)
                .map_err(|_| StoreError::InvalidName(entry.path().display().to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if meta.is_dir() {
                out.push(BlobEntry {
                    path: rel,
                    is_directory: true,
                    size: 0,
                    last_modified: modified,
                });
                Self::walk(base, &entry.path(), out)?;
            } else {
                out.push(BlobEntry {
                    path: rel,
                    is_directory: false,
                    size: meta.len(),
                    last_modified: modified,
                });
            }
        }
        Ok(())
    }
}

impl BlobStore for LocalBlobStore {
    fn bucket_exists(&self, bucket: &str) -> StoreFuture<'_, bool> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&bucket)?;
            Ok(path.is_dir())
        })
    }

    fn create_bucket(&self, bucket: &str) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&bucket)?;
            if path.exists() {
                return Err(StoreError::BucketAlreadyExists(bucket));
            }
            std::fs::create_dir_all(&path)?;
            Ok(())
        })
    }

    fn delete_bucket(&self, bucket: &str) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let path = self.bucket_path(&bucket)?;
            if !path.is_dir() {
                return Err(StoreError::BucketNotFound(bucket));
            }
            if std::fs::read_dir(&path)?.next().is_some() {
                return Err(StoreError::BucketNotEmpty(bucket));
            }
            std::fs::remove_dir(&path)?;
            Ok(())
        })
    }

    fn list_buckets(&self) -> StoreFuture<'_, Vec<BlobEntry>> {
        Box::pin(async move {
            let mut buckets = Vec::new();
            for entry in std::fs::read_dir(&self.root)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == TEMP_DIR || !entry.metadata()?.is_dir() {
                    continue;
                }
                let modified = entry
                    .metadata()?
                    .modified()
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                buckets.push(BlobEntry {
                    path: name,
                    is_directory: true,
                    size: 0,
                    last_modified: modified,
                });
            }
            buckets.sort_by(|a, b| a.path.cmp(&b.path));
            Ok(buckets)
        })
    }

    fn object_exists(&self, bucket: &str, key: &str) -> StoreFuture<'_, bool> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            Ok(path.is_file())
        })
    }

    fn put(&self, bucket: &str, key: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            if !self.bucket_path(&bucket)?.is_dir() {
                return Err(StoreError::BucketNotFound(bucket));
            }
            let path = self.object_path(&bucket, &key)?;
            self.write_atomic(&path, &data)
        })
    }

    fn get(&self, bucket: &str, key: &str) -> StoreFuture<'_, Bytes> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            if !path.is_file() {
                return Err(StoreError::ObjectNotFound(format!("{bucket}/{key}")));
            }
            Ok(Bytes::from(std::fs::read(&path)?))
        })
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreFuture<'_, ()> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            if !path.is_file() {
                return Err(StoreError::ObjectNotFound(format!("{bucket}/{key}")));
            }
            std::fs::remove_file(&path)?;
            Ok(())
        })
    }

    fn size(&self, bucket: &str, key: &str) -> StoreFuture<'_, u64> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            if !path.is_file() {
                return Err(StoreError::ObjectNotFound(format!("{bucket}/{key}")));
            }
            Ok(path.metadata()?.len())
        })
    }

    fn last_modified(&self, bucket: &str, key: &str) -> StoreFuture<'_, SystemTime> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let path = self.object_path(&bucket, &key)?;
            if !path.is_file() {
                return Err(StoreError::ObjectNotFound(format!("{bucket}/{key}")));
            }
            Ok(path.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH))
        })
    }

    fn list_keys(&self, bucket: &str) -> StoreFuture<'_, Vec<BlobEntry>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let base = self.bucket_path(&bucket)?;
            if !base.is_dir() {
                return Err(StoreError::BucketNotFound(bucket));
            }
            let mut entries = Vec::new();
            Self::walk(&base, &base, &mut entries)?;
            Ok(entries)
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
            let src = self.object_path(&src_bucket, &src_key)?;
            if !src.is_file() {
                return Err(StoreError::ObjectNotFound(format!(
                    "{src_bucket}/{src_key}"
                )));
            }
            if !self.bucket_path(&dst_bucket)?.is_dir() {
                return Err(StoreError::BucketNotFound(dst_bucket));
            }
            let data = std::fs::read(&src)?;
            let dst = self.object_path(&dst_bucket, &dst_key)?;
            self.write_atomic(&dst, &data)
        })
    }

    fn create_temp(&self, prefix: &str) -> StoreFuture<'_, String> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let handle = format!("{prefix}{}", uuid::Uuid::new_v4());
            let path = self.temp_path(&handle)?;
            std::fs::write(&path, b"")?;
            Ok(handle)
        })
    }

    fn write_temp(&self, handle: &str, data: Bytes) -> StoreFuture<'_, ()> {
        let handle = handle.to_string();
        Box::pin(async move {
            let path = self.temp_path(&handle)?;
            if !path.is_file() {
                return Err(StoreError::TempNotFound(handle));
            }
            let mut file = std::fs::File::create(&path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            Ok(())
        })
    }

    fn read_temp(&self, handle: &str) -> StoreFuture<'_, Bytes> {
        let handle = handle.to_string();
        Box::pin(async move {
            let path = self.temp_path(&handle)?;
            if !path.is_file() {
                return Err(StoreError::TempNotFound(handle));
            }
            Ok(Bytes::from(std::fs::read(&path)?))
        })
    }

    fn delete_temp(&self, handle: &str) -> StoreFuture<'_, ()> {
        let handle = handle.to_string();
        Box::pin(async move {
            let path = self.temp_path(&handle)?;
            if path.is_file() {
                std::fs::remove_file(&path)?;
            }
            Ok(())
        })
    }
}
