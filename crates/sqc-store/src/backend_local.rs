// SPDX-License-Identifier: Apache-2.0

use crate::backend::{
    validate_object_key, NoopInstrumentation, NotificationRule, ObjectMetadata, ObjectStat,
    ObjectStore, StoreError, StoreErrorCode, StoreInstrumentation,
};
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

const BACKEND: &str = "local";
pub const METADATA_SUFFIX: &str = ".meta.json";
pub const NOTIFICATION_FILE: &str = ".notification.json";

/// Buckets are directories under `root`; user metadata lives next to each
/// object in a `<key>.meta.json` sidecar.
pub struct LocalFsStore {
    pub root: PathBuf,
    instrumentation: Arc<dyn StoreInstrumentation>,
}

impl LocalFsStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            instrumentation: Arc::new(NoopInstrumentation),
        }
    }

    #[must_use]
    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn StoreInstrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    /// Notification rule last registered on `bucket`, if any.
    pub fn notification(&self, bucket: &str) -> Result<Option<NotificationRule>, StoreError> {
        let path = self.bucket_dir(bucket)?.join(NOTIFICATION_FILE);
        match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(err, &path)),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StoreError::new(
                StoreErrorCode::Validation,
                format!("invalid bucket name {bucket:?}"),
            ));
        }
        Ok(self.root.join(bucket))
    }

    fn existing_bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Err(StoreError::new(
                StoreErrorCode::NotFound,
                format!("bucket {bucket} does not exist"),
            ));
        }
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_object_key(key)?;
        if key.ends_with(METADATA_SUFFIX) || key.ends_with(NOTIFICATION_FILE) {
            return Err(StoreError::new(
                StoreErrorCode::Validation,
                format!("object key {key:?} collides with store bookkeeping files"),
            ));
        }
        Ok(self.existing_bucket_dir(bucket)?.join(key))
    }

    fn observed<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(err) = &result {
            self.instrumentation.observe_error(BACKEND, err.code);
        }
        result
    }
}

fn metadata_path(object: &Path) -> PathBuf {
    let mut raw = OsString::from(object.as_os_str());
    raw.push(METADATA_SUFFIX);
    PathBuf::from(raw)
}

fn io_error(err: std::io::Error, path: &Path) -> StoreError {
    let code = if err.kind() == ErrorKind::NotFound {
        StoreErrorCode::NotFound
    } else {
        StoreErrorCode::Io
    };
    StoreError::new(code, format!("{}: {err}", path.display()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::new(
            StoreErrorCode::Internal,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    fs::create_dir_all(dir).map_err(|e| io_error(e, dir))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| io_error(e, dir))?;
    tmp.write_all(bytes).map_err(|e| io_error(e, tmp.path()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error(e, path))?;
    tmp.persist(path).map_err(|e| io_error(e.error, path))?;
    Ok(())
}

impl ObjectStore for LocalFsStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        Ok(self.bucket_dir(bucket)?.is_dir())
    }

    fn make_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let dir = self.bucket_dir(bucket)?;
        let result = fs::create_dir_all(&dir).map_err(|e| io_error(e, &dir));
        self.observed(result)
    }

    fn set_bucket_notification(
        &self,
        bucket: &str,
        rule: &NotificationRule,
    ) -> Result<(), StoreError> {
        let result = self.existing_bucket_dir(bucket).and_then(|dir| {
            let raw = serde_json::to_vec_pretty(rule)
                .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))?;
            write_atomic(&dir.join(NOTIFICATION_FILE), &raw)
        });
        self.observed(result)
    }

    fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat, StoreError> {
        let result = self.object_path(bucket, key).and_then(|path| {
            let size = fs::metadata(&path).map_err(|e| io_error(e, &path))?.len();
            let sidecar = metadata_path(&path);
            let metadata = match fs::read(&sidecar) {
                Ok(raw) => serde_json::from_slice::<ObjectMetadata>(&raw).map_err(|e| {
                    StoreError::new(
                        StoreErrorCode::Internal,
                        format!("corrupt metadata {}: {e}", sidecar.display()),
                    )
                })?,
                Err(err) if err.kind() == ErrorKind::NotFound => ObjectMetadata::new(),
                Err(err) => return Err(io_error(err, &sidecar)),
            };
            Ok(ObjectStat { size, metadata })
        });
        self.observed(result)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let started = Instant::now();
        let result = self
            .object_path(bucket, key)
            .and_then(|path| fs::read(&path).map_err(|e| io_error(e, &path)));
        if let Ok(bytes) = &result {
            self.instrumentation
                .observe_download(BACKEND, bytes.len(), started.elapsed());
        }
        self.observed(result)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.object_path(bucket, key).and_then(|path| {
            let normalized: ObjectMetadata = metadata
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect();
            let raw = serde_json::to_vec(&normalized)
                .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))?;
            write_atomic(&metadata_path(&path), &raw)?;
            write_atomic(&path, bytes)
        });
        if result.is_ok() {
            self.instrumentation
                .observe_upload(BACKEND, bytes.len(), started.elapsed());
        }
        self.observed(result)
    }

    fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let result = self.object_path(bucket, key).and_then(|path| {
            fs::remove_file(&path).map_err(|e| io_error(e, &path))?;
            let sidecar = metadata_path(&path);
            match fs::remove_file(&sidecar) {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(io_error(err, &sidecar)),
                _ => Ok(()),
            }
        });
        self.observed(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, LocalFsStore) {
        let root = tempdir().expect("tempdir");
        let store = LocalFsStore::new(root.path().to_path_buf());
        store.make_bucket("requests").expect("bucket");
        (root, store)
    }

    #[test]
    fn metadata_sidecar_sits_next_to_object() {
        let (root, store) = store();
        let mut meta = ObjectMetadata::new();
        meta.insert("File-Type".to_string(), "mmcif".to_string());
        store
            .put_object("requests", "1abc", b"data_1ABC", &meta)
            .expect("put");

        assert!(root.path().join("requests/1abc.meta.json").is_file());
        let stat = store.stat_object("requests", "1abc").expect("stat");
        assert_eq!(stat.size, 9);
        assert_eq!(stat.metadata_value("file-type"), Some("mmcif"));
    }

    #[test]
    fn bookkeeping_names_are_not_object_keys() {
        let (_root, store) = store();
        let err = store
            .put_object("requests", "x.meta.json", b"", &ObjectMetadata::new())
            .expect_err("collision");
        assert_eq!(err.code, StoreErrorCode::Validation);
    }

    #[test]
    fn missing_bucket_is_not_found() {
        let (_root, store) = store();
        let err = store.get_object("nope", "1abc").expect_err("no bucket");
        assert!(err.is_not_found());
    }
}
