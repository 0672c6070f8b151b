//! Filesystem-backed object store.
//!
//! Buckets are directories under a root, keys are relative paths inside them.
//! Useful for running the reader against files on local disk or a mounted
//! volume.

use crate::storage::helpers::ObjectLocation;
use crate::storage::traits::{
    clamp_range, ObjectMetadata, ObjectReader, ObjectStore, StorageError, StorageErrorKind,
    StorageResult,
};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, object: &str) -> StorageResult<PathBuf> {
        let loc = ObjectLocation::parse(object)?;
        let relative = Path::new(&loc.bucket).join(&loc.key);

        // Keys must stay inside the root.
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("Object {object} escapes the store root"),
            ));
        }

        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn metadata(&self, object: &str) -> StorageResult<ObjectMetadata> {
        let path = self.path_of(object)?;
        let meta = std::fs::metadata(&path).map_err(|e| StorageError::from_io(object, e))?;

        if !meta.is_file() {
            return Err(StorageError::new(
                StorageErrorKind::NotFound,
                format!("Object {object} is not a file"),
            ));
        }

        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok());

        Ok(ObjectMetadata {
            object: object.to_string(),
            size: meta.len(),
            last_modified,
        })
    }

    fn open(&self, object: &str, range: Option<Range<u64>>) -> StorageResult<ObjectReader> {
        let path = self.path_of(object)?;
        let mut file = File::open(&path).map_err(|e| StorageError::from_io(object, e))?;

        if range.is_none() {
            return Ok(Box::new(file));
        }

        let size = file
            .metadata()
            .map_err(|e| StorageError::from_io(object, e))?
            .len();
        let range = clamp_range(range, size);

        file.seek(SeekFrom::Start(range.start))
            .map_err(|e| StorageError::from_io(object, e))?;

        Ok(Box::new(file.take(range.end - range.start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ranges() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bucket/nested")).unwrap();
        std::fs::write(dir.path().join("bucket/nested/a.csv"), b"hello,world\n").unwrap();

        let store = LocalObjectStore::new(dir.path());
        assert_eq!(store.size_of("file://bucket/nested/a.csv").unwrap(), 12);

        let mut out = String::new();
        store
            .open("bucket/nested/a.csv", Some(6..11))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "world");
    }

    #[test]
    fn test_local_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let err = store.open("bucket/../../etc/passwd", None).err().unwrap();
        assert_eq!(err.kind, StorageErrorKind::InvalidInput);

        let err = store.metadata("bucket/missing.csv").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert_eq!(store.root(), dir.path());

        let cause = std::error::Error::source(&err)
            .and_then(|e| e.downcast_ref::<std::io::Error>())
            .expect("io error kept as source");
        assert_eq!(cause.kind(), std::io::ErrorKind::NotFound);
    }
}
