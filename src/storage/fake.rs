//! In-memory object store for tests.
//!
//! [`FakeObjectStore`] keeps every object in memory, records every `open`
//! request so tests can check which byte ranges a reader asked for, and can be
//! told to break a stream after a number of bytes.

use crate::storage::helpers::ObjectLocation;
use crate::storage::traits::{
    clamp_range, ObjectMetadata, ObjectReader, ObjectStore, StorageError, StorageErrorKind,
    StorageResult,
};
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::ops::Range;
use std::sync::{Arc, Mutex};

type BucketStorage = Arc<Mutex<HashMap<String, HashMap<String, Vec<u8>>>>>;

/// An `open` call as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub object: String,
    pub range: Option<Range<u64>>,
}

#[derive(Clone)]
pub struct FakeObjectStore {
    storage: BucketStorage,
    opens: Arc<Mutex<Vec<OpenRequest>>>,
    failures: Arc<Mutex<HashMap<(String, String), usize>>>,
}

impl FakeObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
            opens: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store an object, replacing any previous content.
    pub fn put_object(&self, bucket: &str, key: &str, data: impl AsRef<[u8]>) {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.as_ref().to_vec());
    }

    /// Make every stream opened on `object` fail once it has yielded `bytes` bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `object` is not a valid identifier.
    pub fn fail_after(&self, object: &str, bytes: usize) -> StorageResult<()> {
        let loc = ObjectLocation::parse(object)?;
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .insert((loc.bucket, loc.key), bytes);
        Ok(())
    }

    /// Every `open` request received so far, in order.
    #[must_use]
    pub fn open_requests(&self) -> Vec<OpenRequest> {
        self.opens.lock().expect("opens mutex poisoned").clone()
    }

    fn lookup(&self, object: &str) -> StorageResult<(ObjectLocation, Vec<u8>)> {
        let loc = ObjectLocation::parse(object)?;
        let storage = self.storage.lock().expect("storage mutex poisoned");
        let data = storage
            .get(&loc.bucket)
            .and_then(|b| b.get(&loc.key))
            .cloned()
            .ok_or_else(|| {
                StorageError::new(
                    StorageErrorKind::NotFound,
                    format!("Object {object} not found"),
                )
            })?;
        drop(storage);
        Ok((loc, data))
    }
}

impl Default for FakeObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for FakeObjectStore {
    fn metadata(&self, object: &str) -> StorageResult<ObjectMetadata> {
        let (_, data) = self.lookup(object)?;
        Ok(ObjectMetadata {
            object: object.to_string(),
            size: data.len() as u64,
            last_modified: Some(0),
        })
    }

    fn open(&self, object: &str, range: Option<Range<u64>>) -> StorageResult<ObjectReader> {
        self.opens
            .lock()
            .expect("opens mutex poisoned")
            .push(OpenRequest {
                object: object.to_string(),
                range: range.clone(),
            });

        let (loc, data) = self.lookup(object)?;
        let range = clamp_range(range, data.len() as u64);
        #[allow(clippy::cast_possible_truncation)]
        let slice = data[range.start as usize..range.end as usize].to_vec();

        let fail_after = self
            .failures
            .lock()
            .expect("failures mutex poisoned")
            .get(&(loc.bucket, loc.key))
            .copied();

        match fail_after {
            Some(remaining) => Ok(Box::new(FailingReader {
                inner: Cursor::new(slice),
                remaining,
            })),
            None => Ok(Box::new(Cursor::new(slice))),
        }
    }
}

/// Yields `remaining` bytes, then errors on every subsequent read.
struct FailingReader {
    inner: Cursor<Vec<u8>>,
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by fake store",
            ));
        }
        let len = buf.len().min(self.remaining);
        let n = self.inner.read(&mut buf[..len])?;
        self.remaining -= n;
        Ok(n)
    }
}
