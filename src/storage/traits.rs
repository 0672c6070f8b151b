//! Core traits for object storage access.
//!
//! The reader only needs two things from a store: the size of an object and a
//! (possibly byte-range restricted) stream over its content. Both calls are
//! blocking.

use std::error::Error;
use std::fmt;
use std::io::Read;
use std::ops::Range;
use std::sync::Arc;

// ============================================================================
// Core Error Type
// ============================================================================

/// Error type for object storage operations
#[derive(Debug, Clone)]
pub struct StorageError {
    pub message: String,
    pub kind: StorageErrorKind,
    pub source: Option<Arc<dyn Error + Send + Sync>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    InvalidInput,
    PermissionDenied,
    Network,
    Timeout,
    Other,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub(crate) fn from_io(object: &str, err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::TimedOut => StorageErrorKind::Timeout,
            std::io::ErrorKind::InvalidInput => StorageErrorKind::InvalidInput,
            _ => StorageErrorKind::Other,
        };
        Self::new(kind, format!("Object {object} could not be accessed")).with_source(err)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// ObjectStore - Object Storage
// ============================================================================

/// Byte stream over (a range of) an object.
pub type ObjectReader = Box<dyn Read + Send>;

/// Metadata for an object in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub object: String,
    pub size: u64,
    pub last_modified: Option<i64>, // Unix timestamp
}

/// Trait for reading objects out of a store
pub trait ObjectStore: Send + Sync {
    /// Get object metadata without downloading content
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, permissions are not enough, or the lookup fails
    fn metadata(&self, object: &str) -> StorageResult<ObjectMetadata>;

    /// Open a byte stream over an object.
    ///
    /// `range` is start-inclusive and end-exclusive, and is clamped to the
    /// object size. A range starting at or past the end yields an empty stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist, permissions are not enough, or the open fails
    fn open(&self, object: &str, range: Option<Range<u64>>) -> StorageResult<ObjectReader>;

    /// Size of an object in bytes
    ///
    /// # Errors
    ///
    /// See [`ObjectStore::metadata`].
    fn size_of(&self, object: &str) -> StorageResult<u64> {
        Ok(self.metadata(object)?.size)
    }

    /// Check if an object exists
    ///
    /// # Errors
    ///
    /// Returns an error if the check itself fails for another reason than absence
    fn exists(&self, object: &str) -> StorageResult<bool> {
        match self.metadata(object) {
            Ok(_) => Ok(true),
            Err(err) if err.kind == StorageErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Clamp a requested range to an object of `size` bytes.
pub(crate) fn clamp_range(range: Option<Range<u64>>, size: u64) -> Range<u64> {
    match range {
        None => 0..size,
        Some(r) => {
            let start = r.start.min(size);
            let end = r.end.min(size).max(start);
            start..end
        }
    }
}
