//! Object identifier parsing.
//!
//! Objects are addressed either as `scheme://bucket/key` (for instance
//! `s3://landing/2024/orders.csv`) or as a plain `bucket/key`.

use crate::storage::traits::{StorageError, StorageErrorKind, StorageResult};
use std::fmt;

/// A parsed object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub scheme: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// Parse an object identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the bucket or the key is missing.
    pub fn parse(id: &str) -> StorageResult<Self> {
        let (scheme, rest) = match id.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.is_empty() {
                    return Err(StorageError::new(
                        StorageErrorKind::InvalidInput,
                        format!("Invalid object identifier: {id}"),
                    ));
                }
                (Some(scheme.to_string()), rest)
            }
            None => (None, id),
        };

        let rest = rest.trim_start_matches('/');
        let Some((bucket, key)) = rest.split_once('/') else {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("Object identifier has no key: {id}"),
            ));
        };

        if bucket.is_empty() || key.is_empty() {
            return Err(StorageError::new(
                StorageErrorKind::InvalidInput,
                format!("Invalid object identifier: {id}"),
            ));
        }

        Ok(Self {
            scheme,
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}://{}/{}", self.bucket, self.key)
        } else {
            write!(f, "{}/{}", self.bucket, self.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_scheme() {
        let loc = ObjectLocation::parse("s3://my-bucket/path/to/file.csv").unwrap();
        assert_eq!(loc.scheme.as_deref(), Some("s3"));
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.key, "path/to/file.csv");
        assert_eq!(loc.to_string(), "s3://my-bucket/path/to/file.csv");
    }

    #[test]
    fn test_parse_without_scheme() {
        let loc = ObjectLocation::parse("bucket/file.csv").unwrap();
        assert_eq!(loc.scheme, None);
        assert_eq!(loc.bucket, "bucket");
        assert_eq!(loc.key, "file.csv");
    }

    #[test]
    fn test_parse_invalid() {
        for id in ["", "bucket", "s3://bucket", "s3://bucket/", "://bucket/key", "/key"] {
            let err = ObjectLocation::parse(id).unwrap_err();
            assert_eq!(err.kind, StorageErrorKind::InvalidInput, "id={id:?}");
        }
    }
}
