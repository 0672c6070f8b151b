//! Error types for CSV input.
//!
//! Every failure surfaced by the reader is a [`CsvInputError`]. Low-level I/O
//! failures are wrapped together with the object being read and the byte
//! offset the reader had reached, and are never retried.

use crate::convert::FieldConversionError;
use crate::storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Error raised while configuring or running a CSV input.
#[derive(Debug, Error)]
pub enum CsvInputError {
    /// Invalid or incomplete configuration (no objects, bad delimiter, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// The object store refused a size lookup or an open request.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reading the byte stream of an object failed.
    #[error("I/O error reading {object} at byte {offset}: {source}")]
    Read {
        object: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// The upstream rows do not carry the configured filename column.
    #[error("filename field `{0}` not found in upstream rows")]
    FilenameFieldNotFound(String),

    /// One or more fields of a row could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionErrors),
}

impl CsvInputError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Return whether the error was raised while reading an object's bytes.
    #[must_use]
    pub fn is_read_error(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

/// All conversion failures found on a single row.
#[derive(Debug)]
pub struct ConversionErrors {
    /// 1-based row number within the object the row came from.
    pub row_number: u64,
    /// Object the row was read from.
    pub object: String,
    pub causes: Vec<FieldConversionError>,
}

impl fmt::Display for ConversionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "there were {} conversion errors on row {} of {}",
            self.causes.len(),
            self.row_number,
            self.object
        )?;
        if let Some(first) = self.causes.first() {
            write!(f, ": {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConversionErrors {}

/// A type alias for `Result<T, shardcsv::CsvInputError>`.
pub type Result<T> = std::result::Result<T, CsvInputError>;
