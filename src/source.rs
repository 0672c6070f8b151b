//! Resolution of the objects forming the logical stream.

use crate::error::{CsvInputError, Result};
use std::fmt;

/// Rows produced by an upstream step, one of whose columns names objects.
pub struct UpstreamRows {
    pub columns: Vec<String>,
    pub rows: Box<dyn Iterator<Item = Vec<String>> + Send>,
}

impl UpstreamRows {
    pub fn new<I>(columns: Vec<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            columns,
            rows: Box::new(rows.into_iter()),
        }
    }
}

impl fmt::Debug for UpstreamRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamRows")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Where object identifiers come from.
#[derive(Debug)]
pub enum ObjectSource {
    Static(Vec<String>),
    Upstream(UpstreamRows),
}

impl ObjectSource {
    /// Collect the object identifiers, draining upstream rows if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CsvInputError::FilenameFieldNotFound`] if upstream rows lack
    /// `filename_field`, and [`CsvInputError::Config`] if no field is
    /// configured for upstream rows.
    pub fn resolve(self, filename_field: Option<&str>) -> Result<Vec<String>> {
        match self {
            ObjectSource::Static(objects) => Ok(objects),
            ObjectSource::Upstream(upstream) => {
                let field = filename_field.ok_or_else(|| {
                    CsvInputError::config("filename_field is required to read objects from upstream rows")
                })?;
                let index = upstream
                    .columns
                    .iter()
                    .position(|c| c == field)
                    .ok_or_else(|| CsvInputError::FilenameFieldNotFound(field.to_string()))?;

                let objects: Vec<String> = upstream
                    .rows
                    .filter_map(|mut row| (index < row.len()).then(|| row.swap_remove(index)))
                    .collect();
                tracing::debug!(count = objects.len(), field, "resolved objects from upstream rows");
                Ok(objects)
            }
        }
    }
}
