//! Output rows.

use crate::config::FieldDef;
use crate::convert::{FieldConversionError, Value, ValueConverter};

/// One output field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    /// Unconverted bytes, kept when lazy conversion is on.
    Raw(Vec<u8>),
    Value(Value),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Shorthand for a converted string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// Convert a raw value. Nulls and converted values are returned as is.
    ///
    /// # Errors
    ///
    /// Returns the converter's error if the raw bytes are not valid for `field`.
    pub fn materialize(
        self,
        field: &FieldDef,
        converter: &dyn ValueConverter,
    ) -> Result<FieldValue, FieldConversionError> {
        match self {
            FieldValue::Raw(bytes) => Ok(converter
                .convert(&bytes, field)?
                .map_or(FieldValue::Null, FieldValue::Value)),
            other => Ok(other),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

/// A row emitted by a [`CsvInput`](crate::input::CsvInput).
///
/// Values follow [`CsvInput::output_fields`](crate::input::CsvInput::output_fields):
/// declared fields first, then the filename and row-number fields when
/// configured.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub values: Vec<FieldValue>,
    /// Fields nulled because they failed to convert.
    pub errors: Vec<FieldConversionError>,
}

impl Row {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Values rendered as strings, with `None` for nulls and raw bytes lossily
    /// decoded.
    #[must_use]
    pub fn to_strings(&self) -> Vec<Option<String>> {
        self.values
            .iter()
            .map(|v| match v {
                FieldValue::Null => None,
                FieldValue::Raw(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                FieldValue::Value(value) => Some(value.to_string()),
            })
            .collect()
    }
}
