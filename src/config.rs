//! Reader configuration.
//!
//! [`CsvInputConfig`] is plain serde data, so it can be built in code or
//! loaded from JSON:
//!
//! ```
//! use shardcsv::config::CsvInputConfig;
//!
//! let config = CsvInputConfig::from_json_str(r#"{
//!     "filenames": ["s3://landing/orders.csv"],
//!     "header_present": true,
//!     "fields": [
//!         { "name": "id", "type": "integer" },
//!         { "name": "amount", "type": "number", "decimal_symbol": "," }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(config.delimiter_byte(), b',');
//! assert_eq!(config.buffer_size, 500_000);
//! ```

use crate::error::{CsvInputError, Result};
use crate::tokenizer::Dialect;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Type a field is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Binary,
}

/// Whitespace trimming applied before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrimType {
    #[default]
    None,
    Left,
    Right,
    Both,
}

/// What to do with a row whose fields fail to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionErrorPolicy {
    /// Stop reading with [`CsvInputError::Conversion`].
    #[default]
    Fail,
    /// Null the failing fields and report them on the row.
    Route,
}

/// A declared input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    /// chrono format string for dates.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default = "default_decimal_symbol")]
    pub decimal_symbol: String,
    #[serde(default)]
    pub group_symbol: Option<String>,
    #[serde(default)]
    pub currency_symbol: Option<String>,
    #[serde(default)]
    pub trim: TrimType,
    /// Value treated as null, compared after trimming.
    #[serde(default)]
    pub null_if: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            format: None,
            decimal_symbol: default_decimal_symbol(),
            group_symbol: None,
            currency_symbol: None,
            trim: TrimType::None,
            null_if: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_trim(mut self, trim: TrimType) -> Self {
        self.trim = trim;
        self
    }

    #[must_use]
    pub fn with_null_if(mut self, null_if: impl Into<String>) -> Self {
        self.null_if = Some(null_if.into());
        self
    }
}

fn default_decimal_symbol() -> String {
    ".".to_string()
}

fn default_delimiter() -> char {
    ','
}

#[allow(clippy::unnecessary_wraps)]
fn default_enclosure() -> Option<char> {
    Some('"')
}

fn default_buffer_size() -> usize {
    500_000
}

fn default_max_line_size() -> usize {
    5_000
}

fn default_feedback_size() -> u64 {
    50_000
}

/// Configuration of one CSV input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvInputConfig {
    /// Objects forming the logical stream. When empty, objects come from
    /// upstream rows through `filename_field`.
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Upstream column holding object identifiers. Also the name of the
    /// output filename field.
    #[serde(default)]
    pub filename_field: Option<String>,
    /// Append the object identifier to every row.
    #[serde(default)]
    pub include_filename: bool,
    /// Append a 1-based row number (per object) under this name.
    #[serde(default)]
    pub row_number_field: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_enclosure")]
    pub enclosure: Option<char>,
    #[serde(default)]
    pub header_present: bool,
    /// Keep raw bytes and convert on demand.
    #[serde(default)]
    pub lazy_conversion: bool,
    /// Read-ahead chunk size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Longest expected row, used to size the over-fetch of ranged reads.
    #[serde(default = "default_max_line_size")]
    pub max_line_size: usize,
    #[serde(default)]
    pub running_in_parallel: bool,
    #[serde(default)]
    pub newline_possible_in_fields: bool,
    /// Map file columns to fields by header name instead of position.
    #[serde(default)]
    pub match_header_names: bool,
    /// Log progress every this many rows (0 disables).
    #[serde(default = "default_feedback_size")]
    pub feedback_size: u64,
    #[serde(default)]
    pub on_conversion_error: ConversionErrorPolicy,
    pub fields: Vec<FieldDef>,
}

impl Default for CsvInputConfig {
    fn default() -> Self {
        Self {
            filenames: Vec::new(),
            filename_field: None,
            include_filename: false,
            row_number_field: None,
            delimiter: default_delimiter(),
            enclosure: default_enclosure(),
            header_present: false,
            lazy_conversion: false,
            buffer_size: default_buffer_size(),
            max_line_size: default_max_line_size(),
            running_in_parallel: false,
            newline_possible_in_fields: false,
            match_header_names: false,
            feedback_size: default_feedback_size(),
            on_conversion_error: ConversionErrorPolicy::Fail,
            fields: Vec::new(),
        }
    }
}

impl CsvInputConfig {
    /// A configuration reading `filenames` into the given fields.
    pub fn new<S: Into<String>>(filenames: impl IntoIterator<Item = S>, fields: Vec<FieldDef>) -> Self {
        Self {
            filenames: filenames.into_iter().map(Into::into).collect(),
            fields,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CsvInputError::Config`] if the JSON is malformed or the
    /// configuration is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CsvInputError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CsvInputError::Config`] if the file can't be read or holds
    /// an invalid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CsvInputError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Check that the configuration can drive a reader.
    ///
    /// # Errors
    ///
    /// Returns [`CsvInputError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        check_separator("delimiter", self.delimiter)?;
        if let Some(enclosure) = self.enclosure {
            check_separator("enclosure", enclosure)?;
            if enclosure == self.delimiter {
                return Err(CsvInputError::config(
                    "enclosure and delimiter must be different",
                ));
            }
        }
        if self.fields.is_empty() {
            return Err(CsvInputError::config("at least one field must be declared"));
        }
        if self.fields.iter().any(|f| f.name.trim().is_empty()) {
            return Err(CsvInputError::config("field names must not be empty"));
        }
        if self.buffer_size == 0 {
            return Err(CsvInputError::config("buffer_size must be positive"));
        }
        if self.max_line_size == 0 {
            return Err(CsvInputError::config("max_line_size must be positive"));
        }
        if self.include_filename && self.filename_field.is_none() {
            return Err(CsvInputError::config(
                "include_filename requires filename_field",
            ));
        }
        Ok(())
    }

    /// Byte-level dialect handed to the tokenizer.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        Dialect {
            delimiter: self.delimiter_byte(),
            enclosure: self.enclosure_byte(),
            newline_possible_in_fields: self.newline_possible_in_fields,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn enclosure_byte(&self) -> Option<u8> {
        self.enclosure.map(|c| c as u8)
    }

    /// Names of the fields emitted for every row.
    #[must_use]
    pub fn output_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        if self.include_filename
            && let Some(field) = &self.filename_field
        {
            names.push(field.clone());
        }
        if let Some(field) = &self.row_number_field {
            names.push(field.clone());
        }
        names
    }
}

fn check_separator(what: &str, c: char) -> Result<()> {
    if !c.is_ascii() {
        return Err(CsvInputError::config(format!(
            "{what} must be a single-byte character, got {c:?}"
        )));
    }
    if c == '\n' || c == '\r' {
        return Err(CsvInputError::config(format!(
            "{what} must not be a line terminator"
        )));
    }
    Ok(())
}
