//! Typed-value conversion of raw field bytes.
//!
//! The tokenizer only produces bytes. A [`ValueConverter`] turns them into a
//! [`Value`] according to the field's [`FieldDef`], either eagerly while
//! reading or later through [`FieldValue::materialize`](crate::row::FieldValue::materialize).

use crate::config::{FieldDef, FieldType, TrimType};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

/// Date pattern used when a date field declares no format.
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// A converted field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
    Binary(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format(DEFAULT_DATE_FORMAT)),
            Value::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

/// A field that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConversionError {
    pub field: String,
    /// The offending input, lossily decoded.
    pub raw: String,
    pub message: String,
}

impl FieldConversionError {
    fn new(field: &FieldDef, raw: &[u8], message: impl Into<String>) -> Self {
        Self {
            field: field.name.clone(),
            raw: String::from_utf8_lossy(raw).into_owned(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field `{}`: cannot convert {:?}: {}",
            self.field, self.raw, self.message
        )
    }
}

impl std::error::Error for FieldConversionError {}

/// Converts raw field bytes into values. `Ok(None)` is a null.
pub trait ValueConverter: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`FieldConversionError`] when `raw` is not a valid value for
    /// `field`.
    fn convert(&self, raw: &[u8], field: &FieldDef) -> Result<Option<Value>, FieldConversionError>;
}

/// Converter handling every [`FieldType`].
///
/// Text is decoded as UTF-8 and trimmed according to the field. Empty text,
/// or text equal to `null_if`, is null. Numbers accept the field's decimal,
/// grouping and currency symbols. Booleans are true for `Y`, `YES`, `TRUE`
/// and `1` (any case) and false otherwise. Dates follow the field's chrono
/// format, and a date-only format yields midnight.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConverter;

impl ValueConverter for DefaultConverter {
    fn convert(&self, raw: &[u8], field: &FieldDef) -> Result<Option<Value>, FieldConversionError> {
        if field.field_type == FieldType::Binary {
            return Ok((!raw.is_empty()).then(|| Value::Binary(raw.to_vec())));
        }

        let text = std::str::from_utf8(raw)
            .map_err(|e| FieldConversionError::new(field, raw, format!("invalid UTF-8: {e}")))?;
        let text = trim(text, field.trim);

        if text.is_empty() || field.null_if.as_deref() == Some(text) {
            return Ok(None);
        }

        let value = match field.field_type {
            FieldType::String => Value::String(text.to_string()),
            FieldType::Integer => {
                let digits = normalize_number(text, field);
                let parsed = digits
                    .parse::<i64>()
                    .map_err(|e| FieldConversionError::new(field, raw, e.to_string()))?;
                Value::Integer(parsed)
            }
            FieldType::Number => {
                let digits = normalize_number(text, field);
                let parsed = digits
                    .parse::<f64>()
                    .map_err(|e| FieldConversionError::new(field, raw, e.to_string()))?;
                Value::Number(parsed)
            }
            FieldType::Boolean => Value::Boolean(matches!(
                text.to_ascii_uppercase().as_str(),
                "Y" | "YES" | "TRUE" | "1"
            )),
            FieldType::Date => {
                let format = field.format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
                Value::Date(parse_date(text, format).map_err(|e| {
                    FieldConversionError::new(field, raw, format!("{e} (format {format:?})"))
                })?)
            }
            FieldType::Binary => Value::Binary(raw.to_vec()),
        };

        Ok(Some(value))
    }
}

fn trim(text: &str, trim: TrimType) -> &str {
    match trim {
        TrimType::None => text,
        TrimType::Left => text.trim_start(),
        TrimType::Right => text.trim_end(),
        TrimType::Both => text.trim(),
    }
}

/// Strip currency and grouping symbols and use `.` as decimal separator.
fn normalize_number(text: &str, field: &FieldDef) -> String {
    let mut s = text.to_string();
    if let Some(currency) = field.currency_symbol.as_deref().filter(|c| !c.is_empty()) {
        s = s.replace(currency, "");
    }
    if let Some(group) = field.group_symbol.as_deref().filter(|g| !g.is_empty()) {
        s = s.replace(group, "");
    }
    if !field.decimal_symbol.is_empty() && field.decimal_symbol != "." {
        s = s.replace(&field.decimal_symbol, ".");
    }
    s.trim().to_string()
}

fn parse_date(text: &str, format: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, format).or_else(|err| {
        NaiveDate::parse_from_str(text, format)
            .map(|d| d.and_time(NaiveTime::MIN))
            .map_err(|_| err)
    })
}
