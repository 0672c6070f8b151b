//! Streaming CSV row tokenizer.
//!
//! [`Tokenizer`] pulls bytes from a blocking stream through a growable window
//! and cuts them into rows of raw field bytes. It recognizes:
//!
//! - a single-byte delimiter;
//! - an optional single-byte enclosure, only special at the start of a field,
//!   where a doubled enclosure stands for one literal enclosure byte;
//! - `\n`, `\r` and `\r\n` as row terminators.
//!
//! Fields are returned as raw bytes; interpreting them is up to the caller.
//! The tokenizer is deliberately forgiving: a missing closing enclosure ends
//! the row at end of data, rows with fewer fields than expected are returned
//! short, and surplus fields are dropped.

use crate::buffer::ByteWindow;
use memchr::{memchr, memchr2, memchr3};
use std::io::{self, Read};
use tracing::{trace, warn};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Byte-level CSV dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub enclosure: Option<u8>,
    /// When set, line terminators only end a row inside the last field.
    pub newline_possible_in_fields: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            enclosure: Some(b'"'),
            newline_possible_in_fields: false,
        }
    }
}

/// One row of raw, unescaped field bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Offset of the first byte of the row in the tokenized stream.
    pub offset: u64,
    /// At most as many fields as requested; fewer when the row was short.
    pub fields: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldEnd {
    Delimiter,
    Newline,
    Eof,
}

pub struct Tokenizer<R> {
    window: ByteWindow<R>,
    dialect: Dialect,
}

impl<R: Read> Tokenizer<R> {
    pub fn new(reader: R, dialect: Dialect, buffer_size: usize) -> Self {
        Self {
            window: ByteWindow::new(reader, buffer_size),
            dialect,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Bytes consumed from the stream so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.window.position()
    }

    /// Read the next row, keeping at most `field_count` fields.
    ///
    /// Blank lines are skipped. Returns `None` at end of data.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn read_row(&mut self, field_count: usize) -> io::Result<Option<RawRecord>> {
        self.read_record(field_count, self.dialect.newline_possible_in_fields)
    }

    /// Read the next row with every field it holds, ending at the first
    /// line terminator outside an enclosure.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn read_header_row(&mut self) -> io::Result<Option<RawRecord>> {
        self.read_record(usize::MAX, false)
    }

    fn read_record(&mut self, field_count: usize, newline_in_fields: bool) -> io::Result<Option<RawRecord>> {
        if !self.skip_blank_lines()? {
            return Ok(None);
        }

        let field_count = field_count.max(1);
        let offset = self.window.position();
        let mut fields = Vec::with_capacity(field_count.min(64));
        let mut end = FieldEnd::Delimiter;

        while fields.len() < field_count {
            let last = fields.len() + 1 == field_count;
            let newline_ends = last || !newline_in_fields;
            let (value, field_end) = self.read_field(newline_ends)?;
            fields.push(value);
            end = field_end;
            if end != FieldEnd::Delimiter {
                break;
            }
        }

        // Surplus fields: scan them so enclosed terminators are honoured, then drop.
        while end == FieldEnd::Delimiter {
            end = self.read_field(true)?.1;
        }

        self.window.mark();
        Ok(Some(RawRecord { offset, fields }))
    }

    /// Consume the next row without keeping it. Returns `false` at end of data.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn skip_row(&mut self, field_count: usize) -> io::Result<bool> {
        Ok(self.read_row(field_count)?.is_some())
    }

    /// Skip a UTF-8 byte-order mark under the cursor, if any.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn skip_bom(&mut self) -> io::Result<bool> {
        self.window.fill(UTF8_BOM.len())?;
        if self.window.available().starts_with(UTF8_BOM) {
            self.window.advance(UTF8_BOM.len());
            self.window.mark();
            return Ok(true);
        }
        Ok(false)
    }

    /// Skip line terminators under the cursor. Returns `false` when no data
    /// is left afterwards.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn skip_blank_lines(&mut self) -> io::Result<bool> {
        loop {
            match self.window.peek()? {
                Some(b'\n' | b'\r') => {
                    self.window.advance(1);
                    self.window.mark();
                }
                Some(_) => return Ok(true),
                None => return Ok(false),
            }
        }
    }

    /// Discard everything up to and including the next line terminator,
    /// ignoring enclosures. Returns `false` if the data ends first.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn skip_partial_row(&mut self) -> io::Result<bool> {
        loop {
            let available = self.window.available();
            match memchr2(b'\n', b'\r', available) {
                Some(i) => {
                    let cr = available[i] == b'\r';
                    self.window.advance(i + 1);
                    if cr && self.window.peek()? == Some(b'\n') {
                        self.window.advance(1);
                    }
                    self.window.mark();
                    return Ok(true);
                }
                None => {
                    let n = available.len();
                    self.window.advance(n);
                    self.window.mark();
                    if !self.window.refill()? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Discard up to `n` bytes. Returns how many were actually discarded.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn discard(&mut self, n: u64) -> io::Result<u64> {
        let mut remaining = n;
        while remaining > 0 {
            if self.window.available().is_empty() && !self.window.refill()? {
                break;
            }
            let step = usize::try_from(remaining)
                .unwrap_or(usize::MAX)
                .min(self.window.available().len());
            self.window.advance(step);
            self.window.mark();
            remaining -= step as u64;
        }
        Ok(n - remaining)
    }

    /// Consume and return the byte under the cursor.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying stream.
    pub fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.window.peek()?;
        if byte.is_some() {
            self.window.advance(1);
            self.window.mark();
        }
        Ok(byte)
    }

    /// Release the underlying stream. Safe to call more than once.
    pub fn close(&mut self) {
        self.window.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.window.is_closed()
    }

    fn read_field(&mut self, newline_ends: bool) -> io::Result<(Vec<u8>, FieldEnd)> {
        self.window.mark();

        let enclosure = match (self.window.peek()?, self.dialect.enclosure) {
            (None, _) => return Ok((Vec::new(), FieldEnd::Eof)),
            (Some(b), Some(enc)) if b == enc => Some(enc),
            _ => None,
        };

        let mut value = Vec::new();
        let mut tail_start = 0;

        if let Some(enc) = enclosure {
            self.window.advance(1);
            let (closed, escapes) = self.scan_enclosed(enc)?;
            let content_end = if closed {
                self.window.token_len() - 1
            } else {
                self.window.token_len()
            };

            let content = self.window.slice(1..content_end);
            if escapes > 0 {
                trace!(escapes, "collapsing escaped enclosures");
                value = remove_escapes(content, enc);
            } else {
                value.extend_from_slice(content);
            }

            if !closed {
                warn!(
                    offset = self.window.position(),
                    "unterminated enclosure, ending row at end of data"
                );
                return Ok((value, FieldEnd::Eof));
            }
            tail_start = content_end + 1;
        }

        let end = self.scan_unquoted(newline_ends)?;
        let len = self.window.token_len();
        value.extend_from_slice(self.window.slice(tail_start..len));
        self.consume_terminator(end)?;

        Ok((value, end))
    }

    /// Scan to just past the closing enclosure. Returns whether one was found
    /// and how many doubled enclosures were crossed.
    fn scan_enclosed(&mut self, enclosure: u8) -> io::Result<(bool, usize)> {
        let mut escapes = 0;
        loop {
            match memchr(enclosure, self.window.available()) {
                Some(i) => {
                    self.window.advance(i + 1);
                    if self.window.peek()? == Some(enclosure) {
                        self.window.advance(1);
                        escapes += 1;
                    } else {
                        return Ok((true, escapes));
                    }
                }
                None => {
                    let n = self.window.available().len();
                    self.window.advance(n);
                    if !self.window.refill()? {
                        return Ok((false, escapes));
                    }
                }
            }
        }
    }

    /// Scan to the next field terminator, leaving the cursor on it.
    fn scan_unquoted(&mut self, newline_ends: bool) -> io::Result<FieldEnd> {
        let delimiter = self.dialect.delimiter;
        loop {
            let available = self.window.available();
            let hit = if newline_ends {
                memchr3(delimiter, b'\n', b'\r', available)
            } else {
                memchr(delimiter, available)
            };

            match hit {
                Some(i) => {
                    let end = if available[i] == delimiter {
                        FieldEnd::Delimiter
                    } else {
                        FieldEnd::Newline
                    };
                    self.window.advance(i);
                    return Ok(end);
                }
                None => {
                    let n = available.len();
                    self.window.advance(n);
                    if !self.window.refill()? {
                        return Ok(FieldEnd::Eof);
                    }
                }
            }
        }
    }

    fn consume_terminator(&mut self, end: FieldEnd) -> io::Result<()> {
        match end {
            FieldEnd::Delimiter => self.window.advance(1),
            FieldEnd::Newline => {
                let cr = self.window.peek()? == Some(b'\r');
                self.window.advance(1);
                if cr && self.window.peek()? == Some(b'\n') {
                    self.window.advance(1);
                }
            }
            FieldEnd::Eof => {}
        }
        Ok(())
    }
}

/// Collapse every doubled `enclosure` byte into a single one.
#[must_use]
pub fn remove_escapes(bytes: &[u8], enclosure: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut rest = bytes;

    while let Some(i) = memchr(enclosure, rest) {
        out.extend_from_slice(&rest[..=i]);
        rest = &rest[i + 1..];
        if rest.first() == Some(&enclosure) {
            rest = &rest[1..];
        }
    }
    out.extend_from_slice(rest);

    out
}
