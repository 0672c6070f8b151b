//! Growable byte window over a blocking byte stream.
//!
//! The window keeps every byte from the start of the token being scanned up to
//! the furthest byte read from the stream. When it runs out of room, the
//! retained tail is moved to the front of a buffer sized for one more chunk,
//! so a token can be longer than the read-ahead size without being cut.

use std::io::{self, Read};
use std::ops::Range;

pub(crate) struct ByteWindow<R> {
    reader: Option<R>,
    buf: Vec<u8>,
    /// Start of the token being scanned.
    start: usize,
    /// Scan cursor.
    end: usize,
    /// Number of valid bytes in `buf`.
    limit: usize,
    chunk_size: usize,
    /// Stream offset of `buf[0]`.
    base: u64,
    eof: bool,
}

impl<R: Read> ByteWindow<R> {
    pub(crate) fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader: Some(reader),
            buf: Vec::new(),
            start: 0,
            end: 0,
            limit: 0,
            chunk_size: chunk_size.max(1),
            base: 0,
            eof: false,
        }
    }

    /// Make room for at least one more chunk after `limit`, keeping
    /// `buf[start..limit]`.
    fn ensure_capacity(&mut self) {
        if self.limit < self.buf.len() {
            return;
        }

        let retained = self.limit - self.start;
        if self.start > 0 {
            self.buf.copy_within(self.start..self.limit, 0);
            self.base += self.start as u64;
            self.end -= self.start;
            self.limit = retained;
            self.start = 0;
        }
        self.buf.resize(retained + self.chunk_size, 0);
    }

    /// Read the next chunk from the stream. Returns `false` at end of stream.
    pub(crate) fn refill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        self.ensure_capacity();

        let Some(reader) = self.reader.as_mut() else {
            self.eof = true;
            return Ok(false);
        };

        loop {
            match reader.read(&mut self.buf[self.limit..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.limit += n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Make sure at least `n` unscanned bytes are buffered, unless the stream
    /// ends first.
    pub(crate) fn fill(&mut self, n: usize) -> io::Result<bool> {
        while self.limit - self.end < n {
            if !self.refill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The byte under the cursor, refilling if needed.
    pub(crate) fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.end >= self.limit && !self.refill()? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.end]))
    }

    /// Buffered bytes not scanned yet.
    pub(crate) fn available(&self) -> &[u8] {
        &self.buf[self.end..self.limit]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.end + n <= self.limit);
        self.end += n;
    }

    /// Start a new token at the cursor.
    pub(crate) fn mark(&mut self) {
        self.start = self.end;
    }

    /// Bytes scanned since the last [`mark`](Self::mark).
    pub(crate) fn token_len(&self) -> usize {
        self.end - self.start
    }

    /// A slice of the current token, relative to its start.
    pub(crate) fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.buf[self.start + range.start..self.start + range.end]
    }

    /// Stream offset of the cursor.
    pub(crate) fn position(&self) -> u64 {
        self.base + self.end as u64
    }

    pub(crate) fn close(&mut self) {
        self.base = self.position();
        self.reader = None;
        self.eof = true;
        self.buf = Vec::new();
        self.start = 0;
        self.end = 0;
        self.limit = 0;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}
