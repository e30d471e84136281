//! Bounds-checked cursor over untrusted handshake bytes.
//!
//! Every accessor is a "try" accessor: when fewer bytes remain than the field
//! requires, it returns `None` and leaves the cursor exactly where it was.
//! Nothing in this module can panic on any input, which is the whole point —
//! the bytes come straight off the wire from unauthenticated peers.

/// Width of the little-endian `i32` length prefix on blobs and strings.
const LENGTH_PREFIX_SIZE: usize = 4;

/// A cursor over an owned copy of a byte slice.
///
/// Invariant: `0 <= position <= len`. Accessors either advance the cursor by
/// exactly the field's width or leave it unchanged and return `None`.
/// Instances are meant to be rented from a [`crate::pool::Pool`] per
/// handshake parse and released afterwards.
#[derive(Debug, Default)]
pub struct ByteReader {
    data: Vec<u8>,
    position: usize,
}

impl ByteReader {
    /// Creates an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reader over a copy of `source`.
    #[must_use]
    pub fn from_source(source: &[u8]) -> Self {
        let mut reader = Self::new();
        reader.set_source(source);
        reader
    }

    /// Replaces the contents with a copy of `source` and rewinds the cursor.
    pub fn set_source(&mut self, source: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(source);
        self.position = 0;
    }

    /// Resets to an empty source for pool reuse.
    pub fn clear(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes remaining between the cursor and the end of the source.
    #[must_use]
    pub fn available_bytes(&self) -> usize {
        self.data.len() - self.position
    }

    /// Advances the cursor, clamped to the end of the source.
    pub fn skip_bytes(&mut self, count: usize) {
        self.position = self.position.saturating_add(count).min(self.data.len());
    }

    /// Consumes `width` bytes, or returns `None` without moving the cursor.
    fn take(&mut self, width: usize) -> Option<&[u8]> {
        if self.available_bytes() < width {
            return None;
        }
        let start = self.position;
        self.position += width;
        Some(&self.data[start..start + width])
    }

    /// Reads one byte.
    pub fn try_get_byte(&mut self) -> Option<u8> {
        self.take(1).map(|bytes| bytes[0])
    }

    /// Reads one byte as a boolean (any nonzero value is `true`).
    pub fn try_get_bool(&mut self) -> Option<bool> {
        self.try_get_byte().map(|byte| byte != 0)
    }

    /// Reads a little-endian signed 32-bit integer.
    pub fn try_get_i32(&mut self) -> Option<i32> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Some(i32::from_le_bytes(buf))
    }

    /// Reads a little-endian signed 64-bit integer.
    pub fn try_get_i64(&mut self) -> Option<i64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(i64::from_le_bytes(buf))
    }

    /// Peeks the 4-byte length prefix at the cursor without consuming it.
    fn peek_length(&self) -> Option<i32> {
        if self.available_bytes() < LENGTH_PREFIX_SIZE {
            return None;
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[self.position..self.position + LENGTH_PREFIX_SIZE]);
        Some(i32::from_le_bytes(buf))
    }

    /// Reads a length-prefixed byte blob.
    ///
    /// The length is validated before anything is consumed: a negative length
    /// or one exceeding the remaining bytes yields `None` with the cursor
    /// untouched, so a single corrupted prefix cannot desynchronize or
    /// over-read the buffer.
    pub fn try_get_bytes_with_length(&mut self) -> Option<Vec<u8>> {
        let length = self.peek_length()?;
        if length < 0 {
            return None;
        }
        let length = length as usize;
        if length > self.available_bytes() - LENGTH_PREFIX_SIZE {
            return None;
        }
        self.position += LENGTH_PREFIX_SIZE;
        self.take(length).map(<[u8]>::to_vec)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// A length of zero or less decodes as the empty string (consuming only
    /// the prefix). Invalid UTF-8 is replaced, never rejected.
    pub fn try_get_string(&mut self) -> Option<String> {
        let length = self.peek_length()?;
        if length <= 0 {
            self.position += LENGTH_PREFIX_SIZE;
            return Some(String::new());
        }
        let length = length as usize;
        if length > self.available_bytes() - LENGTH_PREFIX_SIZE {
            return None;
        }
        self.position += LENGTH_PREFIX_SIZE;
        self.take(length)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}
