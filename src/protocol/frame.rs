//! Fixed-capacity frame assembly and disassembly buffer.
//!
//! A [`FrameBuffer`] owns a byte vector with two independent cursors: a write
//! cursor tracking how much has been appended and a read cursor tracking how
//! much has been consumed. The invariant `read ≤ write ≤ capacity` always
//! holds. The buffer never reallocates; callers size it up front to fit the
//! frame they intend to build or parse.

use super::endian::WireInt;

/// Errors from frame buffer accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A write would exceed the buffer's fixed capacity.
    #[error("write exceeds frame capacity")]
    Overflow,
    /// A read would pass the written extent of the buffer.
    #[error("read past end of frame")]
    Truncated,
    /// A field decoded to a value outside its closed set.
    #[error("invalid field value")]
    Invalid,
}

/// Append/consume byte buffer with independent read and write cursors.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    read: usize,
    write: usize,
}

impl FrameBuffer {
    /// Allocates an empty buffer of the given capacity; both cursors at zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            read: 0,
            write: 0,
        }
    }

    /// Allocates a buffer sized to `bytes`, write cursor at the end.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    /// Wraps an owned vector; its full length counts as written.
    #[must_use]
    pub fn from_vec(buf: Vec<u8>) -> Self {
        let write = buf.len();
        Self {
            buf,
            read: 0,
            write,
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.write
    }

    /// True if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.write == 0
    }

    /// Number of written bytes not yet consumed by the read cursor.
    #[must_use]
    pub fn unread(&self) -> usize {
        self.write - self.read
    }

    /// The written portion of the buffer.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.write]
    }

    /// Moves the write cursor, clamped to capacity.
    pub fn set_write_cursor(&mut self, position: usize) {
        self.write = position.min(self.capacity());
        self.read = self.read.min(self.write);
    }

    /// Moves the read cursor, clamped to the written extent.
    pub fn set_read_cursor(&mut self, position: usize) {
        self.read = position.min(self.write);
    }

    /// Appends an integer in network byte order.
    pub fn put<V: WireInt>(&mut self, value: V) -> Result<(), FrameError> {
        if self.write + V::WIDTH > self.capacity() {
            return Err(FrameError::Overflow);
        }
        value.put(&mut self.buf[self.write..]);
        self.write += V::WIDTH;
        Ok(())
    }

    /// Appends a boolean as a single byte.
    pub fn put_bool(&mut self, value: bool) -> Result<(), FrameError> {
        self.put(u8::from(value))
    }

    /// Appends raw bytes without any length prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if self.write + bytes.len() > self.capacity() {
            return Err(FrameError::Overflow);
        }
        self.buf[self.write..self.write + bytes.len()].copy_from_slice(bytes);
        self.write += bytes.len();
        Ok(())
    }

    /// Appends a string as a one-byte length followed by its bytes.
    ///
    /// Strings longer than 255 bytes do not fit the length prefix and are
    /// rejected as [`FrameError::Overflow`].
    pub fn put_string8(&mut self, value: &str) -> Result<(), FrameError> {
        let Ok(len) = u8::try_from(value.len()) else {
            return Err(FrameError::Overflow);
        };
        if self.write + 1 + value.len() > self.capacity() {
            return Err(FrameError::Overflow);
        }
        self.put(len)?;
        self.put_bytes(value.as_bytes())
    }

    /// Consumes an integer in network byte order.
    ///
    /// On a short read the cursor is left undisturbed.
    pub fn take<V: WireInt>(&mut self) -> Result<V, FrameError> {
        if self.read + V::WIDTH > self.write {
            return Err(FrameError::Truncated);
        }
        let value = V::get(&self.buf[self.read..]);
        self.read += V::WIDTH;
        Ok(value)
    }

    /// Consumes one byte as a boolean; any non-zero value reads as true.
    pub fn take_bool(&mut self) -> Result<bool, FrameError> {
        Ok(self.take::<u8>()? != 0)
    }

    /// Consumes `count` raw bytes.
    pub fn take_bytes(&mut self, count: usize) -> Result<&[u8], FrameError> {
        if self.read + count > self.write {
            return Err(FrameError::Truncated);
        }
        let bytes = &self.buf[self.read..self.read + count];
        self.read += count;
        Ok(bytes)
    }

    /// Consumes a one-byte length followed by that many bytes.
    ///
    /// If the bytes fall short the read cursor is rewound past the length
    /// prefix as well.
    pub fn take_string8(&mut self) -> Result<String, FrameError> {
        let len = usize::from(self.take::<u8>()?);
        if self.read + len > self.write {
            self.read -= 1;
            return Err(FrameError::Truncated);
        }
        let value = String::from_utf8_lossy(&self.buf[self.read..self.read + len]).into_owned();
        self.read += len;
        Ok(value)
    }
}
