//! Growable in-memory byte stream.

use std::fmt;
use std::io;

use native_pool::{MAX_ARRAY_LENGTH, RawBuffer};

use crate::CollectionError;

const MIN_GROWTH: usize = 256;

/// Reference point for [`MemoryStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Offset from the first byte.
    Begin,
    /// Offset from the current position.
    Current,
    /// Offset from the end of the written data.
    End,
}

/// A byte stream over a single growable buffer.
///
/// The stream has a length (bytes written) and a position that may lie past
/// the length. Writing at such a position first zero-fills the gap. Reads
/// stop at the length.
///
/// Implements [`io::Read`], [`io::Write`] and [`io::Seek`], so it can sit
/// under any serializer that speaks `std::io`.
///
/// # Example
///
/// ```
/// use native_collections::{MemoryStream, SeekOrigin};
///
/// let mut stream = MemoryStream::new();
/// stream.write(b"hello").unwrap();
/// stream.seek(-5, SeekOrigin::Current).unwrap();
///
/// let mut buf = [0u8; 5];
/// assert_eq!(stream.read(&mut buf), 5);
/// assert_eq!(&buf, b"hello");
/// assert_eq!(stream.read_byte(), None);
/// ```
pub struct MemoryStream {
    buf: RawBuffer<u8>,
    len: usize,
    position: usize,
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStream {
    /// Creates an empty stream without allocating.
    pub const fn new() -> Self {
        Self {
            buf: RawBuffer::new(),
            len: 0,
            position: 0,
        }
    }

    /// Creates an empty stream with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: RawBuffer::with_capacity(capacity),
            len: 0,
            position: 0,
        }
    }

    /// Bytes written.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that fit before the buffer is reallocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Current read/write position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the position. It may lie past the length.
    #[inline]
    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Written bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the first len bytes are initialized
        unsafe { std::slice::from_raw_parts(self.buf.as_ptr(), self.len) }
    }

    /// Written bytes, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the first len bytes are initialized
        unsafe { std::slice::from_raw_parts_mut(self.buf.as_ptr(), self.len) }
    }

    /// Sets the capacity exactly.
    ///
    /// # Errors
    ///
    /// [`CollectionError::CapacityTooSmall`] below the length.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), CollectionError> {
        if capacity < self.len {
            return Err(CollectionError::CapacityTooSmall {
                capacity,
                len: self.len,
            });
        }
        // SAFETY: bytes need no drop and every written byte fits
        unsafe { self.buf.resize(capacity) };
        Ok(())
    }

    /// Truncates or extends the stream. Extension zero-fills. The position
    /// is clamped to the new length.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] beyond the maximum stream length.
    pub fn set_len(&mut self, len: usize) -> Result<(), CollectionError> {
        if len > MAX_ARRAY_LENGTH {
            return Err(CollectionError::invalid("len", len, "exceeds the maximum stream length"));
        }
        self.reserve(len);
        if len > self.len {
            // SAFETY: len <= capacity after reserve
            unsafe { self.buf.zero_range(self.len, len) };
        }
        self.len = len;
        self.position = self.position.min(len);
        Ok(())
    }

    /// Moves the position relative to `origin`. Returns the new position.
    ///
    /// # Errors
    ///
    /// [`CollectionError::SeekBeforeBegin`] if the target is negative,
    /// [`CollectionError::InvalidArgument`] past the maximum stream length.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<usize, CollectionError> {
        let base = match origin {
            SeekOrigin::Begin => 0,
            SeekOrigin::Current => self.position,
            SeekOrigin::End => self.len,
        };
        let target = base as i128 + offset as i128;
        if target < 0 {
            return Err(CollectionError::SeekBeforeBegin);
        }
        if target > MAX_ARRAY_LENGTH as i128 {
            return Err(CollectionError::invalid(
                "offset",
                offset.unsigned_abs() as usize,
                "exceeds the maximum stream length",
            ));
        }
        self.position = target as usize;
        Ok(self.position)
    }

    /// Copies up to `buf.len()` bytes from the position into `buf`.
    /// Returns the number copied, zero at or past the end.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let available = self.len.saturating_sub(self.position);
        let n = available.min(buf.len());
        if n == 0 {
            return 0;
        }
        buf[..n].copy_from_slice(&self.as_slice()[self.position..self.position + n]);
        self.position += n;
        n
    }

    /// Reads one byte, or `None` at the end.
    #[inline]
    pub fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.as_slice().get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    /// Writes `bytes` at the position, growing the stream as needed.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] if the stream would exceed the
    /// maximum stream length. Nothing is written in that case.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), CollectionError> {
        let end = self.extend_to(bytes.len())?;
        // SAFETY: extend_to made [position, end) part of the buffer
        unsafe {
            self.buf
                .slot(self.position)
                .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        }
        self.position = end;
        Ok(())
    }

    /// Writes one byte at the position.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    #[inline]
    pub fn write_byte(&mut self, byte: u8) -> Result<(), CollectionError> {
        let end = self.extend_to(1)?;
        // SAFETY: position < end <= capacity
        unsafe { self.buf.slot(self.position).write(byte) };
        self.position = end;
        Ok(())
    }

    /// Forgets every written byte and rewinds. Capacity is kept.
    pub fn clear(&mut self) {
        self.len = 0;
        self.position = 0;
    }

    /// Makes `[position, position + count)` writable and returns its end.
    fn extend_to(&mut self, count: usize) -> Result<usize, CollectionError> {
        let end = match self.position.checked_add(count) {
            Some(end) if end <= MAX_ARRAY_LENGTH => end,
            _ => {
                return Err(CollectionError::invalid(
                    "count",
                    count,
                    "exceeds the maximum stream length",
                ));
            }
        };
        if end > self.len {
            self.reserve(end);
            if self.position > self.len {
                // SAFETY: position < end <= capacity
                unsafe { self.buf.zero_range(self.len, self.position) };
            }
            self.len = end;
        }
        Ok(end)
    }

    fn reserve(&mut self, needed: usize) {
        let capacity = self.buf.capacity();
        if needed <= capacity {
            return;
        }
        let grown = MIN_GROWTH
            .max(needed)
            .max(capacity.saturating_mul(2).min(MAX_ARRAY_LENGTH));
        log::trace!("memory stream growing from {capacity} to {grown} bytes");
        // SAFETY: growing keeps every written byte
        unsafe { self.buf.resize(grown) };
    }
}

impl io::Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(MemoryStream::read(self, buf))
    }
}

impl io::Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        MemoryStream::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for MemoryStream {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, origin) = match pos {
            io::SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                SeekOrigin::Begin,
            ),
            io::SeekFrom::Current(n) => (n, SeekOrigin::Current),
            io::SeekFrom::End(n) => (n, SeekOrigin::End),
        };
        Ok(MemoryStream::seek(self, offset, origin)? as u64)
    }
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStream")
            .field("len", &self.len)
            .field("position", &self.position)
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}
