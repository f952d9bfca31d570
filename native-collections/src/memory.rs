//! Bounded cursors that read and write plain-old-data values over byte
//! slices.
//!
//! Values are copied unaligned in native byte order. Every operation checks
//! the remaining room first and leaves the position untouched on failure.

use std::mem::size_of;
use std::ptr;

use native_pool::Pod;

use crate::CollectionError;

#[inline]
fn seek(position: usize, len: usize, count: isize) -> Result<usize, CollectionError> {
    match position.checked_add_signed(count) {
        Some(target) if target <= len => Ok(target),
        Some(target) => Err(CollectionError::BufferTooSmall {
            needed: target - position,
            remaining: len - position,
        }),
        None => Err(CollectionError::invalid(
            "count",
            count.unsigned_abs(),
            "moves before the start of the buffer",
        )),
    }
}

#[inline]
fn check(position: usize, len: usize, needed: usize) -> Result<(), CollectionError> {
    let remaining = len - position;
    if needed > remaining {
        return Err(CollectionError::BufferTooSmall { needed, remaining });
    }
    Ok(())
}

/// Byte view of a `Pod` slice.
#[inline]
fn pod_bytes<T: Pod>(values: &[T]) -> &[u8] {
    // SAFETY: Pod values have no padding, so every byte is initialized
    unsafe { std::slice::from_raw_parts(values.as_ptr().cast(), size_of::<T>() * values.len()) }
}

// =============================================================================
// MemoryReader
// =============================================================================

/// Forward cursor reading values out of a byte slice.
///
/// # Example
///
/// ```
/// use native_collections::{MemoryReader, MemoryWriter};
///
/// let mut buf = [0u8; 16];
/// let mut writer = MemoryWriter::new(&mut buf);
/// writer.write(7u32).unwrap();
/// writer.write(2.5f64).unwrap();
///
/// let mut reader = MemoryReader::new(writer.as_slice());
/// assert_eq!(reader.read::<u32>(), Ok(7));
/// assert_eq!(reader.read::<f64>(), Ok(2.5));
/// assert_eq!(reader.remaining(), 0);
/// assert!(reader.try_read::<u8>().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct MemoryReader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> MemoryReader<'a> {
    /// Starts reading at the first byte of `buf`.
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, position: 0 }
    }

    /// Offset of the next byte to read.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    /// Total length of the underlying slice.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if the underlying slice is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The unread bytes.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.position..]
    }

    /// Moves the position by `count` bytes, backwards when negative.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] past the end,
    /// [`CollectionError::InvalidArgument`] before the start.
    pub fn advance(&mut self, count: isize) -> Result<(), CollectionError> {
        self.position = seek(self.position, self.buf.len(), count)?;
        Ok(())
    }

    /// [`advance`](Self::advance) reporting failure as `false`.
    pub fn try_advance(&mut self, count: isize) -> bool {
        self.advance(count).is_ok()
    }

    /// Reads one `T`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] if fewer than `size_of::<T>()`
    /// bytes remain.
    pub fn read<T: Pod>(&mut self) -> Result<T, CollectionError> {
        check(self.position, self.buf.len(), size_of::<T>())?;
        // SAFETY: bounds checked above and any bit pattern is a valid Pod
        let value = unsafe { ptr::read_unaligned(self.buf.as_ptr().add(self.position).cast::<T>()) };
        self.position += size_of::<T>();
        Ok(value)
    }

    /// Reads one `T`, or `None` if it does not fit.
    #[inline]
    pub fn try_read<T: Pod>(&mut self) -> Option<T> {
        self.read().ok()
    }

    /// Fills `values` from consecutive bytes.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] if the slice does not fit.
    pub fn read_slice<T: Pod>(&mut self, values: &mut [T]) -> Result<(), CollectionError> {
        let needed = size_of::<T>() * values.len();
        check(self.position, self.buf.len(), needed)?;
        // SAFETY: bounds checked above, destination is a distinct slice of
        // Pod values
        unsafe {
            ptr::copy_nonoverlapping(
                self.buf.as_ptr().add(self.position),
                values.as_mut_ptr().cast::<u8>(),
                needed,
            );
        }
        self.position += needed;
        Ok(())
    }

    /// Copies `buf.len()` bytes into `buf`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] if fewer bytes remain.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), CollectionError> {
        self.read_slice(buf)
    }

    /// [`read_bytes`](Self::read_bytes) reporting failure as `false`.
    pub fn try_read_bytes(&mut self, buf: &mut [u8]) -> bool {
        self.read_bytes(buf).is_ok()
    }
}

// =============================================================================
// MemoryWriter
// =============================================================================

/// Forward cursor writing values into a fixed byte slice.
#[derive(Debug)]
pub struct MemoryWriter<'a> {
    buf: &'a mut [u8],
    position: usize,
}

impl<'a> MemoryWriter<'a> {
    /// Starts writing at the first byte of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, position: 0 }
    }

    /// Offset of the next byte to write, which is also the written length.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to write.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    /// The bytes written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.position]
    }

    /// The bytes written so far, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.position]
    }

    /// A reader over the bytes written so far.
    #[inline]
    pub fn reader(&self) -> MemoryReader<'_> {
        MemoryReader::new(self.as_slice())
    }

    /// Rewinds to the first byte. Contents are left in place.
    #[inline]
    pub fn clear(&mut self) {
        self.position = 0;
    }

    /// Moves the position by `count` bytes, backwards when negative. Bytes
    /// skipped over keep their previous contents.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] past the end,
    /// [`CollectionError::InvalidArgument`] before the start.
    pub fn advance(&mut self, count: isize) -> Result<(), CollectionError> {
        self.position = seek(self.position, self.buf.len(), count)?;
        Ok(())
    }

    /// [`advance`](Self::advance) reporting failure as `false`.
    pub fn try_advance(&mut self, count: isize) -> bool {
        self.advance(count).is_ok()
    }

    /// Writes one `T`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] if fewer than `size_of::<T>()`
    /// bytes remain.
    pub fn write<T: Pod>(&mut self, value: T) -> Result<(), CollectionError> {
        self.write_slice(std::slice::from_ref(&value))
    }

    /// [`write`](Self::write) reporting failure as `false`.
    #[inline]
    pub fn try_write<T: Pod>(&mut self, value: T) -> bool {
        self.write(value).is_ok()
    }

    /// Writes every element of `values` back to back.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] if the slice does not fit.
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> Result<(), CollectionError> {
        self.write_bytes(pod_bytes(values))
    }

    /// Copies `bytes` in.
    ///
    /// # Errors
    ///
    /// [`CollectionError::BufferTooSmall`] if `bytes` does not fit.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CollectionError> {
        check(self.position, self.buf.len(), bytes.len())?;
        let end = self.position + bytes.len();
        self.buf[self.position..end].copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    /// [`write_bytes`](Self::write_bytes) reporting failure as `false`.
    pub fn try_write_bytes(&mut self, bytes: &[u8]) -> bool {
        self.write_bytes(bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(C)]
    struct Header {
        id: u32,
        flags: u32,
        stamp: u64,
    }

    // SAFETY: three integer fields, no padding
    unsafe impl Pod for Header {}

    #[test]
    fn structs_round_trip_unaligned() {
        let mut buf = [0u8; 64];
        let mut writer = MemoryWriter::new(&mut buf);
        writer.write(0xABu8).unwrap();
        let header = Header {
            id: 9,
            flags: 3,
            stamp: u64::MAX - 1,
        };
        writer.write(header).unwrap();
        writer.write_slice(&[1u16, 2, 3]).unwrap();
        assert_eq!(writer.position(), 1 + 16 + 6);

        let mut reader = writer.reader();
        assert_eq!(reader.read::<u8>(), Ok(0xAB));
        assert_eq!(reader.read::<Header>(), Ok(header));
        let mut tail = [0u16; 3];
        reader.read_slice(&mut tail).unwrap();
        assert_eq!(tail, [1, 2, 3]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn overruns_leave_position_alone() {
        let mut buf = [0u8; 6];
        let mut writer = MemoryWriter::new(&mut buf);
        writer.write(1u32).unwrap();
        assert_eq!(
            writer.write(2u32),
            Err(CollectionError::BufferTooSmall {
                needed: 4,
                remaining: 2
            })
        );
        assert!(!writer.try_write_bytes(&[0; 3]));
        assert!(writer.try_write(5u16));
        assert_eq!(writer.remaining(), 0);

        let mut reader = MemoryReader::new(&buf);
        assert!(reader.try_read::<u64>().is_none());
        assert_eq!(reader.position(), 0);
        let mut out = [0u8; 7];
        assert!(!reader.try_read_bytes(&mut out));
        assert_eq!(reader.rest().len(), 6);
    }

    #[test]
    fn advance_both_ways() {
        let data = [1u8, 2, 3, 4];
        let mut reader = MemoryReader::new(&data);
        reader.advance(3).unwrap();
        assert_eq!(reader.read::<u8>(), Ok(4));
        assert!(reader.try_advance(-2));
        assert_eq!(reader.read::<u8>(), Ok(3));
        assert!(matches!(
            reader.advance(-4),
            Err(CollectionError::InvalidArgument { name: "count", .. })
        ));
        assert_eq!(
            reader.advance(2),
            Err(CollectionError::BufferTooSmall {
                needed: 2,
                remaining: 1
            })
        );

        let mut buf = [9u8; 4];
        let mut writer = MemoryWriter::new(&mut buf);
        writer.advance(2).unwrap();
        writer.write_bytes(&[0]).unwrap();
        assert_eq!(writer.as_slice(), &[9, 9, 0]);
        writer.clear();
        assert!(writer.as_slice().is_empty());
    }
}
