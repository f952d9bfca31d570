//! Growable array of bits packed into `u32` words.

use std::fmt;
use std::iter::FusedIterator;
use std::slice;

use native_pool::RawBuffer;

use crate::error::{IndexOutOfRange, LengthMismatch};
use crate::ops;

/// Shrinking by more than this many words reallocates the backing buffer.
const SHRINK_SLACK: usize = 256;

#[inline]
const fn words_for(bits: usize) -> usize {
    bits.div_ceil(32)
}

/// Mask of the valid bits in the last word, or `None` if it is full.
#[inline]
const fn tail_mask(bits: usize) -> Option<u32> {
    match bits % 32 {
        0 => None,
        extra => Some((1 << extra) - 1),
    }
}

/// A fixed-length but resizable sequence of bits.
///
/// Bit `i` lives in word `i / 32` at position `i % 32`. Bits past the length
/// in the last word are always zero, so [`as_words`](Self::as_words) can be
/// handed to other word kernels as is.
///
/// # Example
///
/// ```
/// use native_bits::BitArray;
///
/// let mut a = BitArray::new(100, false);
/// let mut b = BitArray::new(100, true);
/// a.set(3, true).unwrap();
///
/// b.and(&a).unwrap();
/// assert_eq!(b.count_ones(), 1);
/// assert_eq!(b.get(3), Some(true));
///
/// b.not();
/// assert_eq!(b.count_ones(), 99);
/// ```
pub struct BitArray {
    words: RawBuffer<u32>,
    len: usize,
    version: u32,
}

impl BitArray {
    /// Creates an array of `len` bits, all set to `value`.
    pub fn new(len: usize, value: bool) -> Self {
        let mut array = Self {
            words: RawBuffer::with_capacity_zeroed(words_for(len)),
            len,
            version: 0,
        };
        if value {
            array.fill(true);
        }
        array
    }

    /// Creates an array of `len` bits backed by a copy of `words`.
    ///
    /// Fails if `words` holds fewer than `len` bits. Bits past `len` are
    /// cleared.
    pub fn from_words(words: &[u32], len: usize) -> Result<Self, LengthMismatch> {
        if words.len() * 32 < len {
            return Err(LengthMismatch {
                left: len,
                right: words.len() * 32,
            });
        }
        let mut array = Self::new(len, false);
        let n = words_for(len);
        array.words_mut().copy_from_slice(&words[..n]);
        array.mask_tail();
        Ok(array)
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array holds no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mutation counter, bumped by every write.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The words holding the bits, `ceil(len / 32)` of them.
    #[inline]
    pub fn as_words(&self) -> &[u32] {
        // SAFETY: the first words_for(len) words are initialized
        unsafe { slice::from_raw_parts(self.words.as_ptr(), words_for(self.len)) }
    }

    #[inline]
    fn words_mut(&mut self) -> &mut [u32] {
        // SAFETY: the first words_for(len) words are initialized
        unsafe { slice::from_raw_parts_mut(self.words.as_ptr(), words_for(self.len)) }
    }

    #[inline]
    fn mask_tail(&mut self) {
        if let Some(mask) = tail_mask(self.len) {
            if let Some(last) = self.words_mut().last_mut() {
                *last &= mask;
            }
        }
    }

    /// Returns bit `index`, or `None` if out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.as_words()[index >> 5] & (1 << (index & 31)) != 0)
    }

    /// Sets bit `index` to `value`.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) -> Result<(), IndexOutOfRange> {
        if index >= self.len {
            return Err(IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        let mask = 1 << (index & 31);
        let word = &mut self.words_mut()[index >> 5];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Sets every bit to `value`.
    pub fn set_all(&mut self, value: bool) {
        self.fill(value);
        self.version = self.version.wrapping_add(1);
    }

    fn fill(&mut self, value: bool) {
        self.words_mut().fill(if value { u32::MAX } else { 0 });
        self.mask_tail();
    }

    /// Changes the length to `len` bits.
    ///
    /// Bits gained by growing are zero. The buffer is reallocated only when
    /// it must grow, or when it would keep more than 256 unused words.
    pub fn set_len(&mut self, len: usize) {
        let needed = words_for(len);
        let cap = self.words.capacity();
        if needed > cap || needed + SHRINK_SLACK < cap {
            log::debug!("bit array: reallocating {cap} -> {needed} words");
            // SAFETY: u32 needs no drop; new slots are zeroed below
            unsafe {
                self.words.resize(needed);
                if needed > cap {
                    self.words.zero_range(cap, needed);
                }
            }
        }

        if len > self.len {
            let old = self.len;
            let start = words_for(old);
            // SAFETY: start <= needed <= capacity; u32 has no drop
            unsafe { self.words.zero_range(start, needed) };
            self.len = len;
            if let Some(mask) = tail_mask(old) {
                self.words_mut()[start - 1] &= mask;
            }
        } else {
            self.len = len;
            self.mask_tail();
        }
        self.version = self.version.wrapping_add(1);
    }

    fn check_len(&self, other: &BitArray) -> Result<(), LengthMismatch> {
        if self.len != other.len {
            return Err(LengthMismatch {
                left: self.len,
                right: other.len,
            });
        }
        Ok(())
    }

    /// `self &= other`.
    pub fn and(&mut self, other: &BitArray) -> Result<&mut Self, LengthMismatch> {
        self.check_len(other)?;
        ops::and(self.words_mut(), other.as_words());
        self.version = self.version.wrapping_add(1);
        Ok(self)
    }

    /// `self |= other`.
    pub fn or(&mut self, other: &BitArray) -> Result<&mut Self, LengthMismatch> {
        self.check_len(other)?;
        ops::or(self.words_mut(), other.as_words());
        self.version = self.version.wrapping_add(1);
        Ok(self)
    }

    /// `self ^= other`.
    pub fn xor(&mut self, other: &BitArray) -> Result<&mut Self, LengthMismatch> {
        self.check_len(other)?;
        ops::xor(self.words_mut(), other.as_words());
        self.version = self.version.wrapping_add(1);
        Ok(self)
    }

    /// Inverts every bit.
    pub fn not(&mut self) -> &mut Self {
        ops::not(self.words_mut());
        self.mask_tail();
        self.version = self.version.wrapping_add(1);
        self
    }

    /// Shifts bits toward index 0: bit `i` takes the value of bit
    /// `i + count`; the top `count` bits become zero.
    pub fn right_shift(&mut self, count: usize) -> &mut Self {
        if count == 0 {
            return self;
        }
        let len = self.len;
        let words = self.words_mut();
        let n = words.len();
        let mut kept = 0;
        if count < len {
            let skip = count >> 5;
            let shift = count & 31;
            kept = n - skip;
            if shift == 0 {
                words.copy_within(skip.., 0);
            } else {
                for i in 0..kept - 1 {
                    words[i] = (words[i + skip] >> shift) | (words[i + skip + 1] << (32 - shift));
                }
                words[kept - 1] = words[n - 1] >> shift;
            }
        }
        words[kept..].fill(0);
        self.version = self.version.wrapping_add(1);
        self
    }

    /// Shifts bits away from index 0: bit `i` takes the value of bit
    /// `i - count`; the low `count` bits become zero.
    pub fn left_shift(&mut self, count: usize) -> &mut Self {
        if count == 0 {
            return self;
        }
        let len = self.len;
        let words = self.words_mut();
        let n = words.len();
        let cleared = if count < len {
            let skip = count >> 5;
            let shift = count & 31;
            if shift == 0 {
                words.copy_within(..n - skip, skip);
            } else {
                for i in (skip + 1..n).rev() {
                    words[i] = (words[i - skip] << shift) | (words[i - skip - 1] >> (32 - shift));
                }
                words[skip] = words[0] << shift;
            }
            skip
        } else {
            n
        };
        words[..cleared].fill(0);
        self.mask_tail();
        self.version = self.version.wrapping_add(1);
        self
    }

    /// Returns `true` if every bit is set. Vacuously true when empty.
    pub fn has_all_set(&self) -> bool {
        let words = self.as_words();
        match tail_mask(self.len) {
            None => words.iter().all(|w| *w == u32::MAX),
            Some(mask) => {
                let (last, full) = match words.split_last() {
                    Some(split) => split,
                    None => return true,
                };
                full.iter().all(|w| *w == u32::MAX) && *last & mask == mask
            }
        }
    }

    /// Returns `true` if any bit is set.
    pub fn has_any_set(&self) -> bool {
        self.as_words().iter().any(|w| *w != 0)
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.as_words().iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over the bits from index 0.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: self.as_words(),
            index: 0,
            len: self.len,
        }
    }
}

impl fmt::Debug for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitArray[{}](", self.len)?;
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        f.write_str(")")
    }
}

impl<'a> IntoIterator for &'a BitArray {
    type Item = bool;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Iterator over the bits of a [`BitArray`].
#[derive(Clone)]
pub struct Iter<'a> {
    words: &'a [u32],
    index: usize,
    len: usize,
}

impl Iterator for Iter<'_> {
    type Item = bool;

    #[inline]
    fn next(&mut self) -> Option<bool> {
        if self.index >= self.len {
            return None;
        }
        let bit = self.words[self.index >> 5] & (1 << (self.index & 31)) != 0;
        self.index += 1;
        Some(bit)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len - self.index;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Iter<'_> {}
impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_masks_tail() {
        let a = BitArray::new(40, true);
        assert_eq!(a.as_words(), &[u32::MAX, 0xFF]);
        assert!(a.has_all_set());
        assert_eq!(a.count_ones(), 40);
    }

    #[test]
    fn empty_array() {
        let a = BitArray::new(0, true);
        assert!(a.is_empty());
        assert!(a.as_words().is_empty());
        assert!(a.has_all_set());
        assert!(!a.has_any_set());
        assert_eq!(a.iter().count(), 0);
    }

    #[test]
    fn get_set_bounds() {
        let mut a = BitArray::new(33, false);
        assert!(a.set(32, true).is_ok());
        assert_eq!(a.get(32), Some(true));
        assert_eq!(a.get(33), None);
        assert_eq!(
            a.set(33, true),
            Err(IndexOutOfRange { index: 33, len: 33 })
        );
    }

    #[test]
    fn version_tracks_writes() {
        let mut a = BitArray::new(8, false);
        let v = a.version();
        a.set(1, true).unwrap();
        assert_ne!(a.version(), v);
        let v = a.version();
        let _ = a.get(1);
        assert_eq!(a.version(), v);
    }

    #[test]
    fn grow_clears_new_bits() {
        let mut a = BitArray::new(10, true);
        a.set_len(5);
        a.set_len(70);
        assert_eq!(a.count_ones(), 5);
        assert_eq!(a.as_words().len(), 3);
        assert!((5..70).all(|i| a.get(i) == Some(false)));
    }

    #[test]
    fn large_shrink_reallocates() {
        let mut a = BitArray::new(32 * 1000, true);
        a.set_len(32 * 10);
        assert_eq!(a.words.capacity(), 10);
        assert_eq!(a.count_ones(), 320);

        let mut b = BitArray::new(32 * 100, true);
        b.set_len(32 * 10);
        assert_eq!(b.words.capacity(), 100);
    }

    #[test]
    fn shifts_match_reference() {
        let pattern: Vec<bool> = (0..77).map(|i| (i * 7) % 5 < 2).collect();
        for count in [0, 1, 5, 31, 32, 33, 64, 70, 76, 77, 200] {
            let mut a = BitArray::new(pattern.len(), false);
            for (i, bit) in pattern.iter().enumerate() {
                a.set(i, *bit).unwrap();
            }
            let mut b = BitArray::from_words(a.as_words(), a.len()).unwrap();

            a.right_shift(count);
            let want: Vec<bool> = (0..pattern.len())
                .map(|i| pattern.get(i + count).copied().unwrap_or(false))
                .collect();
            assert_eq!(a.iter().collect::<Vec<_>>(), want, "right {count}");

            b.left_shift(count);
            let want: Vec<bool> = (0..pattern.len())
                .map(|i| i >= count && pattern[i - count])
                .collect();
            assert_eq!(b.iter().collect::<Vec<_>>(), want, "left {count}");
        }
    }

    #[test]
    fn from_words_checks_length() {
        assert_eq!(
            BitArray::from_words(&[1], 33).unwrap_err(),
            LengthMismatch { left: 33, right: 32 }
        );
        let a = BitArray::from_words(&[u32::MAX, u32::MAX], 36).unwrap();
        assert_eq!(a.as_words(), &[u32::MAX, 0xF]);
    }
}
