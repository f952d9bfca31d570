//! Growable contiguous list over a raw buffer.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::ptr;
use std::slice;

use native_pool::{MAX_ARRAY_LENGTH, RawBuffer};

use crate::cursor::{Cursor, Cursored};
use crate::CollectionError;

/// Capacity after growing `capacity` to hold at least `needed` elements:
/// `max(2 * capacity, capacity + 4, needed)`, with the doubling capped at
/// [`MAX_ARRAY_LENGTH`].
#[inline]
pub(crate) fn grown_capacity(capacity: usize, needed: usize) -> usize {
    let doubled = capacity.saturating_mul(2).min(MAX_ARRAY_LENGTH);
    doubled.max(capacity + 4).max(needed)
}

/// A growable array with explicit capacity control.
///
/// Elements live contiguously in a [`RawBuffer`]. Every structural change
/// (insertion, removal, reordering, clear) bumps [`version`](Self::version).
///
/// # Example
///
/// ```
/// use native_collections::List;
///
/// let mut list = List::with_capacity(4);
/// list.extend_from_slice(&[1, 2, 3]);
/// list.insert(0, 0).unwrap();
/// assert_eq!(list.as_slice(), &[0, 1, 2, 3]);
///
/// assert_eq!(list.remove_at(1), Ok(1));
/// list.reverse();
/// assert_eq!(list.as_slice(), &[3, 2, 0]);
/// ```
pub struct List<T> {
    buf: RawBuffer<T>,
    len: usize,
    version: u32,
}

// SAFETY: the list uniquely owns its elements
unsafe impl<T: Send> Send for List<T> {}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> List<T> {
    /// Creates an empty list without allocating.
    pub const fn new() -> Self {
        Self {
            buf: RawBuffer::new(),
            len: 0,
            version: 0,
        }
    }

    /// Creates an empty list with room for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: RawBuffer::with_capacity(capacity),
            len: 0,
            version: 0,
        }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated element slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Structural modification counter.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The elements as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized
        unsafe { slice::from_raw_parts(self.buf.as_ptr(), self.len) }
    }

    /// The elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: the first `len` slots are initialized
        unsafe { slice::from_raw_parts_mut(self.buf.as_ptr(), self.len) }
    }

    /// Pointer to the backing buffer.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.buf.as_ptr()
    }

    /// Element at `index`, if in range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Mutable element at `index`, if in range.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// Iterates front to back.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterates front to back with mutable access.
    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// A detached, version-checked cursor.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }

    // ========================================================================
    // Capacity
    // ========================================================================

    #[inline]
    fn reserve_for(&mut self, needed: usize) {
        if needed > self.buf.capacity() {
            let capacity = grown_capacity(self.buf.capacity(), needed);
            // SAFETY: growing keeps every live element
            unsafe { self.buf.resize(capacity) };
        }
    }

    /// Sets the capacity exactly. Fails if `capacity` is below the length.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), CollectionError> {
        if capacity < self.len {
            return Err(CollectionError::CapacityTooSmall {
                capacity,
                len: self.len,
            });
        }
        // SAFETY: no live element lies past `capacity`
        unsafe { self.buf.resize(capacity) };
        Ok(())
    }

    /// Grows so that at least `capacity` elements fit. Returns the capacity.
    pub fn ensure_capacity(&mut self, capacity: usize) -> usize {
        self.reserve_for(capacity);
        self.buf.capacity()
    }

    /// Shrinks to the length when less than 90% of the capacity is used.
    pub fn trim_excess(&mut self) {
        let threshold = (self.buf.capacity() as f64 * 0.9) as usize;
        if self.len < threshold {
            // SAFETY: shrinking to len keeps every live element
            unsafe { self.buf.resize(self.len) };
        }
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Appends an element.
    #[inline]
    pub fn push(&mut self, item: T) {
        self.reserve_for(self.len + 1);
        // SAFETY: len < capacity
        unsafe { self.buf.slot(self.len).write(item) };
        self.len += 1;
        self.version = self.version.wrapping_add(1);
    }

    /// Inserts `item` at `index`, shifting later elements right.
    pub fn insert(&mut self, index: usize, item: T) -> Result<(), CollectionError> {
        if index > self.len {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        self.reserve_for(self.len + 1);
        // SAFETY: index <= len < capacity
        unsafe {
            let at = self.buf.slot(index);
            ptr::copy(at, at.add(1), self.len - index);
            at.write(item);
        }
        self.len += 1;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Removes and returns the element at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T, CollectionError> {
        if index >= self.len {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        self.len -= 1;
        // SAFETY: index was < old len
        let item = unsafe {
            let at = self.buf.slot(index);
            let item = at.read();
            ptr::copy(at.add(1), at, self.len - index);
            item
        };
        self.version = self.version.wrapping_add(1);
        Ok(item)
    }

    /// Removes `count` elements starting at `index`.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<(), CollectionError> {
        let end = self.check_range(index, count)?;
        if count == 0 {
            return Ok(());
        }
        let old_len = self.len;
        // Shrink first so a panicking destructor leaks rather than double-drops
        self.len = index;
        // SAFETY: [index, end) is initialized and in range
        unsafe {
            let at = self.buf.slot(index);
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(at, count));
            ptr::copy(self.buf.slot(end), at, old_len - end);
        }
        self.len = old_len - count;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Removes the first element equal to `item`. Returns whether one was
    /// found.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        match self.index_of(item) {
            Some(index) => {
                drop(self.remove_at(index));
                true
            }
            None => false,
        }
    }

    /// Drops every element. Capacity is kept.
    pub fn clear(&mut self) {
        let len = self.len;
        self.len = 0;
        // SAFETY: the first `len` slots were initialized
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.buf.as_ptr(), len)) };
        self.version = self.version.wrapping_add(1);
    }

    #[inline]
    fn check_range(&self, index: usize, count: usize) -> Result<usize, CollectionError> {
        match index.checked_add(count) {
            Some(end) if end <= self.len => Ok(end),
            _ => Err(CollectionError::IndexOutOfRange {
                index: index.saturating_add(count),
                len: self.len,
            }),
        }
    }

    // ========================================================================
    // Reordering and search
    // ========================================================================

    /// Reverses the whole list.
    pub fn reverse(&mut self) {
        self.as_mut_slice().reverse();
        self.version = self.version.wrapping_add(1);
    }

    /// Reverses `count` elements starting at `index`.
    pub fn reverse_range(&mut self, index: usize, count: usize) -> Result<(), CollectionError> {
        let end = self.check_range(index, count)?;
        self.as_mut_slice()[index..end].reverse();
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    /// Returns `true` if an element equals `item`.
    #[inline]
    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.as_slice().contains(item)
    }

    /// Index of the first element equal to `item`.
    pub fn index_of(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.iter().position(|x| x == item)
    }

    /// Index of the last element equal to `item`.
    pub fn last_index_of(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.iter().rposition(|x| x == item)
    }
}

impl<T: Clone> List<T> {
    /// Appends clones of every element of `items`.
    pub fn extend_from_slice(&mut self, items: &[T]) {
        self.reserve_for(self.len + items.len());
        for item in items {
            // SAFETY: capacity reserved above
            unsafe { self.buf.slot(self.len).write(item.clone()) };
            self.len += 1;
        }
        self.version = self.version.wrapping_add(1);
    }

    /// Inserts clones of `items` at `index`, shifting later elements right.
    pub fn insert_from_slice(&mut self, index: usize, items: &[T]) -> Result<(), CollectionError> {
        if index > self.len {
            return Err(CollectionError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        let count = items.len();
        self.reserve_for(self.len + count);
        let tail = self.len - index;
        // SAFETY: capacity for len + count reserved; the gap is filled before
        // len covers it again
        unsafe {
            let at = self.buf.slot(index);
            ptr::copy(at, at.add(count), tail);
            // Hide the shifted tail while cloning so a panic leaks it instead
            self.len = index;
            for (i, item) in items.iter().enumerate() {
                at.add(i).write(item.clone());
            }
        }
        self.len = index + count + tail;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }
}

impl<T> Drop for List<T> {
    fn drop(&mut self) {
        // SAFETY: the first `len` slots are initialized
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.buf.as_ptr(), self.len));
        }
    }
}

impl<T> Index<usize> for List<T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T> IndexMut<usize> for List<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<T> Extend<T> for List<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve_for(self.len + iter.size_hint().0);
        for item in iter {
            self.push(item);
        }
    }
}

impl<T> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = List::new();
        list.extend(iter);
        list
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Cursored for List<T> {
    type Item<'a>
        = &'a T
    where
        Self: 'a;
    type Position = usize;

    fn version(&self) -> u32 {
        self.version
    }

    fn start(&self) -> usize {
        0
    }

    fn advance<'a>(&'a self, position: &mut usize) -> Option<&'a T> {
        let item = self.get(*position)?;
        *position += 1;
        Some(item)
    }
}
