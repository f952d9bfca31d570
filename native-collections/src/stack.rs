//! LIFO stack over a raw buffer.

use std::fmt;
use std::iter::Rev;
use std::ptr;
use std::slice;

use native_pool::RawBuffer;

use crate::cursor::{Cursor, Cursored};
use crate::list::grown_capacity;
use crate::CollectionError;

/// A growable last-in first-out stack.
///
/// # Example
///
/// ```
/// use native_collections::Stack;
///
/// let mut stack = Stack::with_capacity(2);
/// stack.push(1);
/// stack.push(2);
/// assert_eq!(stack.try_push(3), Err(3));
///
/// assert_eq!(stack.peek(), Ok(&2));
/// assert_eq!(stack.pop(), Ok(2));
/// assert_eq!(stack.try_pop(), Some(1));
/// assert!(stack.pop().is_err());
/// ```
pub struct Stack<T> {
    buf: RawBuffer<T>,
    len: usize,
    version: u32,
}

// SAFETY: the stack uniquely owns its elements
unsafe impl<T: Send> Send for Stack<T> {}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Stack<T> {
    /// Creates an empty stack without allocating.
    pub const fn new() -> Self {
        Self {
            buf: RawBuffer::new(),
            len: 0,
            version: 0,
        }
    }

    /// Creates an empty stack with room for `capacity` elements.
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

    /// Returns `true` if the stack holds no elements.
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

    #[inline]
    fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized
        unsafe { slice::from_raw_parts(self.buf.as_ptr(), self.len) }
    }

    /// Pushes `item`, growing if needed.
    #[inline]
    pub fn push(&mut self, item: T) {
        if self.len == self.buf.capacity() {
            self.grow(self.len + 1);
        }
        // SAFETY: len < capacity
        unsafe { self.buf.slot(self.len).write(item) };
        self.len += 1;
        self.version = self.version.wrapping_add(1);
    }

    /// Pushes `item` only if it fits without growing; hands it back otherwise.
    #[inline]
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        if self.len == self.buf.capacity() {
            return Err(item);
        }
        // SAFETY: len < capacity
        unsafe { self.buf.slot(self.len).write(item) };
        self.len += 1;
        self.version = self.version.wrapping_add(1);
        Ok(())
    }

    #[cold]
    fn grow(&mut self, needed: usize) {
        let capacity = grown_capacity(self.buf.capacity(), needed);
        // SAFETY: growing keeps every live element
        unsafe { self.buf.resize(capacity) };
    }

    /// Removes and returns the top element.
    pub fn pop(&mut self) -> Result<T, CollectionError> {
        self.try_pop().ok_or(CollectionError::EmptyStack)
    }

    /// Removes and returns the top element, if any.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        self.version = self.version.wrapping_add(1);
        // SAFETY: slot `len` was the initialized top
        Some(unsafe { self.buf.slot(self.len).read() })
    }

    /// The top element.
    pub fn peek(&self) -> Result<&T, CollectionError> {
        self.try_peek().ok_or(CollectionError::EmptyStack)
    }

    /// The top element, if any.
    #[inline]
    pub fn try_peek(&self) -> Option<&T> {
        self.as_slice().last()
    }

    /// Returns `true` if an element equals `item`.
    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.as_slice().contains(item)
    }

    /// Grows so that at least `capacity` elements fit. Returns the capacity.
    pub fn ensure_capacity(&mut self, capacity: usize) -> usize {
        if capacity > self.buf.capacity() {
            self.grow(capacity);
        }
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

    /// Drops every element. Capacity is kept.
    pub fn clear(&mut self) {
        let len = self.len;
        self.len = 0;
        // SAFETY: the first `len` slots were initialized
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.buf.as_ptr(), len)) };
        self.version = self.version.wrapping_add(1);
    }

    /// Iterates from top to bottom.
    pub fn iter(&self) -> Rev<slice::Iter<'_, T>> {
        self.as_slice().iter().rev()
    }

    /// A detached, version-checked cursor walking top to bottom.
    pub fn cursor(&self) -> Cursor<Self> {
        Cursor::new(self)
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        // SAFETY: the first `len` slots are initialized
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.buf.as_ptr(), self.len));
        }
    }
}

impl<T> Extend<T> for Stack<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a Stack<T> {
    type Item = &'a T;
    type IntoIter = Rev<slice::Iter<'a, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Cursored for Stack<T> {
    type Item<'a>
        = &'a T
    where
        Self: 'a;
    /// Count of elements not yet yielded.
    type Position = usize;

    fn version(&self) -> u32 {
        self.version
    }

    fn start(&self) -> usize {
        self.len
    }

    fn advance<'a>(&'a self, remaining: &mut usize) -> Option<&'a T> {
        *remaining = remaining.checked_sub(1)?;
        self.as_slice().get(*remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo() {
        let mut s = Stack::new();
        for i in 0..100 {
            s.push(i);
        }
        assert_eq!(s.len(), 100);
        assert_eq!(s.iter().copied().take(3).collect::<Vec<_>>(), vec![99, 98, 97]);
        for i in (0..100).rev() {
            assert_eq!(s.pop(), Ok(i));
        }
        assert_eq!(s.pop(), Err(CollectionError::EmptyStack));
        assert_eq!(s.peek(), Err(CollectionError::EmptyStack));
        assert_eq!(s.try_peek(), None);
    }

    #[test]
    fn try_push_never_grows() {
        let mut s = Stack::new();
        assert_eq!(s.try_push(1), Err(1));
        assert_eq!(s.ensure_capacity(3), 4);
        for i in 0..4 {
            assert_eq!(s.try_push(i), Ok(()));
        }
        assert_eq!(s.try_push(9), Err(9));
        assert_eq!(s.capacity(), 4);
    }

    #[test]
    fn contains_and_clear() {
        let mut s = Stack::new();
        s.extend(["a".to_string(), "b".to_string()]);
        assert!(s.contains(&"a".to_string()));
        assert!(!s.contains(&"z".to_string()));
        s.clear();
        assert!(s.is_empty());
        s.trim_excess();
        assert_eq!(s.capacity(), 0);
    }

    #[test]
    fn cursor_top_to_bottom() {
        let mut s = Stack::new();
        s.extend([1, 2, 3]);
        let mut c = s.cursor();
        assert_eq!(c.next(&s), Ok(Some(&3)));
        assert_eq!(c.next(&s), Ok(Some(&2)));
        assert_eq!(c.next(&s), Ok(Some(&1)));
        assert_eq!(c.next(&s), Ok(None));

        let mut c = s.cursor();
        s.pop().unwrap();
        assert_eq!(c.next(&s), Err(CollectionError::VersionChanged));
    }
}
