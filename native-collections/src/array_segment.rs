//! Offset/count window over a borrowed slice.

use std::ops::{Deref, Index};
use std::slice;

use crate::CollectionError;

/// A `(array, offset, count)` view.
///
/// Unlike a plain sub-slice it remembers where it sits inside the backing
/// array, so protocol code can slice a segment further and still report
/// absolute offsets.
///
/// # Example
///
/// ```
/// use native_collections::ArraySegment;
///
/// let frame = [0u8, 1, 2, 3, 4, 5, 6, 7];
/// let body = ArraySegment::new(&frame, 2, 5).unwrap();
/// let tail = body.slice(3, 2).unwrap();
///
/// assert_eq!(tail.offset(), 5);
/// assert_eq!(tail.as_slice(), &[5, 6]);
/// assert!(body.slice(4, 2).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ArraySegment<'a, T> {
    array: &'a [T],
    offset: usize,
    count: usize,
}

impl<T> Clone for ArraySegment<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArraySegment<'_, T> {}

impl<T> Default for ArraySegment<'_, T> {
    fn default() -> Self {
        Self {
            array: &[],
            offset: 0,
            count: 0,
        }
    }
}

impl<'a, T> ArraySegment<'a, T> {
    /// Views `array[offset..offset + count]`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if the window does not fit.
    pub fn new(array: &'a [T], offset: usize, count: usize) -> Result<Self, CollectionError> {
        match offset.checked_add(count) {
            Some(end) if end <= array.len() => Ok(Self {
                array,
                offset,
                count,
            }),
            _ => Err(CollectionError::IndexOutOfRange {
                index: offset.saturating_add(count),
                len: array.len(),
            }),
        }
    }

    /// The whole backing array.
    #[inline]
    pub fn array(&self) -> &'a [T] {
        self.array
    }

    /// Start of the window within the backing array.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Elements in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the window is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The windowed elements.
    #[inline]
    pub fn as_slice(&self) -> &'a [T] {
        &self.array[self.offset..self.offset + self.count]
    }

    /// A narrower window `start..start + count` relative to this one.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if it does not fit inside this
    /// window.
    pub fn slice(&self, start: usize, count: usize) -> Result<Self, CollectionError> {
        match start.checked_add(count) {
            Some(end) if end <= self.count => Ok(Self {
                array: self.array,
                offset: self.offset + start,
                count,
            }),
            _ => Err(CollectionError::IndexOutOfRange {
                index: start.saturating_add(count),
                len: self.count,
            }),
        }
    }

    /// The window from `start` to its end.
    ///
    /// # Errors
    ///
    /// [`CollectionError::IndexOutOfRange`] if `start` is past the end.
    pub fn slice_from(&self, start: usize) -> Result<Self, CollectionError> {
        if start > self.count {
            return Err(CollectionError::IndexOutOfRange {
                index: start,
                len: self.count,
            });
        }
        self.slice(start, self.count - start)
    }

    /// Iterates the windowed elements.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'a, T> {
        self.as_slice().iter()
    }
}

impl<'a, T> From<&'a [T]> for ArraySegment<'a, T> {
    fn from(array: &'a [T]) -> Self {
        Self {
            array,
            offset: 0,
            count: array.len(),
        }
    }
}

impl<T> Deref for ArraySegment<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> Index<usize> for ArraySegment<'_, T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `index >= len()`.
    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<'a, T> IntoIterator for ArraySegment<'a, T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}
