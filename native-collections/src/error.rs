//! Error type shared by every collection in this crate.

use std::fmt;

/// Errors returned by collection operations.
///
/// Only "must succeed" operations return these. Their `try_*` counterparts
/// report failure through `Option` or `bool` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectionError {
    /// A call argument is out of range.
    InvalidArgument {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: usize,
        /// What the value must satisfy.
        reason: &'static str,
    },
    /// An index or range lies outside the collection.
    IndexOutOfRange {
        /// Offending index (or range end).
        index: usize,
        /// Current length.
        len: usize,
    },
    /// `add` found an equal key already present.
    DuplicateKey,
    /// A lookup that must succeed found nothing.
    KeyNotFound,
    /// Dequeue or peek on an empty queue.
    EmptyQueue,
    /// Pop or peek on an empty stack.
    EmptyStack,
    /// Operation requires at least one element.
    EmptyCollection,
    /// The collection was structurally modified after the cursor was created.
    VersionChanged,
    /// A hash chain walk exceeded the entry count, meaning the table was
    /// corrupted by unsynchronized access.
    ConcurrentOperationsNotSupported,
    /// Seek to a position before the start of the stream.
    SeekBeforeBegin,
    /// Not enough bytes left in the buffer.
    BufferTooSmall {
        /// Bytes the operation needs.
        needed: usize,
        /// Bytes left.
        remaining: usize,
    },
    /// Requested capacity is smaller than the current length.
    CapacityTooSmall {
        /// Requested capacity.
        capacity: usize,
        /// Current length.
        len: usize,
    },
}

impl CollectionError {
    pub(crate) const fn invalid(name: &'static str, value: usize, reason: &'static str) -> Self {
        CollectionError::InvalidArgument {
            name,
            value,
            reason,
        }
    }
}

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionError::InvalidArgument {
                name,
                value,
                reason,
            } => write!(f, "invalid {name} ({value}): {reason}"),
            CollectionError::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            CollectionError::DuplicateKey => write!(f, "an item with the same key already exists"),
            CollectionError::KeyNotFound => write!(f, "key not found"),
            CollectionError::EmptyQueue => write!(f, "queue is empty"),
            CollectionError::EmptyStack => write!(f, "stack is empty"),
            CollectionError::EmptyCollection => write!(f, "collection is empty"),
            CollectionError::VersionChanged => {
                write!(f, "collection was modified; enumeration cannot continue")
            }
            CollectionError::ConcurrentOperationsNotSupported => {
                write!(f, "hash chain is cyclic; concurrent mutation is not supported")
            }
            CollectionError::SeekBeforeBegin => {
                write!(f, "attempted to seek before the beginning of the stream")
            }
            CollectionError::BufferTooSmall { needed, remaining } => {
                write!(f, "buffer too small: need {needed} bytes, {remaining} left")
            }
            CollectionError::CapacityTooSmall { capacity, len } => {
                write!(f, "capacity {capacity} is less than length {len}")
            }
        }
    }
}

impl std::error::Error for CollectionError {}

impl From<CollectionError> for std::io::Error {
    fn from(err: CollectionError) -> Self {
        let kind = match err {
            CollectionError::SeekBeforeBegin | CollectionError::InvalidArgument { .. } => {
                std::io::ErrorKind::InvalidInput
            }
            CollectionError::BufferTooSmall { .. } => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            CollectionError::IndexOutOfRange { index: 5, len: 3 }.to_string(),
            "index 5 out of range for length 3"
        );
        assert_eq!(
            CollectionError::invalid("capacity", 0, "must be non-zero").to_string(),
            "invalid capacity (0): must be non-zero"
        );
        assert_eq!(CollectionError::KeyNotFound.to_string(), "key not found");
    }

    #[test]
    fn converts_to_io_error() {
        let err: std::io::Error = CollectionError::SeekBeforeBegin.into();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
