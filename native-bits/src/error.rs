//! Error types for bit array operations.

use core::fmt;

/// Bitwise operands have different bit lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    /// Bit length of the receiver.
    pub left: usize,
    /// Bit length of the operand.
    pub right: usize,
}

impl fmt::Display for LengthMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bit array lengths differ: {} vs {}",
            self.left, self.right
        )
    }
}

impl std::error::Error for LengthMismatch {}

/// Bit index at or past the array length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRange {
    /// The index that was accessed.
    pub index: usize,
    /// Bit length of the array.
    pub len: usize,
}

impl fmt::Display for IndexOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bit index {} out of range for length {}", self.index, self.len)
    }
}

impl std::error::Error for IndexOutOfRange {}
