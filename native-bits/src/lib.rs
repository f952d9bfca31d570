//! Bitwise kernels and a packed bit array.
//!
//! `native-bits` provides the word-level AND/OR/XOR/NOT kernels used by
//! [`BitArray`], vectorized with AVX2 or SSE2 when the CPU has them.
//!
//! # Example
//!
//! ```
//! use native_bits::{BitArray, ops};
//!
//! let mut words = [0xF0F0_F0F0u32; 16];
//! ops::and(&mut words, &[0xFF00_FF00; 16]);
//! assert_eq!(words[15], 0xF000_F000);
//!
//! let mut flags = BitArray::new(1000, false);
//! flags.set(999, true).unwrap();
//! flags.left_shift(1);
//! assert!(!flags.has_any_set());
//! ```

#![warn(missing_docs)]

mod bit_array;
mod error;
pub mod ops;

pub use bit_array::{BitArray, Iter};
pub use error::{IndexOutOfRange, LengthMismatch};
