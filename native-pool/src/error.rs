use std::fmt;

/// Error returned by pool construction and by pool rent/return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// A construction or call argument is out of range.
    InvalidArgument {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: usize,
        /// What the value must satisfy.
        reason: &'static str,
    },
    /// The returned buffer is not one this pool has outstanding.
    BufferNotFromPool,
    /// The requested length exceeds the pool's largest size class.
    LengthExceeded {
        /// Requested minimum length.
        requested: usize,
        /// Largest length the pool serves.
        max: usize,
    },
    /// No free block is large enough for the request.
    Exhausted {
        /// Requested length in bytes.
        requested: usize,
    },
}

impl PoolError {
    /// Builds a [`PoolError::InvalidArgument`] error.
    pub const fn invalid(name: &'static str, value: usize, reason: &'static str) -> Self {
        PoolError::InvalidArgument {
            name,
            value,
            reason,
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::InvalidArgument {
                name,
                value,
                reason,
            } => write!(f, "invalid {name} ({value}): {reason}"),
            PoolError::BufferNotFromPool => write!(f, "buffer was not rented from this pool"),
            PoolError::LengthExceeded { requested, max } => {
                write!(f, "requested length {requested} exceeds pool maximum {max}")
            }
            PoolError::Exhausted { requested } => {
                write!(f, "no free block of {requested} bytes left in the pool")
            }
        }
    }
}

impl std::error::Error for PoolError {}
