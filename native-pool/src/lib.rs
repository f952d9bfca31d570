//! native-pool - Raw memory primitives for the native collections.
//!
//! Everything here allocates outside the reach of any garbage collector or
//! reference counting: memory is taken from the process allocator, handed out
//! as raw blocks, and given back explicitly.
//!
//! - [`RawAllocator`] / [`RawBuffer`]: allocation, reallocation and zeroing.
//! - [`MemoryPool`]: slab allocator of fixed-length blocks with a bounded
//!   cache of free slabs. [`NodePool`] is its typed view for intrusive nodes.
//! - [`MemoryBucket`]: bounded cache of spare blocks in front of a memory pool.
//! - [`BuddyMemoryPool`]: power-of-two blocks split from and merged back into
//!   one region.
//! - [`ArrayPool`] / [`ConcurrentArrayPool`]: power-of-two size-class pools
//!   of [`Pod`] arrays, one [`MemoryBucket`] per class.
//! - [`SpinLock`]: FIFO ticket lock with an optional sleep threshold.
//!
//! # Example
//!
//! ```
//! use native_pool::{ArrayPool, MemoryPool};
//!
//! let mut pool = MemoryPool::new(64, 32, 1).unwrap();
//! let block = pool.rent();
//! unsafe { pool.return_block(block) };
//!
//! let arrays = ArrayPool::<f64>::new(4, 4096).unwrap();
//! let mut samples = arrays.rent(1000).unwrap();
//! assert_eq!(samples.len(), 1024);
//! samples[0] = 1.5;
//! arrays.return_array(samples).unwrap();
//! ```

#![warn(missing_docs)]

mod alloc;
mod array_pool;
mod buddy_pool;
mod error;
mod memory_bucket;
mod memory_pool;
mod pod;
mod spin_lock;

pub use alloc::{MAX_ARRAY_LENGTH, RawAllocator, RawBuffer};
pub use array_pool::{
    ArrayPool, ConcurrentArrayPool, MAX_POOLED_LENGTH, MIN_POOLED_LENGTH, PooledArray,
};
pub use buddy_pool::BuddyMemoryPool;
pub use error::PoolError;
pub use memory_bucket::MemoryBucket;
pub use memory_pool::{MemoryPool, MemoryPoolBuilder, NodePool};
pub use pod::Pod;
pub use spin_lock::{SpinLock, SpinLockGuard};
