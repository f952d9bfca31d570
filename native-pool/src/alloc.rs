//! Raw allocation over the process allocator.
//!
//! Every container in this workspace allocates through [`RawAllocator`].
//! Allocation failure is fatal: it routes to [`handle_alloc_error`] and never
//! surfaces as a recoverable error.

use std::alloc::{Layout, alloc, alloc_zeroed, dealloc, handle_alloc_error, realloc};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

/// Largest element count any growable buffer in this workspace will reach.
pub const MAX_ARRAY_LENGTH: usize = 2_147_483_591;

/// Thin wrapper over the process allocator.
///
/// Zero-sized layouts never touch the allocator: they produce a dangling,
/// well-aligned pointer and freeing them is a no-op.
pub struct RawAllocator;

impl RawAllocator {
    /// Allocates uninitialized memory for `layout`.
    #[inline]
    pub fn alloc(layout: Layout) -> NonNull<u8> {
        if layout.size() == 0 {
            return dangling(layout);
        }
        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
    }

    /// Allocates zero-filled memory for `layout`.
    #[inline]
    pub fn alloc_zeroed(layout: Layout) -> NonNull<u8> {
        if layout.size() == 0 {
            return dangling(layout);
        }
        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
    }

    /// Resizes an allocation, preserving its first `min(old, new)` bytes.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with layout `old`, and `new_size`
    /// rounded up to `old.align()` must not overflow `isize`.
    pub unsafe fn realloc(ptr: NonNull<u8>, old: Layout, new_size: usize) -> NonNull<u8> {
        let new = unsafe { Layout::from_size_align_unchecked(new_size, old.align()) };
        if old.size() == 0 {
            return Self::alloc(new);
        }
        if new_size == 0 {
            unsafe { Self::free(ptr, old) };
            return dangling(new);
        }
        // SAFETY: caller guarantees ptr/old pair, sizes are non-zero
        let raw = unsafe { realloc(ptr.as_ptr(), old, new_size) };
        NonNull::new(raw).unwrap_or_else(|| handle_alloc_error(new))
    }

    /// Releases memory obtained from [`alloc`](Self::alloc) or
    /// [`alloc_zeroed`](Self::alloc_zeroed).
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator with `layout` and not
    /// freed since.
    #[inline]
    pub unsafe fn free(ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            unsafe { dealloc(ptr.as_ptr(), layout) }
        }
    }
}

#[inline]
fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: align is never zero
    unsafe { NonNull::new_unchecked(layout.align() as *mut u8) }
}

#[cold]
#[inline(never)]
fn capacity_overflow() -> ! {
    panic!("capacity overflow")
}

// =============================================================================
// RawBuffer
// =============================================================================

/// Typed, growable backing store: a pointer and a capacity.
///
/// `RawBuffer` never tracks which elements are initialized. The owning
/// container does, and must drop its live elements before the buffer goes
/// away. Dropping the buffer only releases memory.
pub struct RawBuffer<T> {
    ptr: NonNull<T>,
    cap: usize,
    _marker: PhantomData<T>,
}

// SAFETY: RawBuffer is a unique owner of its allocation
unsafe impl<T: Send> Send for RawBuffer<T> {}
unsafe impl<T: Sync> Sync for RawBuffer<T> {}

impl<T> RawBuffer<T> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// Creates an empty buffer without allocating.
    pub const fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap: if Self::IS_ZST { usize::MAX } else { 0 },
            _marker: PhantomData,
        }
    }

    /// Allocates room for exactly `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::allocate(capacity, false)
    }

    /// Allocates room for exactly `capacity` elements, zero-filled.
    pub fn with_capacity_zeroed(capacity: usize) -> Self {
        Self::allocate(capacity, true)
    }

    fn allocate(capacity: usize, zeroed: bool) -> Self {
        if Self::IS_ZST || capacity == 0 {
            return Self::new();
        }
        let layout = Self::layout(capacity);
        let ptr = if zeroed {
            RawAllocator::alloc_zeroed(layout)
        } else {
            RawAllocator::alloc(layout)
        };
        Self {
            ptr: ptr.cast(),
            cap: capacity,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn layout(capacity: usize) -> Layout {
        Layout::array::<T>(capacity).unwrap_or_else(|_| capacity_overflow())
    }

    /// Number of elements the buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Pointer to the first element slot.
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Pointer to the element slot at `index`.
    ///
    /// # Safety
    ///
    /// `index <= capacity`.
    #[inline]
    pub unsafe fn slot(&self, index: usize) -> *mut T {
        debug_assert!(index <= self.cap);
        unsafe { self.ptr.as_ptr().add(index) }
    }

    /// Reallocates to exactly `new_capacity` slots, keeping the first
    /// `min(capacity, new_capacity)` slots' contents.
    ///
    /// # Safety
    ///
    /// Any initialized elements past `new_capacity` must already have been
    /// dropped or moved out by the caller.
    pub unsafe fn resize(&mut self, new_capacity: usize) {
        if Self::IS_ZST || new_capacity == self.cap {
            return;
        }
        if new_capacity == 0 {
            unsafe { self.release() };
            return;
        }
        let new_layout = Self::layout(new_capacity);
        let ptr = if self.cap == 0 {
            RawAllocator::alloc(new_layout)
        } else {
            // SAFETY: ptr was allocated with layout(cap); new size came from a valid layout
            unsafe { RawAllocator::realloc(self.ptr.cast(), Self::layout(self.cap), new_layout.size()) }
        };
        self.ptr = ptr.cast();
        self.cap = new_capacity;
    }

    /// Fills slots `[from, to)` with zero bytes.
    ///
    /// # Safety
    ///
    /// `from <= to <= capacity` and the range holds no live elements.
    #[inline]
    pub unsafe fn zero_range(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to && to <= self.cap);
        unsafe { self.ptr.as_ptr().add(from).write_bytes(0, to - from) }
    }

    unsafe fn release(&mut self) {
        if !Self::IS_ZST && self.cap != 0 {
            unsafe { RawAllocator::free(self.ptr.cast(), Self::layout(self.cap)) };
        }
        self.ptr = NonNull::dangling();
        self.cap = if Self::IS_ZST { usize::MAX } else { 0 };
    }
}

impl<T> Default for RawBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RawBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: the owner has dropped every live element
        unsafe { self.release() }
    }
}
