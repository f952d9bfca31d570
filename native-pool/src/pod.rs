/// Marker for plain-old-data element types.
///
/// Pooled arrays hand out memory that was zero-filled when its slab was
/// created and may hold stale values from a previous renter afterwards, so
/// every bit pattern, including all zeros, must be a valid `Self`.
///
/// # Safety
///
/// Implementors must be inhabited by every bit pattern of their size, contain
/// no padding that is read, and need no drop.
///
/// # Example
///
/// ```rust
/// use native_pool::Pod;
///
/// #[derive(Clone, Copy)]
/// #[repr(C)]
/// struct Sample {
///     tick: u64,
///     value: f64,
/// }
///
/// // SAFETY: two 8-byte fields, no padding, any bits are valid
/// unsafe impl Pod for Sample {}
/// ```
pub unsafe trait Pod: Copy + 'static {
    /// Compile-time check that the type needs no drop.
    const _ASSERT_NO_DROP: () = {
        assert!(
            !std::mem::needs_drop::<Self>(),
            "Pod types must not require drop"
        );
    };
}

macro_rules! impl_pod {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl Pod for $t {})*
    };
}

impl_pod!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
);

unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}
