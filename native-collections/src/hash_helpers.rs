//! Prime sizing and fast modulo for the hash tables.
//!
//! Bucket counts are primes so that a weak hash still spreads across buckets.
//! The bucket index is computed with a precomputed 64-bit reciprocal instead
//! of a hardware division.

use std::hash::{BuildHasher, Hash};

/// Largest prime below the maximum array length.
pub const MAX_PRIME_ARRAY_LENGTH: usize = 0x7FFF_FFC3;

/// Primes `p` with `(p - 1) % HASH_PRIME == 0` are skipped when searching
/// past the table.
pub const HASH_PRIME: usize = 101;

/// Precomputed bucket sizes, each roughly 1.2x the previous.
pub const PRIMES: [usize; 72] = [
    3, 7, 11, 17, 23, 29, 37, 47, 59, 71, 89, 107, 131, 163, 197, 239, 293, 353, 431, 521, 631, 761,
    919, 1103, 1327, 1597, 1931, 2333, 2801, 3371, 4049, 4861, 5839, 7013, 8419, 10103, 12143,
    14591, 17519, 21023, 25229, 30293, 36353, 43627, 52361, 62851, 75431, 90523, 108631, 130363,
    156437, 187751, 225307, 270371, 324449, 389357, 467237, 560689, 672827, 807403, 968897,
    1162687, 1395263, 1674319, 2009191, 2411033, 2893249, 3471899, 4166287, 4999559, 5999471,
    7199369,
];

/// Trial-division primality test.
pub fn is_prime(candidate: usize) -> bool {
    if candidate & 1 == 0 {
        return candidate == 2;
    }
    let limit = candidate.isqrt();
    let mut divisor = 3;
    while divisor <= limit {
        if candidate % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    candidate != 1
}

/// Smallest usable prime `>= min`.
pub fn get_prime(min: usize) -> usize {
    if let Some(&prime) = PRIMES.iter().find(|&&p| p >= min) {
        return prime;
    }
    let mut i = min | 1;
    while i < i32::MAX as usize {
        if is_prime(i) && (i - 1) % HASH_PRIME != 0 {
            return i;
        }
        i += 2;
    }
    min
}

/// Next table size when growing from `old_size`: the prime after
/// `2 * old_size`, or [`MAX_PRIME_ARRAY_LENGTH`] once that is exceeded.
pub fn expand_prime(old_size: usize) -> usize {
    let new_size = old_size.saturating_mul(2);
    if new_size > MAX_PRIME_ARRAY_LENGTH && MAX_PRIME_ARRAY_LENGTH > old_size {
        return MAX_PRIME_ARRAY_LENGTH;
    }
    get_prime(new_size)
}

/// `ceil(2^64 / divisor)`, the reciprocal used by [`fast_mod`].
#[inline]
pub const fn fast_mod_multiplier(divisor: u32) -> u64 {
    u64::MAX / divisor as u64 + 1
}

/// `value % divisor` via the precomputed `multiplier`.
#[inline]
pub const fn fast_mod(value: u32, divisor: u32, multiplier: u64) -> u32 {
    let low = multiplier.wrapping_mul(value as u64);
    ((((low >> 32) + 1) * divisor as u64) >> 32) as u32
}

/// Hashes `key` and folds the 64-bit result to 32 bits.
#[inline]
pub(crate) fn hash32<S: BuildHasher, Q: Hash + ?Sized>(hasher: &S, key: &Q) -> u32 {
    let h = hasher.hash_one(key);
    (h ^ (h >> 32)) as u32
}
