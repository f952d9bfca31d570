//! Batch bitwise kernels over `u32` word buffers.
//!
//! Binary kernels combine `right` into `left` in place over the common prefix
//! of the two slices. On x86_64 the widest available unit is chosen at
//! runtime: 8 words per step with AVX2, else 4 words per step with SSE2
//! (always present on x86_64), then a scalar remainder. On aarch64 NEON is
//! part of the baseline and runs 4 words per step. Other targets use the
//! scalar loop. Buffers shorter than 8 words never touch the vector units.

/// Vector unit a kernel call dispatches to on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// 256-bit lanes, 8 words per step.
    Avx2,
    /// 128-bit lanes, 4 words per step.
    Sse2,
    /// 128-bit aarch64 lanes, 4 words per step.
    Neon,
    /// One word per step.
    Scalar,
}

impl Kernel {
    /// Words processed per vector step.
    pub const fn words_per_step(self) -> usize {
        match self {
            Kernel::Avx2 => 8,
            Kernel::Sse2 | Kernel::Neon => 4,
            Kernel::Scalar => 1,
        }
    }
}

/// Returns the kernel selected for this CPU.
#[inline]
pub fn active_kernel() -> Kernel {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx2") {
            Kernel::Avx2
        } else {
            Kernel::Sse2
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        Kernel::Neon
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        Kernel::Scalar
    }
}

const VECTOR_THRESHOLD: usize = 8;

macro_rules! dispatch_binary {
    ($name:ident, $avx:ident, $sse:ident, $neon:ident, $op:tt, $doc:literal) => {
        #[doc = $doc]
        #[inline]
        pub fn $name(left: &mut [u32], right: &[u32]) {
            let n = left.len().min(right.len());
            let (left, right) = (&mut left[..n], &right[..n]);
            if n < VECTOR_THRESHOLD {
                for (l, r) in left.iter_mut().zip(right) {
                    *l = *l $op *r;
                }
                return;
            }
            #[cfg(target_arch = "x86_64")]
            {
                match active_kernel() {
                    // SAFETY: AVX2 detected at runtime
                    Kernel::Avx2 => unsafe { x86::$avx(left, right) },
                    // SAFETY: SSE2 is part of the x86_64 baseline
                    _ => unsafe { x86::$sse(left, right) },
                }
            }
            #[cfg(target_arch = "aarch64")]
            {
                // SAFETY: NEON is part of the aarch64 baseline
                unsafe { arm::$neon(left, right) }
            }
            #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
            {
                for (l, r) in left.iter_mut().zip(right) {
                    *l = *l $op *r;
                }
            }
        }
    };
}

dispatch_binary!(and, and_avx2, and_sse2, and_neon, &, "`left[i] &= right[i]` over the common prefix.");
dispatch_binary!(or, or_avx2, or_sse2, or_neon, |, "`left[i] |= right[i]` over the common prefix.");
dispatch_binary!(xor, xor_avx2, xor_sse2, xor_neon, ^, "`left[i] ^= right[i]` over the common prefix.");

/// `words[i] = !words[i]` for every word.
#[inline]
pub fn not(words: &mut [u32]) {
    if words.len() < VECTOR_THRESHOLD {
        for w in words.iter_mut() {
            *w = !*w;
        }
        return;
    }
    #[cfg(target_arch = "x86_64")]
    {
        match active_kernel() {
            // SAFETY: AVX2 detected at runtime
            Kernel::Avx2 => unsafe { x86::not_avx2(words) },
            // SAFETY: SSE2 is part of the x86_64 baseline
            _ => unsafe { x86::not_sse2(words) },
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: NEON is part of the aarch64 baseline
        unsafe { arm::not_neon(words) }
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        for w in words.iter_mut() {
            *w = !*w;
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    macro_rules! binary_kernels {
        ($avx:ident, $sse:ident, $avx_op:ident, $sse_op:ident, $op:tt) => {
            #[target_feature(enable = "avx2")]
            pub(super) unsafe fn $avx(left: &mut [u32], right: &[u32]) {
                let n = left.len();
                let mut i = 0;
                while i + 8 <= n {
                    // SAFETY: i + 8 <= n for both slices; unaligned loads and stores
                    unsafe {
                        let a = _mm256_loadu_si256(left.as_ptr().add(i).cast());
                        let b = _mm256_loadu_si256(right.as_ptr().add(i).cast());
                        _mm256_storeu_si256(left.as_mut_ptr().add(i).cast(), $avx_op(a, b));
                    }
                    i += 8;
                }
                while i < n {
                    left[i] = left[i] $op right[i];
                    i += 1;
                }
            }

            #[target_feature(enable = "sse2")]
            pub(super) unsafe fn $sse(left: &mut [u32], right: &[u32]) {
                let n = left.len();
                let mut i = 0;
                while i + 4 <= n {
                    // SAFETY: i + 4 <= n for both slices; unaligned loads and stores
                    unsafe {
                        let a = _mm_loadu_si128(left.as_ptr().add(i).cast());
                        let b = _mm_loadu_si128(right.as_ptr().add(i).cast());
                        _mm_storeu_si128(left.as_mut_ptr().add(i).cast(), $sse_op(a, b));
                    }
                    i += 4;
                }
                while i < n {
                    left[i] = left[i] $op right[i];
                    i += 1;
                }
            }
        };
    }

    binary_kernels!(and_avx2, and_sse2, _mm256_and_si256, _mm_and_si128, &);
    binary_kernels!(or_avx2, or_sse2, _mm256_or_si256, _mm_or_si128, |);
    binary_kernels!(xor_avx2, xor_sse2, _mm256_xor_si256, _mm_xor_si128, ^);

    #[target_feature(enable = "avx2")]
    pub(super) unsafe fn not_avx2(words: &mut [u32]) {
        let n = words.len();
        let mut i = 0;
        while i + 8 <= n {
            // SAFETY: i + 8 <= n
            unsafe {
                let ones = _mm256_set1_epi32(-1);
                let a = _mm256_loadu_si256(words.as_ptr().add(i).cast());
                _mm256_storeu_si256(words.as_mut_ptr().add(i).cast(), _mm256_xor_si256(a, ones));
            }
            i += 8;
        }
        while i < n {
            words[i] = !words[i];
            i += 1;
        }
    }

    #[target_feature(enable = "sse2")]
    pub(super) unsafe fn not_sse2(words: &mut [u32]) {
        let n = words.len();
        let mut i = 0;
        while i + 4 <= n {
            // SAFETY: i + 4 <= n
            unsafe {
                let ones = _mm_set1_epi32(-1);
                let a = _mm_loadu_si128(words.as_ptr().add(i).cast());
                _mm_storeu_si128(words.as_mut_ptr().add(i).cast(), _mm_xor_si128(a, ones));
            }
            i += 4;
        }
        while i < n {
            words[i] = !words[i];
            i += 1;
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use std::arch::aarch64::*;

    macro_rules! binary_kernel {
        ($name:ident, $op_q:ident, $op:tt) => {
            #[target_feature(enable = "neon")]
            pub(super) unsafe fn $name(left: &mut [u32], right: &[u32]) {
                let n = left.len();
                let mut i = 0;
                while i + 4 <= n {
                    // SAFETY: i + 4 <= n for both slices; vld1q/vst1q need
                    // only element alignment
                    unsafe {
                        let a = vld1q_u32(left.as_ptr().add(i));
                        let b = vld1q_u32(right.as_ptr().add(i));
                        vst1q_u32(left.as_mut_ptr().add(i), $op_q(a, b));
                    }
                    i += 4;
                }
                while i < n {
                    left[i] = left[i] $op right[i];
                    i += 1;
                }
            }
        };
    }

    binary_kernel!(and_neon, vandq_u32, &);
    binary_kernel!(or_neon, vorrq_u32, |);
    binary_kernel!(xor_neon, veorq_u32, ^);

    #[target_feature(enable = "neon")]
    pub(super) unsafe fn not_neon(words: &mut [u32]) {
        let n = words.len();
        let mut i = 0;
        while i + 4 <= n {
            // SAFETY: i + 4 <= n
            unsafe {
                let a = vld1q_u32(words.as_ptr().add(i));
                vst1q_u32(words.as_mut_ptr().add(i), vmvnq_u32(a));
            }
            i += 4;
        }
        while i < n {
            words[i] = !words[i];
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_words(rng: &mut SmallRng, n: usize) -> Vec<u32> {
        (0..n).map(|_| rng.random()).collect()
    }

    // Lengths straddle the scalar threshold and both vector widths.
    const LENGTHS: [usize; 10] = [0, 1, 3, 4, 7, 8, 9, 15, 33, 257];

    #[test]
    fn binary_kernels_match_scalar() {
        let mut rng = SmallRng::seed_from_u64(7);
        for n in LENGTHS {
            let a = random_words(&mut rng, n);
            let b = random_words(&mut rng, n);

            let mut got = a.clone();
            and(&mut got, &b);
            let want: Vec<u32> = a.iter().zip(&b).map(|(x, y)| x & y).collect();
            assert_eq!(got, want, "and, n = {n}");

            let mut got = a.clone();
            or(&mut got, &b);
            let want: Vec<u32> = a.iter().zip(&b).map(|(x, y)| x | y).collect();
            assert_eq!(got, want, "or, n = {n}");

            let mut got = a.clone();
            xor(&mut got, &b);
            let want: Vec<u32> = a.iter().zip(&b).map(|(x, y)| x ^ y).collect();
            assert_eq!(got, want, "xor, n = {n}");
        }
    }

    #[test]
    fn not_matches_scalar() {
        let mut rng = SmallRng::seed_from_u64(11);
        for n in LENGTHS {
            let a = random_words(&mut rng, n);
            let mut got = a.clone();
            not(&mut got);
            let want: Vec<u32> = a.iter().map(|x| !x).collect();
            assert_eq!(got, want, "n = {n}");
        }
    }

    #[test]
    fn common_prefix_only() {
        let mut left = vec![u32::MAX; 12];
        let right = vec![0u32; 9];
        and(&mut left, &right);
        assert!(left[..9].iter().all(|w| *w == 0));
        assert!(left[9..].iter().all(|w| *w == u32::MAX));
    }

    #[test]
    fn kernel_reports_step() {
        let kernel = active_kernel();
        #[cfg(target_arch = "x86_64")]
        assert!(matches!(kernel, Kernel::Avx2 | Kernel::Sse2));
        #[cfg(target_arch = "aarch64")]
        assert_eq!(kernel, Kernel::Neon);
        assert!(matches!(kernel.words_per_step(), 1 | 4 | 8));
        assert_eq!(Kernel::Neon.words_per_step(), Kernel::Sse2.words_per_step());
    }
}
