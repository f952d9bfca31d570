use native_bits::{BitArray, LengthMismatch};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_array(rng: &mut SmallRng, len: usize) -> BitArray {
    let mut a = BitArray::new(len, false);
    for i in 0..len {
        a.set(i, rng.random_bool(0.5)).unwrap();
    }
    a
}

fn copy(a: &BitArray) -> BitArray {
    BitArray::from_words(a.as_words(), a.len()).unwrap()
}

fn bits(a: &BitArray) -> Vec<bool> {
    a.iter().collect()
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn new_false_is_clear() {
    let a = BitArray::new(129, false);
    assert_eq!(a.len(), 129);
    assert!(!a.has_any_set());
    assert_eq!(a.count_ones(), 0);
}

#[test]
fn new_true_is_full() {
    for len in [1, 31, 32, 33, 64, 255, 256, 257] {
        let a = BitArray::new(len, true);
        assert!(a.has_all_set(), "len {len}");
        assert_eq!(a.count_ones(), len);
    }
}

// =============================================================================
// Bitwise laws
// =============================================================================

#[test]
fn and_then_or_absorbs() {
    let mut rng = SmallRng::seed_from_u64(42);
    for len in [7, 64, 300, 1025] {
        let a = random_array(&mut rng, len);
        let b = random_array(&mut rng, len);

        // (a & b) | b == b
        let mut x = copy(&a);
        x.and(&b).unwrap().or(&b).unwrap();
        assert_eq!(bits(&x), bits(&b), "len {len}");
    }
}

#[test]
fn double_not_is_identity() {
    let mut rng = SmallRng::seed_from_u64(43);
    for len in [1, 33, 256, 1000] {
        let a = random_array(&mut rng, len);
        let mut x = copy(&a);
        x.not().not();
        assert_eq!(bits(&x), bits(&a));
        assert_eq!(x.as_words(), a.as_words());
    }
}

#[test]
fn xor_self_copy_clears() {
    let mut rng = SmallRng::seed_from_u64(44);
    let a = random_array(&mut rng, 517);
    let mut x = copy(&a);
    x.xor(&a).unwrap();
    assert!(!x.has_any_set());
}

#[test]
fn not_complements_count() {
    let mut rng = SmallRng::seed_from_u64(45);
    let mut a = random_array(&mut rng, 999);
    let ones = a.count_ones();
    a.not();
    assert_eq!(a.count_ones(), 999 - ones);
}

#[test]
fn mismatched_lengths_rejected() {
    let mut a = BitArray::new(64, true);
    let b = BitArray::new(65, true);
    assert_eq!(
        a.and(&b).unwrap_err(),
        LengthMismatch {
            left: 64,
            right: 65
        }
    );
    assert!(a.or(&b).is_err());
    assert!(a.xor(&b).is_err());
    // receiver untouched
    assert!(a.has_all_set());
}

// =============================================================================
// set_all / has_all_set / has_any_set
// =============================================================================

#[test]
fn set_all_round_trip() {
    let mut a = BitArray::new(100, false);
    a.set_all(true);
    assert!(a.has_all_set());
    assert!(a.has_any_set());

    a.set(57, false).unwrap();
    assert!(!a.has_all_set());
    assert!(a.has_any_set());

    a.set_all(false);
    assert!(!a.has_any_set());
}

#[test]
fn has_all_set_ignores_tail() {
    let mut a = BitArray::new(40, true);
    a.set_len(35);
    assert!(a.has_all_set());
    a.set_len(40);
    assert!(!a.has_all_set());
    assert_eq!(a.count_ones(), 35);
}

// =============================================================================
// Shifts
// =============================================================================

#[test]
fn shift_by_len_clears() {
    let mut a = BitArray::new(50, true);
    a.right_shift(50);
    assert!(!a.has_any_set());

    let mut b = BitArray::new(50, true);
    b.left_shift(1000);
    assert!(!b.has_any_set());
}

#[test]
fn left_shift_drops_high_bits() {
    let mut a = BitArray::new(40, true);
    a.left_shift(8);
    assert_eq!(a.count_ones(), 32);
    assert_eq!(a.get(7), Some(false));
    assert_eq!(a.get(8), Some(true));
    assert_eq!(a.as_words(), &[0xFFFF_FF00, 0xFF]);
}

#[test]
fn random_shifts_match_reference() {
    let mut rng = SmallRng::seed_from_u64(46);
    for _ in 0..200 {
        let len = rng.random_range(1..300);
        let count = rng.random_range(0..len + 40);
        let a = random_array(&mut rng, len);
        let reference = bits(&a);

        let mut r = copy(&a);
        r.right_shift(count);
        let want: Vec<bool> = (0..len)
            .map(|i| reference.get(i + count).copied().unwrap_or(false))
            .collect();
        assert_eq!(bits(&r), want);

        let mut l = copy(&a);
        l.left_shift(count);
        let want: Vec<bool> = (0..len).map(|i| i >= count && reference[i - count]).collect();
        assert_eq!(bits(&l), want);
    }
}
