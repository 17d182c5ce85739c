// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Utilities.

use rand::Rng;

/// Returns `x mod m` in `[0, m)`, for possibly negative `x`.
pub(crate) fn math_mod(x: i64, m: usize) -> usize {
    let m = m as i64;
    x.rem_euclid(m) as usize
}

/// Returns `ceil(log2(n))`, with `ceil_log2(0) == ceil_log2(1) == 0`.
pub(crate) fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// The number of bytes of a bitmap holding `num_bits` bits.
pub(crate) fn bitmap_len(num_bits: usize) -> usize {
    (num_bits + 7) / 8
}

pub(crate) fn bitmap_set(bitmap: &mut [u8], i: usize) {
    bitmap[i / 8] |= 1 << (i % 8);
}

pub(crate) fn bitmap_get(bitmap: &[u8], i: usize) -> bool {
    bitmap[i / 8] & (1 << (i % 8)) != 0
}

/// Samples one of three outcomes with weights `(odd1, odd2, total - odd1 - odd2)`.
/// Returns 1, 2 or 0 respectively.
pub(crate) fn sample_three_way<R: Rng>(rng: &mut R, odd1: usize, odd2: usize, total: usize) -> u8 {
    let coin = rng.gen_range(0..total);
    if coin < odd1 {
        1
    } else if coin < odd1 + odd2 {
        2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_math_mod() {
        assert_eq!(math_mod(-1, 10), 9);
        assert_eq!(math_mod(-20, 10), 0);
        assert_eq!(math_mod(13, 10), 3);
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(0), 0);
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(1 << 20), 20);
        assert_eq!(ceil_log2((1 << 20) + 1), 21);
    }

    #[test]
    fn test_bitmap() {
        assert_eq!(bitmap_len(0), 0);
        assert_eq!(bitmap_len(1), 1);
        assert_eq!(bitmap_len(8), 1);
        assert_eq!(bitmap_len(9), 2);

        let mut bitmap = vec![0u8; 2];
        bitmap_set(&mut bitmap, 3);
        bitmap_set(&mut bitmap, 9);
        assert_eq!(bitmap, vec![0b1000, 0b10]);
        assert!(bitmap_get(&bitmap, 9));
        assert!(!bitmap_get(&bitmap, 8));
    }

    #[test]
    fn test_sample_three_way_frequencies() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut counts = [0usize; 3];
        let trials = 30000;
        for _ in 0..trials {
            counts[usize::from(sample_three_way(&mut rng, 10, 20, 100))] += 1;
        }
        // Expected 70%, 10%, 20%.
        assert!((counts[0] as f64 / trials as f64 - 0.7).abs() < 0.02);
        assert!((counts[1] as f64 / trials as f64 - 0.1).abs() < 0.02);
        assert!((counts[2] as f64 / trials as f64 - 0.2).abs() < 0.02);
    }
}
