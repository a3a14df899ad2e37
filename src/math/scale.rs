const MAX_CORRECTION: f64 = 2.45;
const BASE_CORRECTION: f64 = 1.25;
const LOG2_SLOPE: f64 = 5.5;

/// Correction factor in (0, 1] for the softmax scale, driven by the number of
/// valid targets competing in a trial. Few targets inflate softmax confidence
/// and many deflate it regardless of signal quality; this compresses the
/// scale toward a fixed ceiling so calibration is roughly alphabet-invariant.
pub fn target_count_correction(n_valid: usize) -> f64 {
    let n = n_valid.max(1) as f64;
    (BASE_CORRECTION + n.log2() / LOG2_SLOPE).min(MAX_CORRECTION) / MAX_CORRECTION
}

pub fn effective_scale(base_scale: f64, n_valid: usize) -> f64 {
    base_scale * target_count_correction(n_valid)
}

#[cfg(test)]
mod tests {
    use super::{effective_scale, target_count_correction};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn single_target_correction_is_base_over_ceiling() {
        assert_abs_diff_eq!(target_count_correction(1), 1.25 / 2.45, epsilon = 1e-12);
    }

    #[test]
    fn zero_count_clamps_to_one() {
        assert_abs_diff_eq!(
            target_count_correction(0),
            target_count_correction(1),
            epsilon = 1e-12
        );
    }

    #[test]
    fn correction_is_monotonic_and_saturates() {
        let mut prev = 0.0;
        for n in 1..=512usize {
            let c = target_count_correction(n);
            assert!(c >= prev, "correction decreased at n={}", n);
            assert!(c <= 1.0);
            prev = c;
        }
        // log2(128)/5.5 pushes the raw term past the 2.45 ceiling
        assert_abs_diff_eq!(target_count_correction(128), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(target_count_correction(100_000), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn effective_scale_applies_correction_to_base() {
        let n = 2usize;
        assert_abs_diff_eq!(
            effective_scale(2.0, n),
            2.0 * target_count_correction(n),
            epsilon = 1e-12
        );
    }

    proptest! {
        #[test]
        fn correction_stays_in_unit_interval(n in 0usize..100_000) {
            let c = target_count_correction(n);
            prop_assert!(c > 0.0 && c <= 1.0);
        }

        #[test]
        fn correction_is_non_decreasing(a in 1usize..5_000, b in 1usize..5_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(target_count_correction(lo) <= target_count_correction(hi));
        }
    }
}
