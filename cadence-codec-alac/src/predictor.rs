// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The adaptive linear predictor.
//!
//! Prediction is relative to a base sample: for order N, sample `i` is predicted from the base
//! `s[i - N - 1]` plus a filtered sum of the differences between the N preceding samples and that
//! base. After every non-zero residual the coefficients are nudged by the residual's sign, so the
//! filter tracks the signal as it is coded. The encoder and decoder apply the exact same
//! adjustment, driven by the residual value before it is folded into the output, which keeps both
//! coefficient trajectories identical.

use cadence_core::util::bits::sign_extend_leq64_to_i64;

use crate::QLP_SHIFT;

/// Truncates `value` to an n-bit signed two's complement integer.
#[inline(always)]
fn truncate(value: i64, sample_size: u32) -> i32 {
    sign_extend_leq64_to_i64(value as u64, sample_size) as i32
}

/// Nudges the prediction coefficients after a non-zero residual.
///
/// `window` holds the `coefficients.len()` samples immediately preceding the predicted one, and
/// `past0` the base sample before those. Both sides of the codec call this with identical inputs:
/// the encoder with the residual it just computed, the decoder with the residual it just read.
fn adapt_coefficients(
    coefficients: &mut [i32],
    window: &[i32],
    past0: i32,
    shift: u32,
    mut residual: i32,
) {
    let order = coefficients.len();

    debug_assert!(window.len() == order);

    if residual > 0 {
        for (j, &sample) in window.iter().enumerate() {
            let diff = past0 - sample;
            let sign = diff.signum();

            coefficients[order - j - 1] -= sign;

            residual -= ((diff * sign) >> shift) * (j as i32 + 1);

            if residual <= 0 {
                break;
            }
        }
    }
    else if residual < 0 {
        for (j, &sample) in window.iter().enumerate() {
            let diff = past0 - sample;
            let sign = diff.signum();

            coefficients[order - j - 1] += sign;

            residual -= ((diff * -sign) >> shift) * (j as i32 + 1);

            if residual >= 0 {
                break;
            }
        }
    }
}

/// Computes the residuals for `samples`, replacing the contents of `residuals`.
///
/// The first sample is passed through verbatim and the next `coefficients.len()` samples are
/// coded as first differences to warm the predictor up. `coefficients` is adjusted in place as
/// coding proceeds; callers wanting to keep the initial coefficients must pass a copy.
pub(crate) fn compute_residuals(
    samples: &[i32],
    sample_size: u32,
    coefficients: &mut [i32],
    residuals: &mut Vec<i32>,
) {
    let order = coefficients.len();

    debug_assert!(samples.len() > order);

    residuals.clear();
    residuals.push(samples[0]);

    for i in 1..=order {
        residuals.push(truncate(i64::from(samples[i]) - i64::from(samples[i - 1]), sample_size));
    }

    for i in order + 1..samples.len() {
        let past0 = samples[i - order - 1];

        let mut sum: i64 = 1 << (QLP_SHIFT - 1);

        for (j, &c) in coefficients.iter().enumerate() {
            sum += i64::from(c) * i64::from(samples[i - j - 1] - past0);
        }

        let predicted = sum >> QLP_SHIFT;

        let residual =
            truncate(i64::from(samples[i]) - i64::from(past0) - predicted, sample_size);

        residuals.push(residual);

        if residual != 0 {
            adapt_coefficients(coefficients, &samples[i - order..i], past0, QLP_SHIFT, residual);
        }
    }
}

/// Reconstructs samples from residuals in place.
///
/// On entry `output` holds the residuals; on return it holds the decoded samples. An order of 0
/// reduces the recurrence to a running prefix sum of the residuals.
pub(crate) fn predict(output: &mut [i32], sample_size: u32, coefficients: &mut [i32], shift: u32) {
    let order = coefficients.len();

    // Warm-up samples are coded as first differences.
    for i in 1..output.len().min(order + 1) {
        output[i] = truncate(i64::from(output[i]) + i64::from(output[i - 1]), sample_size);
    }

    for i in order + 1..output.len() {
        let residual = output[i];
        let past0 = output[i - order - 1];

        // Written as `(1 << shift) >> 1` to stay in range when the shift is 0.
        let mut sum: i64 = (1i64 << shift) >> 1;

        for (j, &c) in coefficients.iter().enumerate() {
            sum += i64::from(c) * i64::from(output[i - j - 1] - past0);
        }

        let predicted = sum >> shift;

        output[i] = truncate(i64::from(residual) + i64::from(past0) + predicted, sample_size);

        if residual != 0 {
            adapt_coefficients(coefficients, &output[i - order..i], past0, shift, residual);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_residuals, predict};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn round_trip(samples: &[i32], sample_size: u32, coefficients: &[i32]) {
        let mut enc_coefficients = coefficients.to_vec();
        let mut residuals = Vec::new();

        compute_residuals(samples, sample_size, &mut enc_coefficients, &mut residuals);

        assert_eq!(residuals.len(), samples.len());

        let mut dec_coefficients = coefficients.to_vec();
        let mut output = residuals;

        predict(&mut output, sample_size, &mut dec_coefficients, 9);

        assert_eq!(output, samples);

        // Both sides must have walked the same coefficient trajectory.
        assert_eq!(enc_coefficients, dec_coefficients);
    }

    #[test]
    fn verify_round_trip_random_signal() {
        let mut rng = SmallRng::seed_from_u64(0x11aa);

        for order in [1usize, 4, 8] {
            let coefficients: Vec<i32> =
                (0..order).map(|_| rng.random_range(-4096..=4096)).collect();

            let samples: Vec<i32> =
                (0..2048).map(|_| rng.random_range(-32_768..=32_767)).collect();

            round_trip(&samples, 16, &coefficients);
        }
    }

    #[test]
    fn verify_round_trip_smooth_signal() {
        // A ramp keeps residuals small and exercises the adaptation stop conditions.
        let samples: Vec<i32> = (0..512).map(|i| i * 13 % 5000 - 2500).collect();

        round_trip(&samples, 16, &[410, -82, 61, 24]);
        round_trip(&samples, 17, &[512, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn verify_round_trip_wide_samples() {
        let mut rng = SmallRng::seed_from_u64(0x22bb);

        // 17-bit samples, as produced by decorrelating a 16-bit channel pair.
        let samples: Vec<i32> = (0..1024).map(|_| rng.random_range(-65_536..=65_535)).collect();

        round_trip(&samples, 17, &[300, -120, 45, 2]);
    }

    #[test]
    fn verify_order_zero_is_prefix_sum() {
        let mut residuals = vec![5, -2, 7, 0, -10];
        predict(&mut residuals, 16, &mut [], 9);

        assert_eq!(residuals, &[5, 3, 10, 10, 0]);
    }

    #[test]
    fn verify_all_zero_coefficients_code_first_differences() {
        let samples = vec![0i32; 64];
        let mut coefficients = [0i32; 4];
        let mut residuals = Vec::new();

        compute_residuals(&samples, 16, &mut coefficients, &mut residuals);

        assert!(residuals.iter().all(|&r| r == 0));
        assert_eq!(coefficients, [0; 4]);
    }
}
