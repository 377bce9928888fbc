// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Linear prediction analysis: windowing, autocorrelation, the Levinson-Durbin recursion, and
//! coefficient quantisation.

use std::f64::consts::PI;

use crate::{MAX_LPC_ORDER, QLP_SHIFT};

/// Computes a Tukey window with alpha = 0.5 over `block_size` points.
///
/// The window is computed once per encoder and reused for every block, including a shorter final
/// block, which is windowed by the leading coefficients.
pub(crate) fn tukey_window(block_size: usize) -> Vec<f64> {
    // The taper covers the first and last quarter of the window. Clamp the taper length so
    // degenerate block sizes, whose frames are never analysed, still yield finite coefficients.
    let taper = (block_size / 4).saturating_sub(1).max(1);
    let np = taper as f64;

    let mut window = vec![1.0; block_size];

    for (i, w) in window.iter_mut().enumerate() {
        if i <= taper {
            *w = (1.0 - (PI * i as f64 / np).cos()) / 2.0;
        }
        else if i + taper + 1 >= block_size {
            *w = (1.0 - (PI * (block_size - i - 1) as f64 / np).cos()) / 2.0;
        }
    }

    window
}

/// Applies `window` to `samples`, replacing the contents of `windowed`.
pub(crate) fn window_signal(window: &[f64], samples: &[i32], windowed: &mut Vec<f64>) {
    debug_assert!(samples.len() <= window.len());

    windowed.clear();
    windowed.extend(samples.iter().zip(window).map(|(&s, &w)| f64::from(s) * w));
}

/// Computes the autocorrelation of the windowed signal for lags 0 up to the maximum prediction
/// order.
pub(crate) fn autocorrelate(windowed: &[f64], autocorrelation: &mut [f64; MAX_LPC_ORDER + 1]) {
    for (lag, sum) in autocorrelation.iter_mut().enumerate() {
        *sum = windowed[lag..].iter().zip(windowed).map(|(&a, &b)| a * b).sum();
    }
}

/// Runs the Levinson-Durbin recursion over the autocorrelation, producing one row of prediction
/// coefficients per order: `lp_coeffs[i][..=i]` holds the coefficients for order `i + 1`.
///
/// The autocorrelation at lag 0 must be non-zero.
pub(crate) fn levinson(
    autocorrelation: &[f64; MAX_LPC_ORDER + 1],
    lp_coeffs: &mut [[f64; MAX_LPC_ORDER]; MAX_LPC_ORDER],
) {
    let mut error = autocorrelation[0];

    for i in 0..MAX_LPC_ORDER {
        let mut acc = autocorrelation[i + 1];

        for j in 0..i {
            acc -= lp_coeffs[i - 1][j] * autocorrelation[i - j];
        }

        let reflection = acc / error;

        lp_coeffs[i][i] = reflection;

        for j in 0..i {
            lp_coeffs[i][j] = lp_coeffs[i - 1][j] - reflection * lp_coeffs[i - 1][i - 1 - j];
        }

        error *= 1.0 - reflection * reflection;
    }
}

/// Quantises one row of prediction coefficients to signed 16-bit integers carrying `QLP_SHIFT`
/// fractional bits.
///
/// The rounding error fed forward from one coefficient to the next is truncated to an integer
/// between steps. This matches the bit-exact behaviour of the reference encoder and must not be
/// "fixed" to a fractional carry.
pub(crate) fn quantize(lp_row: &[f64], qlp: &mut [i32]) {
    debug_assert!(lp_row.len() == qlp.len());

    let mut error: i64 = 0;

    for (&coefficient, q) in lp_row.iter().zip(qlp.iter_mut()) {
        let sum = error as f64 + coefficient * f64::from(1 << QLP_SHIFT);
        let rounded = sum.round();

        *q = if rounded > 32_767.0 {
            32_767
        }
        else if rounded < -32_768.0 {
            -32_768
        }
        else {
            rounded as i32
        };

        error = (sum - f64::from(*q)) as i64;
    }
}
