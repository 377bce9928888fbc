// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inter-channel decorrelation for channel pairs.
//!
//! A channel pair is transformed into a weighted mid-like channel and a difference channel, the
//! mid/side family member selected by `(shift, leftweight)`. A left weight of 0 leaves the pair
//! untouched.

/// Correlates a channel pair into `out0` (weighted mid) and `out1` (difference), replacing their
/// contents. A `leftweight` of 0 copies the channels through unchanged.
pub(crate) fn correlate(
    ch0: &[i32],
    ch1: &[i32],
    leftweight: i32,
    shift: u32,
    out0: &mut Vec<i32>,
    out1: &mut Vec<i32>,
) {
    debug_assert!(ch0.len() == ch1.len());

    out0.clear();
    out1.clear();

    if leftweight == 0 {
        out0.extend_from_slice(ch0);
        out1.extend_from_slice(ch1);
        return;
    }

    for (&s0, &s1) in ch0.iter().zip(ch1) {
        out0.push(s1 + (((s0 - s1) * leftweight) >> shift));
        out1.push(s0 - s1);
    }
}

/// Decorrelates a channel pair in place: on return `ch0` holds the left channel and `ch1` the
/// right channel. Must not be called with a `leftweight` of 0.
pub(crate) fn decorrelate(ch0: &mut [i32], ch1: &mut [i32], leftweight: i32, shift: u32) {
    debug_assert!(ch0.len() == ch1.len());
    debug_assert!(leftweight != 0);

    for (s0, s1) in ch0.iter_mut().zip(ch1.iter_mut()) {
        let right = *s0 - ((*s1 * leftweight) >> shift);
        let left = *s1 + right;

        *s0 = left;
        *s1 = right;
    }
}
