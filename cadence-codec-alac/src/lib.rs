// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Apple Lossless Audio Codec (ALAC) encoder and decoder.
//!
//! This crate handles the compressed payload of an ALAC stream. A payload is a sequence of
//! byte-aligned *framesets*, each covering one block of PCM frames across every channel of the
//! stream. Within a frameset, channels are carried by one- or two-channel *frames* holding an
//! adaptive linear predictor's entropy-coded residuals, or raw samples when prediction does not
//! pay off.
//!
//! The QuickTime atoms that usually wrap an ALAC payload are a container concern and are not
//! handled here. [`Encoder::encode`] returns the byte size of every frameset it emits, in order,
//! which is exactly what a container writer needs to build its sample tables, and
//! [`Decoder::framesets`] walks a raw payload one frameset at a time.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Cadence crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::excessive_precision)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]

use cadence_core::errors::{invalid_argument_error, Error, Result};

mod decoder;
mod dsp;
mod encoder;
mod predictor;
mod rice;
mod stereo;

pub use decoder::{Decoder, Framesets};
pub use encoder::{encode, Encoder, FramesetInfo};

/// Highest linear prediction order used by the encoder.
pub(crate) const MAX_LPC_ORDER: usize = 8;

/// Number of fractional bits folded into quantised prediction coefficients.
pub(crate) const QLP_SHIFT: u32 = 9;

/// Bit width of a quantised prediction coefficient on the wire.
pub(crate) const QLP_PRECISION: u32 = 16;

/// Hard cap on the number of prediction coefficients a subframe header may declare.
pub(crate) const MAX_COEFFICIENTS: usize = 31;

/// Channel decorrelation shift used by the encoder.
pub(crate) const INTERLACING_SHIFT: u32 = 2;

/// Rice parameter modifier written in every subframe header.
pub(crate) const RICE_MODIFIER: u32 = 4;

/// Frames shorter than this are always emitted uncompressed.
pub(crate) const MIN_PREDICTOR_SAMPLES: usize = 10;

/// The 3-bit tag terminating a frameset.
pub(crate) const FRAMESET_END_TAG: u32 = 7;

/// Tunable encoding options, fixed for the lifetime of a stream.
#[derive(Clone, Debug)]
pub struct EncoderOptions {
    /// Maximum number of PCM frames coded per frameset.
    pub block_size: u32,
    /// Initial value of the residual coder's history register.
    pub initial_history: u32,
    /// Scaling factor applied to the residual coder's history updates.
    pub history_multiplier: u32,
    /// Upper bound on the residual coder's rice parameter.
    pub maximum_k: u32,
    /// Lower bound of the channel decorrelation weight search.
    pub min_leftweight: i32,
    /// Upper bound of the channel decorrelation weight search.
    pub max_leftweight: i32,
}

impl Default for EncoderOptions {
    fn default() -> EncoderOptions {
        EncoderOptions {
            block_size: 4096,
            initial_history: 10,
            history_multiplier: 40,
            maximum_k: 14,
            min_leftweight: 0,
            max_leftweight: 4,
        }
    }
}

/// Stream-level parameters a decoder needs to interpret a raw ALAC payload.
///
/// These are normally carried out-of-band by the container.
#[derive(Clone, Debug)]
pub struct StreamParams {
    /// Maximum number of PCM frames coded per frameset.
    pub block_size: u32,
    /// Number of bits per decoded sample.
    pub bits_per_sample: u32,
    /// Number of channels in the stream.
    pub channels: u32,
    /// Initial value of the residual coder's history register.
    pub initial_history: u32,
    /// Scaling factor applied to the residual coder's history updates.
    pub history_multiplier: u32,
    /// Upper bound on the residual coder's rice parameter.
    pub maximum_k: u32,
}

impl StreamParams {
    /// Instantiate stream parameters for the given channel count and bit depth, with the default
    /// block size and residual coder tuning.
    pub fn new(channels: u32, bits_per_sample: u32) -> StreamParams {
        StreamParams {
            block_size: 4096,
            bits_per_sample,
            channels,
            initial_history: 10,
            history_multiplier: 40,
            maximum_k: 14,
        }
    }
}

/// Verifies the stream format parameters shared by encoder and decoder.
pub(crate) fn verify_stream_format(
    block_size: u32,
    bits_per_sample: u32,
    channels: u32,
) -> Result<()> {
    if bits_per_sample != 16 && bits_per_sample != 24 {
        return Err(Error::UnsupportedBitDepth(bits_per_sample));
    }
    if block_size < 1 {
        return Err(Error::InvalidBlockSize(block_size));
    }
    if channels < 1 {
        return invalid_argument_error("alac: at least one channel is required");
    }
    Ok(())
}

/// Verifies the residual coder tuning shared by encoder and decoder. The history seed and
/// multiplier must fit the byte-sized fields containers carry them in, and a zero rice parameter
/// bound is meaningless.
pub(crate) fn verify_tuning(
    initial_history: u32,
    history_multiplier: u32,
    maximum_k: u32,
) -> Result<()> {
    if initial_history > 255 {
        return invalid_argument_error("alac: initial history must be at most 255");
    }
    if history_multiplier < 1 || history_multiplier > 255 {
        return invalid_argument_error("alac: history multiplier must be between 1 and 255");
    }
    if maximum_k < 1 || maximum_k > 30 {
        return invalid_argument_error("alac: maximum k must be between 1 and 30");
    }
    Ok(())
}

/// Frame grouping of the channels of an N-channel stream, in the order the frames appear within
/// a frameset. Each group names the stream channel indicies carried by one frame.
///
/// Streams with more than 8 channels are coded as one single-channel frame per channel, in stream
/// order, and do not use this table.
const CHANNEL_GROUPS: [&[&[usize]]; 8] = [
    &[&[0]],
    &[&[0, 1]],
    &[&[2], &[0, 1]],
    &[&[2], &[0, 1], &[3]],
    &[&[2], &[0, 1], &[3, 4]],
    &[&[2], &[0, 1], &[4, 5], &[3]],
    &[&[2], &[0, 1], &[4, 5], &[6], &[3]],
    &[&[2], &[6, 7], &[0, 1], &[4, 5], &[3]],
];

/// Flattened form of [`CHANNEL_GROUPS`]: the n-th channel decoded from a frameset belongs to
/// stream channel `CHANNEL_ORDERS[channels - 1][n]`.
const CHANNEL_ORDERS: [&[usize]; 8] = [
    &[0],
    &[0, 1],
    &[2, 0, 1],
    &[2, 0, 1, 3],
    &[2, 0, 1, 3, 4],
    &[2, 0, 1, 4, 5, 3],
    &[2, 0, 1, 4, 5, 6, 3],
    &[2, 6, 7, 0, 1, 4, 5, 3],
];

/// Gets the frame grouping for a stream of the given channel count, or `None` if every channel is
/// coded as its own single-channel frame.
pub(crate) fn channel_groups(channels: usize) -> Option<&'static [&'static [usize]]> {
    CHANNEL_GROUPS.get(channels.wrapping_sub(1)).copied()
}

/// Gets the decoded-channel to stream-channel order for a stream of the given channel count, or
/// `None` if decoded channels map to stream channels one-to-one.
pub(crate) fn channel_order(channels: usize) -> Option<&'static [usize]> {
    CHANNEL_ORDERS.get(channels.wrapping_sub(1)).copied()
}

#[cfg(test)]
mod tests {
    use super::{channel_groups, channel_order};

    #[test]
    fn verify_channel_orders_flatten_channel_groups() {
        for channels in 1..=8 {
            let flattened: Vec<usize> =
                channel_groups(channels).unwrap().iter().flat_map(|g| g.iter().copied()).collect();

            assert_eq!(flattened, channel_order(channels).unwrap());
        }
    }

    #[test]
    fn verify_channel_groups_cover_every_channel() {
        for channels in 1..=8 {
            let mut seen: Vec<usize> =
                channel_order(channels).unwrap().iter().copied().collect();
            seen.sort_unstable();

            let expected: Vec<usize> = (0..channels).collect();
            assert_eq!(seen, expected);
        }

        assert!(channel_groups(0).is_none());
        assert!(channel_groups(9).is_none());
    }

    #[test]
    fn verify_channel_groups_are_frame_sized() {
        for channels in 1..=8 {
            for group in channel_groups(channels).unwrap() {
                assert!(group.len() == 1 || group.len() == 2);
            }
        }
    }
}
