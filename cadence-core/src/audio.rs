// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `audio` module provides the PCM input abstraction consumed by encoders.

use std::cmp::min;
use std::io;

use crate::errors::{invalid_argument_error, Result};

/// A `PcmSource` produces blocks of interleaved signed PCM samples for an encoder.
///
/// Samples are stored in the low `bits_per_sample` bits of each `i32`, sign extended to full
/// width. One PCM frame is one sample per channel.
pub trait PcmSource {
    /// Gets the number of channels.
    fn channels(&self) -> u32;

    /// Gets the number of bits per sample.
    fn bits_per_sample(&self) -> u32;

    /// Reads up to `max_frames` PCM frames into `buf`, replacing its previous contents with the
    /// interleaved samples, and returns the number of frames read.
    ///
    /// A source returns fewer frames than requested only at the end of the stream, and 0 once the
    /// stream is exhausted.
    fn read_frames(&mut self, max_frames: usize, buf: &mut Vec<i32>) -> io::Result<usize>;
}

/// A `BufSource` is an in-memory [`PcmSource`] over a buffer of interleaved samples.
pub struct BufSource {
    samples: Vec<i32>,
    channels: u32,
    bits_per_sample: u32,
    pos: usize,
}

impl BufSource {
    /// Instantiate a new `BufSource` from a buffer of interleaved samples. The buffer must contain
    /// a whole number of PCM frames.
    pub fn new(samples: Vec<i32>, channels: u32, bits_per_sample: u32) -> Result<BufSource> {
        if channels < 1 {
            return invalid_argument_error("audio: at least one channel is required");
        }
        if samples.len() % channels as usize != 0 {
            return invalid_argument_error("audio: sample buffer is not a whole number of frames");
        }

        Ok(BufSource { samples, channels, bits_per_sample, pos: 0 })
    }
}

impl PcmSource for BufSource {
    fn channels(&self) -> u32 {
        self.channels
    }

    fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    fn read_frames(&mut self, max_frames: usize, buf: &mut Vec<i32>) -> io::Result<usize> {
        let channels = self.channels as usize;
        let frames_left = (self.samples.len() - self.pos) / channels;
        let frames = min(max_frames, frames_left);

        buf.clear();
        buf.extend_from_slice(&self.samples[self.pos..self.pos + frames * channels]);
        self.pos += frames * channels;

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::{BufSource, PcmSource};

    #[test]
    fn verify_buf_source_reads_in_blocks() {
        let samples: Vec<i32> = (0..10).collect();
        let mut source = BufSource::new(samples, 2, 16).unwrap();

        let mut buf = Vec::new();

        assert_eq!(source.read_frames(2, &mut buf).unwrap(), 2);
        assert_eq!(buf, &[0, 1, 2, 3]);

        assert_eq!(source.read_frames(2, &mut buf).unwrap(), 2);
        assert_eq!(buf, &[4, 5, 6, 7]);

        // Short final read, then exhaustion.
        assert_eq!(source.read_frames(2, &mut buf).unwrap(), 1);
        assert_eq!(buf, &[8, 9]);

        assert_eq!(source.read_frames(2, &mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn verify_buf_source_rejects_partial_frames() {
        assert!(BufSource::new(vec![0; 9], 2, 16).is_err());
        assert!(BufSource::new(vec![0; 8], 0, 16).is_err());
    }
}
