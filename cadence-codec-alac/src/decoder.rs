// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ALAC decoder.

use cadence_core::errors::{invalid_argument_error, Error, Result};
use cadence_core::io::{BitReaderLtr, FiniteBitStream, ReadBitsLtr};

use crate::{channel_order, verify_stream_format, verify_tuning, StreamParams};
use crate::{predictor, rice, stereo};
use crate::{FRAMESET_END_TAG, MAX_COEFFICIENTS, QLP_PRECISION};

/// Apple Lossless Audio Codec (ALAC) decoder.
pub struct Decoder {
    params: StreamParams,
}

impl Decoder {
    /// Instantiate a `Decoder` for a stream with the given parameters.
    pub fn try_new(params: StreamParams) -> Result<Decoder> {
        verify_stream_format(params.block_size, params.bits_per_sample, params.channels)?;
        verify_tuning(params.initial_history, params.history_multiplier, params.maximum_k)?;

        Ok(Decoder { params })
    }

    /// Gets the stream parameters.
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Returns an iterator decoding `payload` one frameset at a time.
    ///
    /// Each item is the frameset's samples as one array per stream channel. The iterator ends
    /// once the payload is exhausted; a decode error ends it after yielding the error.
    pub fn framesets<'a, 'p>(&'a self, payload: &'p [u8]) -> Framesets<'a, 'p> {
        Framesets { decoder: self, reader: BitReaderLtr::new(payload), done: false }
    }

    /// Decodes every frameset of `payload` and concatenates the results per stream channel.
    pub fn decode_all(&self, payload: &[u8]) -> Result<Vec<Vec<i32>>> {
        let mut output = vec![Vec::new(); self.params.channels as usize];

        for frameset in self.framesets(payload) {
            for (acc, channel) in output.iter_mut().zip(frameset?) {
                acc.extend_from_slice(&channel);
            }
        }

        Ok(output)
    }

    /// Decodes one frameset from `reader`, or returns `None` once the payload is exhausted.
    pub fn decode_frameset(&self, reader: &mut BitReaderLtr<'_>) -> Result<Option<Vec<Vec<i32>>>> {
        if reader.bits_left() == 0 {
            return Ok(None);
        }

        let channels = self.params.channels as usize;
        let order = channel_order(channels);

        let mut output = vec![Vec::new(); channels];
        let mut next_channel = 0;
        let mut block_size = None;

        loop {
            let tag = reader.read_bits_leq32(3)?;

            if tag == FRAMESET_END_TAG {
                reader.realign();
                break;
            }

            let channels_in_frame = match tag {
                0 => 1,
                1 => 2,
                _ => return Err(Error::InvalidFrameChannelCount(tag + 1)),
            };

            if next_channel + channels_in_frame > channels {
                return Err(Error::ExcessiveFramesetChannels);
            }

            // Frames cover the stream's channels in a fixed order; route each decoded channel to
            // its stream position.
            let target = |i: usize| order.map_or(i, |o| o[i]);

            let n = if channels_in_frame == 2 {
                let (out0, out1) =
                    pair_mut(&mut output, target(next_channel), target(next_channel + 1));

                read_frame(&self.params, reader, out0, Some(out1))?
            }
            else {
                read_frame(&self.params, reader, &mut output[target(next_channel)], None)?
            };

            match block_size {
                None => block_size = Some(n),
                Some(size) if size != n => return Err(Error::FrameBlockSizeMismatch),
                _ => (),
            }

            next_channel += channels_in_frame;
        }

        if next_channel != channels {
            return invalid_argument_error("alac: frameset does not cover every stream channel");
        }

        Ok(Some(output))
    }
}

/// An iterator over the framesets of a payload. See [`Decoder::framesets`].
pub struct Framesets<'a, 'p> {
    decoder: &'a Decoder,
    reader: BitReaderLtr<'p>,
    done: bool,
}

impl<'a, 'p> Iterator for Framesets<'a, 'p> {
    type Item = Result<Vec<Vec<i32>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.decoder.decode_frameset(&mut self.reader) {
            Ok(Some(frameset)) => Some(Ok(frameset)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Mutably borrows two distinct channels of the output.
fn pair_mut(channels: &mut [Vec<i32>], a: usize, b: usize) -> (&mut Vec<i32>, &mut Vec<i32>) {
    debug_assert!(a != b);

    if a < b {
        let (head, tail) = channels.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    }
    else {
        let (head, tail) = channels.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

/// A subframe header: the per-channel prediction parameters of a compressed frame.
struct SubframeHeader {
    qlp_shift: u32,
    rice_modifier: u32,
    coefficients: [i32; MAX_COEFFICIENTS],
    order: usize,
}

impl SubframeHeader {
    fn read(reader: &mut BitReaderLtr<'_>) -> Result<SubframeHeader> {
        let prediction_type = reader.read_bits_leq32(4)?;

        if prediction_type != 0 {
            return Err(Error::InvalidPredictionType(prediction_type));
        }

        let qlp_shift = reader.read_bits_leq32(4)?;
        let rice_modifier = reader.read_bits_leq32(3)?;
        let order = reader.read_bits_leq32(5)? as usize;

        let mut coefficients = [0; MAX_COEFFICIENTS];

        for c in coefficients[..order].iter_mut() {
            *c = reader.read_bits_leq32_signed(QLP_PRECISION)?;
        }

        Ok(SubframeHeader { qlp_shift, rice_modifier, coefficients, order })
    }
}

/// Reads and decodes one frame into the given output channel(s), resizing them to the frame's
/// PCM frame count, and returns that count.
fn read_frame(
    params: &StreamParams,
    reader: &mut BitReaderLtr<'_>,
    out0: &mut Vec<i32>,
    out1: Option<&mut Vec<i32>>,
) -> Result<usize> {
    let is_pair = out1.is_some();

    // Reserved header bits.
    reader.read_bits_leq32(16)?;

    let has_sample_count = reader.read_bit()?;
    let lsb_bytes = reader.read_bits_leq32(2)?;
    let is_uncompressed = reader.read_bit()?;

    let n = if has_sample_count {
        reader.read_bits_leq32(32)? as usize
    }
    else {
        params.block_size as usize
    };

    if n > params.block_size as usize {
        return Err(Error::InvalidBlockSize(n as u32));
    }

    // Residual decoding requires zeroed output buffers.
    out0.clear();
    out0.resize(n, 0);

    let out0 = out0.as_mut_slice();

    let mut out1: Option<&mut [i32]> = match out1 {
        Some(chan) => {
            chan.clear();
            chan.resize(n, 0);
            Some(chan.as_mut_slice())
        }
        None => None,
    };

    if !is_uncompressed {
        let shift = 8 * lsb_bytes;

        if shift >= params.bits_per_sample {
            return invalid_argument_error("alac: low byte count exceeds the sample size");
        }

        // Decorrelated pairs carry one extra bit per coded sample.
        let sample_size = params.bits_per_sample - shift + u32::from(is_pair);

        let interlacing_shift = reader.read_bits_leq32(8)?;
        let interlacing_leftweight = reader.read_bits_leq32_signed(8)?;

        let mut sub0 = SubframeHeader::read(reader)?;
        let mut sub1 = if is_pair { Some(SubframeHeader::read(reader)?) } else { None };

        // The low sample bits sit between the subframe headers and the residual blocks; hold
        // them until the predictor has run.
        let mut low_bits: Vec<u16> = Vec::new();

        if shift > 0 {
            let count = if is_pair { 2 * n } else { n };

            low_bits.reserve_exact(count);

            for _ in 0..count {
                low_bits.push(reader.read_bits_leq32(shift)? as u16);
            }
        }

        decode_channel(params, reader, &mut sub0, out0, sample_size)?;

        if let Some(out1) = out1.as_deref_mut() {
            decode_channel(params, reader, sub1.as_mut().unwrap(), out1, sample_size)?;

            if interlacing_leftweight != 0 {
                stereo::decorrelate(out0, out1, interlacing_leftweight, interlacing_shift);
            }
        }

        // Reattach the low sample bits. For a pair they are interleaved channel-major.
        if shift > 0 {
            if let Some(out1) = out1.as_deref_mut() {
                let tails = low_bits.chunks_exact(2);

                for ((s0, s1), tail) in out0.iter_mut().zip(out1.iter_mut()).zip(tails) {
                    *s0 = (*s0 << shift) | i32::from(tail[0]);
                    *s1 = (*s1 << shift) | i32::from(tail[1]);
                }
            }
            else {
                for (s0, &tail) in out0.iter_mut().zip(low_bits.iter()) {
                    *s0 = (*s0 << shift) | i32::from(tail);
                }
            }
        }
    }
    else {
        // Raw interleaved samples at the full stream bit depth.
        if let Some(out1) = out1.as_deref_mut() {
            for i in 0..n {
                out0[i] = reader.read_bits_leq32_signed(params.bits_per_sample)?;
                out1[i] = reader.read_bits_leq32_signed(params.bits_per_sample)?;
            }
        }
        else {
            for s in out0.iter_mut() {
                *s = reader.read_bits_leq32_signed(params.bits_per_sample)?;
            }
        }
    }

    Ok(n)
}

/// Decodes one channel's residual block and runs the predictor over it in place.
fn decode_channel(
    params: &StreamParams,
    reader: &mut BitReaderLtr<'_>,
    sub: &mut SubframeHeader,
    output: &mut [i32],
    sample_size: u32,
) -> Result<()> {
    // The wire modifier rescales the stream's history multiplier in quarters.
    let multiplier = (sub.rice_modifier * params.history_multiplier) >> 2;

    rice::read_residual_block(
        reader,
        output,
        sample_size,
        params.initial_history,
        multiplier,
        params.maximum_k,
    )?;

    predictor::predict(output, sample_size, &mut sub.coefficients[..sub.order], sub.qlp_shift);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Decoder;
    use crate::StreamParams;

    use cadence_core::errors::Error;
    use cadence_core::io::{BitRecorder, WriteBitsLtr};

    fn decoder(channels: u32) -> Decoder {
        Decoder::try_new(StreamParams::new(channels, 16)).unwrap()
    }

    fn decode_first(decoder: &Decoder, recorder: &mut BitRecorder) -> Result<(), Error> {
        recorder.align().unwrap();
        decoder.framesets(recorder.bytes()).next().unwrap().map(|_| ())
    }

    #[test]
    fn verify_rejects_invalid_frame_channel_count() {
        let mut bits = BitRecorder::new();

        // A 3-bit tag of 3 would declare a four-channel frame.
        bits.write_bits_leq32(3, 3).unwrap();

        let result = decode_first(&decoder(2), &mut bits);
        assert!(matches!(result, Err(Error::InvalidFrameChannelCount(4))));
    }

    #[test]
    fn verify_rejects_excessive_frameset_channels() {
        let mut bits = BitRecorder::new();

        // A channel-pair frame in a mono stream.
        bits.write_bits_leq32(1, 3).unwrap();

        let result = decode_first(&decoder(1), &mut bits);
        assert!(matches!(result, Err(Error::ExcessiveFramesetChannels)));
    }

    #[test]
    fn verify_rejects_invalid_prediction_type() {
        let mut bits = BitRecorder::new();

        bits.write_bits_leq32(0, 3).unwrap(); // single-channel frame
        bits.write_bits_leq32(0, 16).unwrap(); // reserved
        bits.write_bit(false).unwrap(); // no explicit sample count
        bits.write_bits_leq32(0, 2).unwrap(); // no split low bits
        bits.write_bit(false).unwrap(); // compressed
        bits.write_bits_leq32(0, 8).unwrap(); // interlacing shift
        bits.write_bits_leq32(0, 8).unwrap(); // interlacing leftweight
        bits.write_bits_leq32(15, 4).unwrap(); // prediction type

        let result = decode_first(&decoder(1), &mut bits);
        assert!(matches!(result, Err(Error::InvalidPredictionType(15))));
    }

    #[test]
    fn verify_rejects_oversized_block() {
        let mut bits = BitRecorder::new();

        bits.write_bits_leq32(0, 3).unwrap(); // single-channel frame
        bits.write_bits_leq32(0, 16).unwrap(); // reserved
        bits.write_bit(true).unwrap(); // explicit sample count
        bits.write_bits_leq32(0, 2).unwrap();
        bits.write_bit(true).unwrap(); // uncompressed
        bits.write_bits_leq32(5000, 32).unwrap(); // count exceeds the stream block size

        let result = decode_first(&decoder(1), &mut bits);
        assert!(matches!(result, Err(Error::InvalidBlockSize(5000))));
    }

    #[test]
    fn verify_rejects_block_size_mismatch() {
        let mut bits = BitRecorder::new();

        // Two uncompressed single-channel frames of different lengths.
        for count in [5u32, 6] {
            bits.write_bits_leq32(0, 3).unwrap();
            bits.write_bits_leq32(0, 16).unwrap();
            bits.write_bit(true).unwrap();
            bits.write_bits_leq32(0, 2).unwrap();
            bits.write_bit(true).unwrap();
            bits.write_bits_leq32(count, 32).unwrap();

            for i in 0..count {
                bits.write_bits_leq32_signed(i as i32, 16).unwrap();
            }
        }

        let result = decode_first(&decoder(2), &mut bits);
        assert!(matches!(result, Err(Error::FrameBlockSizeMismatch)));
    }

    #[test]
    fn verify_truncated_stream_is_an_io_error() {
        // A lone frame tag with nothing after it.
        let mut bits = BitRecorder::new();

        bits.write_bits_leq32(0, 3).unwrap();

        let result = decode_first(&decoder(1), &mut bits);
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn verify_empty_payload_yields_no_framesets() {
        assert!(decoder(2).framesets(&[]).next().is_none());
    }
}
