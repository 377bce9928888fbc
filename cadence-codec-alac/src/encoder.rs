// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ALAC encoder.

use std::mem;

use log::{debug, trace};

use cadence_core::audio::PcmSource;
use cadence_core::errors::{invalid_argument_error, Error, Result};
use cadence_core::io::{BitRecorder, WriteBitsLtr};

use crate::{channel_groups, verify_stream_format, verify_tuning, EncoderOptions};
use crate::{dsp, predictor, rice, stereo};
use crate::{
    FRAMESET_END_TAG, INTERLACING_SHIFT, MAX_LPC_ORDER, MIN_PREDICTOR_SAMPLES, QLP_PRECISION,
    QLP_SHIFT, RICE_MODIFIER,
};

/// Byte size and PCM frame count of one frameset.
///
/// The encoder reports these in the order the framesets were written so that a container writer
/// can build its sample tables without reparsing the stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FramesetInfo {
    /// Size of the frameset in bytes. Framesets are always byte aligned.
    pub byte_size: u32,
    /// Number of PCM frames coded by the frameset.
    pub pcm_frames: u32,
}

/// Validated stream-wide encoding parameters.
struct Params {
    block_size: usize,
    channels: usize,
    bits_per_sample: u32,
    /// Number of low bytes per sample coded outside the predictor.
    lsb_bytes: u32,
    initial_history: u32,
    history_multiplier: u32,
    maximum_k: u32,
    min_leftweight: i32,
    max_leftweight: i32,
}

/// Per-channel analysis state: windowing, autocorrelation, prediction coefficients, and the
/// residual blocks competed at orders 4 and 8.
struct Analysis {
    window: Vec<f64>,
    windowed: Vec<f64>,
    autocorrelation: [f64; MAX_LPC_ORDER + 1],
    lp_coeffs: [[f64; MAX_LPC_ORDER]; MAX_LPC_ORDER],
    qlp4: [i32; 4],
    qlp8: [i32; 8],
    coefficients: [i32; MAX_LPC_ORDER],
    residuals: Vec<i32>,
    residual_block4: BitRecorder,
    residual_block8: BitRecorder,
}

/// Reusable encoder scratch, sized once from the block size.
struct Scratch {
    analysis: Analysis,
    channel_residuals: [BitRecorder; 2],
    interlaced_frame: BitRecorder,
    best_interlaced_frame: BitRecorder,
    frame: BitRecorder,
    correlated0: Vec<i32>,
    correlated1: Vec<i32>,
    shifted0: Vec<i32>,
    shifted1: Vec<i32>,
    low_bits: Vec<u32>,
}

/// Apple Lossless Audio Codec (ALAC) encoder.
pub struct Encoder {
    params: Params,
    scratch: Scratch,
    frameset: BitRecorder,
    block: Vec<i32>,
    channel_samples: Vec<Vec<i32>>,
}

impl Encoder {
    /// Instantiate an `Encoder` for a stream of the given channel count and bit depth.
    ///
    /// Bit depths of 16 and 24 are supported.
    pub fn try_new(options: &EncoderOptions, channels: u32, bits_per_sample: u32) -> Result<Encoder> {
        verify_stream_format(options.block_size, bits_per_sample, channels)?;
        verify_tuning(options.initial_history, options.history_multiplier, options.maximum_k)?;

        if options.min_leftweight < 0
            || options.min_leftweight > options.max_leftweight
            || options.max_leftweight > 127
        {
            return invalid_argument_error("alac: left weight range must satisfy 0 <= min <= max <= 127");
        }

        let block_size = options.block_size as usize;

        let params = Params {
            block_size,
            channels: channels as usize,
            bits_per_sample,
            lsb_bytes: (bits_per_sample - 16) / 8,
            initial_history: options.initial_history,
            history_multiplier: options.history_multiplier,
            maximum_k: options.maximum_k,
            min_leftweight: options.min_leftweight,
            max_leftweight: options.max_leftweight,
        };

        let analysis = Analysis {
            window: dsp::tukey_window(block_size),
            windowed: Vec::with_capacity(block_size),
            autocorrelation: [0.0; MAX_LPC_ORDER + 1],
            lp_coeffs: [[0.0; MAX_LPC_ORDER]; MAX_LPC_ORDER],
            qlp4: [0; 4],
            qlp8: [0; 8],
            coefficients: [0; MAX_LPC_ORDER],
            residuals: Vec::with_capacity(block_size),
            residual_block4: BitRecorder::new(),
            residual_block8: BitRecorder::new(),
        };

        let scratch = Scratch {
            analysis,
            channel_residuals: [BitRecorder::new(), BitRecorder::new()],
            interlaced_frame: BitRecorder::new(),
            best_interlaced_frame: BitRecorder::new(),
            frame: BitRecorder::new(),
            correlated0: Vec::with_capacity(block_size),
            correlated1: Vec::with_capacity(block_size),
            shifted0: Vec::with_capacity(block_size),
            shifted1: Vec::with_capacity(block_size),
            low_bits: Vec::with_capacity(2 * block_size),
        };

        Ok(Encoder {
            params,
            scratch,
            frameset: BitRecorder::new(),
            block: Vec::with_capacity(block_size * channels as usize),
            channel_samples: vec![Vec::with_capacity(block_size); channels as usize],
        })
    }

    /// Encodes the whole of `source` to `sink`, one frameset per block of PCM frames, and returns
    /// the byte size and frame count of every frameset in the order written.
    ///
    /// On any error nothing is returned; whatever was already written to the sink is the caller's
    /// to discard.
    pub fn encode<W: WriteBitsLtr, S: PcmSource>(
        &mut self,
        sink: &mut W,
        source: &mut S,
    ) -> Result<Vec<FramesetInfo>> {
        if source.channels() as usize != self.params.channels
            || source.bits_per_sample() != self.params.bits_per_sample
        {
            return invalid_argument_error("alac: source format does not match the encoder");
        }

        let mut framesets = Vec::new();

        loop {
            let frames = source.read_frames(self.params.block_size, &mut self.block)?;

            if frames == 0 {
                break;
            }

            let Encoder {
                ref params,
                ref mut scratch,
                ref mut frameset,
                ref block,
                ref mut channel_samples,
            } = *self;

            for samples in channel_samples.iter_mut() {
                samples.clear();
            }

            for (i, &sample) in block.iter().take(frames * params.channels).enumerate() {
                channel_samples[i % params.channels].push(sample);
            }

            frameset.reset();
            write_frameset(params, scratch, frameset, channel_samples)?;
            frameset.write_to(sink)?;

            let info = FramesetInfo {
                byte_size: (frameset.num_bits_written() / 8) as u32,
                pcm_frames: frames as u32,
            };

            trace!(
                "alac: frameset {}: {} bytes, {} pcm frames",
                framesets.len(),
                info.byte_size,
                info.pcm_frames
            );

            framesets.push(info);

            // A short read marks the end of the stream.
            if frames < self.params.block_size {
                break;
            }
        }

        Ok(framesets)
    }
}

/// Encodes the whole of `source` to `sink` with the given options.
///
/// This is a convenience wrapper over [`Encoder::try_new`] and [`Encoder::encode`] that takes the
/// stream format from the source itself.
pub fn encode<W: WriteBitsLtr, S: PcmSource>(
    sink: &mut W,
    source: &mut S,
    options: &EncoderOptions,
) -> Result<Vec<FramesetInfo>> {
    Encoder::try_new(options, source.channels(), source.bits_per_sample())?.encode(sink, source)
}

/// Writes one frameset covering every channel of the block.
fn write_frameset<W: WriteBitsLtr>(
    p: &Params,
    s: &mut Scratch,
    writer: &mut W,
    chans: &[Vec<i32>],
) -> Result<()> {
    if let Some(groups) = channel_groups(p.channels) {
        for group in groups {
            writer.write_bits_leq32(group.len() as u32 - 1, 3)?;

            match **group {
                [ch] => write_frame(p, s, writer, &[chans[ch].as_slice()])?,
                [ch0, ch1] => {
                    write_frame(p, s, writer, &[chans[ch0].as_slice(), chans[ch1].as_slice()])?
                }
                _ => unreachable!(),
            }
        }
    }
    else {
        for ch in chans {
            writer.write_bits_leq32(0, 3)?;
            write_frame(p, s, writer, &[ch.as_slice()])?;
        }
    }

    writer.write_bits_leq32(FRAMESET_END_TAG, 3)?;
    writer.align()?;

    Ok(())
}

/// Writes one frame, compressed when prediction is feasible and pays off.
fn write_frame<W: WriteBitsLtr>(
    p: &Params,
    s: &mut Scratch,
    writer: &mut W,
    chans: &[&[i32]],
) -> Result<()> {
    if chans[0].len() < MIN_PREDICTOR_SAMPLES {
        return write_uncompressed_frame(p, writer, chans);
    }

    match write_compressed_frame(p, s, chans) {
        Ok(()) => Ok(s.frame.write_to(writer)?),
        Err(Error::ResidualOverflow) => {
            debug!("alac: residual overflow, re-emitting frame uncompressed");
            write_uncompressed_frame(p, writer, chans)
        }
        Err(err) => Err(err),
    }
}

/// Writes a compressed frame into the scratch's frame recorder. For a channel pair, every left
/// weight in the search range is coded and the shortest candidate kept. A pair whose difference
/// channel would be zero everywhere is always coded untransformed at weight 0.
fn write_compressed_frame(p: &Params, s: &mut Scratch, chans: &[&[i32]]) -> Result<()> {
    if chans.len() == 2 {
        // The decorrelator sees only the bits above the split-off low bytes.
        let shift = 8 * p.lsb_bytes;

        let zero_difference =
            chans[0].iter().zip(chans[1]).all(|(&s0, &s1)| s0 >> shift == s1 >> shift);

        if zero_difference && p.min_leftweight == 0 {
            write_interlaced_frame(p, s, chans, 0)?;
            mem::swap(&mut s.frame, &mut s.interlaced_frame);
            return Ok(());
        }

        let mut best_bits = None;

        for leftweight in p.min_leftweight..=p.max_leftweight {
            write_interlaced_frame(p, s, chans, leftweight)?;

            let bits = s.interlaced_frame.num_bits_written();

            // Strictly smaller, so ties resolve toward the lowest weight.
            if best_bits.map_or(true, |best| bits < best) {
                best_bits = Some(bits);
                mem::swap(&mut s.best_interlaced_frame, &mut s.interlaced_frame);
            }
        }

        mem::swap(&mut s.frame, &mut s.best_interlaced_frame);
    }
    else {
        write_interlaced_frame(p, s, chans, 0)?;
        mem::swap(&mut s.frame, &mut s.interlaced_frame);
    }

    Ok(())
}

/// Writes the frame header common to compressed and uncompressed frames.
fn write_frame_header<W: WriteBitsLtr>(
    p: &Params,
    writer: &mut W,
    n: usize,
    uncompressed: bool,
) -> Result<()> {
    writer.write_bits_leq32(0, 16)?;

    let has_sample_count = n != p.block_size;

    writer.write_bit(has_sample_count)?;
    writer.write_bits_leq32(if uncompressed { 0 } else { p.lsb_bytes }, 2)?;
    writer.write_bit(uncompressed)?;

    if has_sample_count {
        writer.write_bits_leq32(n as u32, 32)?;
    }

    Ok(())
}

/// Writes one complete compressed-frame candidate for the given left weight into the scratch's
/// interlaced frame recorder.
fn write_interlaced_frame(
    p: &Params,
    s: &mut Scratch,
    chans: &[&[i32]],
    leftweight: i32,
) -> Result<()> {
    let n = chans[0].len();
    let is_pair = chans.len() == 2;

    let Scratch {
        ref mut analysis,
        ref mut channel_residuals,
        ref mut interlaced_frame,
        ref mut correlated0,
        ref mut correlated1,
        ref mut shifted0,
        ref mut shifted1,
        ref mut low_bits,
        ..
    } = *s;

    let writer = interlaced_frame;
    writer.reset();

    write_frame_header(p, writer, n, false)?;

    if is_pair {
        writer.write_bits_leq32(INTERLACING_SHIFT, 8)?;
        writer.write_bits_leq32(leftweight as u32, 8)?;
    }
    else {
        writer.write_bits_leq32(0, 8)?;
        writer.write_bits_leq32(0, 8)?;
    }

    // Split off the low bytes of deep samples; the predictor codes only the upper bits.
    let shift = 8 * p.lsb_bytes;

    let mut ch0 = chans[0];
    let mut ch1: &[i32] = if is_pair { chans[1] } else { &[] };

    if shift > 0 {
        let mask = (1 << shift) - 1;

        low_bits.clear();
        shifted0.clear();
        shifted1.clear();

        for i in 0..n {
            low_bits.push(chans[0][i] as u32 & mask);
            shifted0.push(chans[0][i] >> shift);

            if is_pair {
                low_bits.push(chans[1][i] as u32 & mask);
                shifted1.push(chans[1][i] >> shift);
            }
        }

        ch0 = shifted0.as_slice();
        if is_pair {
            ch1 = shifted1.as_slice();
        }
    }

    // Decorrelating a pair widens the coded samples by one bit.
    let sample_size = p.bits_per_sample - shift + u32::from(is_pair);

    if is_pair && leftweight > 0 {
        stereo::correlate(ch0, ch1, leftweight, INTERLACING_SHIFT, correlated0, correlated1);
        ch0 = correlated0.as_slice();
        ch1 = correlated1.as_slice();
    }

    code_channel(p, analysis, ch0, sample_size, &mut channel_residuals[0], writer)?;

    if is_pair {
        code_channel(p, analysis, ch1, sample_size, &mut channel_residuals[1], writer)?;
    }

    // The low sample bits are interleaved channel-major between the subframe headers and the
    // residual blocks.
    if shift > 0 {
        for &bits in low_bits.iter() {
            writer.write_bits_leq32(bits, shift)?;
        }
    }

    channel_residuals[0].write_to(writer)?;

    if is_pair {
        channel_residuals[1].write_to(writer)?;
    }

    Ok(())
}

/// Analyses one channel, writes its subframe header into `writer`, and leaves its coded residual
/// block in `chosen`.
fn code_channel<W: WriteBitsLtr>(
    p: &Params,
    a: &mut Analysis,
    samples: &[i32],
    sample_size: u32,
    chosen: &mut BitRecorder,
    writer: &mut W,
) -> Result<()> {
    dsp::window_signal(&a.window, samples, &mut a.windowed);
    dsp::autocorrelate(&a.windowed, &mut a.autocorrelation);

    let order = if a.autocorrelation[0] != 0.0 {
        dsp::levinson(&a.autocorrelation, &mut a.lp_coeffs);
        dsp::quantize(&a.lp_coeffs[3][..4], &mut a.qlp4);
        dsp::quantize(&a.lp_coeffs[7], &mut a.qlp8);

        // The predictor adapts its coefficients as it runs, so each attempt works on a copy and
        // the header keeps the originals.
        a.coefficients[..4].copy_from_slice(&a.qlp4);
        predictor::compute_residuals(
            samples,
            sample_size,
            &mut a.coefficients[..4],
            &mut a.residuals,
        );
        a.residual_block4.reset();
        rice::write_residual_block(
            &mut a.residual_block4,
            &a.residuals,
            sample_size,
            p.initial_history,
            p.history_multiplier,
            p.maximum_k,
        )?;

        a.coefficients.copy_from_slice(&a.qlp8);
        predictor::compute_residuals(samples, sample_size, &mut a.coefficients, &mut a.residuals);
        a.residual_block8.reset();
        rice::write_residual_block(
            &mut a.residual_block8,
            &a.residuals,
            sample_size,
            p.initial_history,
            p.history_multiplier,
            p.maximum_k,
        )?;

        // Order 4 must beat order 8 by at least the extra coefficient bits the header would
        // carry.
        if a.residual_block4.num_bits_written() < a.residual_block8.num_bits_written() + 64 {
            4
        }
        else {
            8
        }
    }
    else {
        // A silent channel. Zero coefficients at order 4 reduce the residuals to plain first
        // differences.
        a.qlp4 = [0; 4];
        a.coefficients[..4].fill(0);
        predictor::compute_residuals(
            samples,
            sample_size,
            &mut a.coefficients[..4],
            &mut a.residuals,
        );
        a.residual_block4.reset();
        rice::write_residual_block(
            &mut a.residual_block4,
            &a.residuals,
            sample_size,
            p.initial_history,
            p.history_multiplier,
            p.maximum_k,
        )?;

        4
    };

    writer.write_bits_leq32(0, 4)?;
    writer.write_bits_leq32(QLP_SHIFT, 4)?;
    writer.write_bits_leq32(RICE_MODIFIER, 3)?;
    writer.write_bits_leq32(order as u32, 5)?;

    let qlp: &[i32] = if order == 4 { &a.qlp4 } else { &a.qlp8 };

    for &q in qlp {
        writer.write_bits_leq32_signed(q, QLP_PRECISION)?;
    }

    if order == 4 {
        chosen.swap(&mut a.residual_block4);
    }
    else {
        chosen.swap(&mut a.residual_block8);
    }

    Ok(())
}

/// Writes a frame of raw interleaved samples at the full stream bit depth.
fn write_uncompressed_frame<W: WriteBitsLtr>(
    p: &Params,
    writer: &mut W,
    chans: &[&[i32]],
) -> Result<()> {
    let n = chans[0].len();

    write_frame_header(p, writer, n, true)?;

    for i in 0..n {
        for ch in chans {
            writer.write_bits_leq32_signed(ch[i], p.bits_per_sample)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{encode, Encoder};
    use crate::EncoderOptions;

    use cadence_core::audio::BufSource;
    use cadence_core::io::BitWriterLtr;

    #[test]
    fn verify_silent_mono_frameset_layout() {
        // 4096 zero samples: one single-channel frame on the silent-block path, a one-value
        // residual block plus an escaped zero-run, then the terminator.
        let mut source = BufSource::new(vec![0i32; 4096], 1, 16).unwrap();
        let mut sink = BitWriterLtr::new(Vec::new());

        let framesets = encode(&mut sink, &mut source, &EncoderOptions::default()).unwrap();

        let buf = sink.into_inner().unwrap();

        assert_eq!(framesets.len(), 1);
        assert_eq!(framesets[0].pcm_frames, 4096);
        assert_eq!(framesets[0].byte_size as usize, buf.len());

        let mut expected = vec![0u8; 19];
        expected[5] = 0x13; // qlp shift 9 straddling the rice modifier
        expected[6] = 0x08; // prediction order 4
        expected[15] = 0xff;
        expected[16] = 0x87; // escape marker, then the 4095-sample zero run
        expected[17] = 0xff;
        expected[18] = 0xf0; // frameset terminator and padding

        assert_eq!(buf, expected);
    }

    #[test]
    fn verify_encoder_rejects_bad_formats() {
        let options = EncoderOptions::default();

        assert!(Encoder::try_new(&options, 2, 16).is_ok());
        assert!(Encoder::try_new(&options, 2, 24).is_ok());
        assert!(Encoder::try_new(&options, 2, 8).is_err());
        assert!(Encoder::try_new(&options, 2, 20).is_err());
        assert!(Encoder::try_new(&options, 0, 16).is_err());

        let options = EncoderOptions { block_size: 0, ..Default::default() };
        assert!(Encoder::try_new(&options, 1, 16).is_err());

        let options = EncoderOptions { min_leftweight: 3, max_leftweight: 1, ..Default::default() };
        assert!(Encoder::try_new(&options, 1, 16).is_err());

        let options = EncoderOptions { maximum_k: 0, ..Default::default() };
        assert!(Encoder::try_new(&options, 1, 16).is_err());
    }

    #[test]
    fn verify_encoder_rejects_mismatched_source() {
        let mut encoder = Encoder::try_new(&EncoderOptions::default(), 2, 16).unwrap();

        let mut source = BufSource::new(vec![0i32; 64], 1, 16).unwrap();
        let mut sink = BitWriterLtr::new(Vec::new());

        assert!(encoder.encode(&mut sink, &mut source).is_err());
    }
}
