// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The adaptive rice-style residual coder.
//!
//! Residuals are folded to unsigned by sign-magnitude interleaving and coded golomb-like against
//! a parameter derived from a running `history` register: large recent values raise the parameter,
//! small ones lower it. Two special behaviours ride on top of the plain code. First, a value whose
//! quotient exceeds 8 is escaped with a run of nine 1 bits followed by the value in raw binary.
//! Second, once the history decays below 128 the coder emits the length of the following run of
//! zero residuals as a single value, then primes the next coded value with a sign modifier.

use cadence_core::errors::{Error, Result};
use cadence_core::io::huffman::{HuffmanEntry, HuffmanTable};
use cadence_core::io::{ReadBitsLtr, WriteBitsLtr};

/// Value decoded from [`RICE_MSB_TABLE`] for the nine-ones escape marker.
const RICE_ESCAPE: u8 = 9;

const fn build_msb_table() -> [HuffmanEntry; 48] {
    // Runs of no ones fill every index whose top bit is a zero.
    let mut entries = [HuffmanEntry::Value { value: 0, len: 1 }; 48];

    // First sub-table, indexed with 5 bits: runs of 1 to 4 ones terminated by a zero. The
    // all-ones index links onward.
    let mut i = 16;
    while i < 24 {
        entries[i] = HuffmanEntry::Value { value: 1, len: 2 };
        i += 1;
    }
    while i < 28 {
        entries[i] = HuffmanEntry::Value { value: 2, len: 3 };
        i += 1;
    }
    while i < 30 {
        entries[i] = HuffmanEntry::Value { value: 3, len: 4 };
        i += 1;
    }
    entries[30] = HuffmanEntry::Value { value: 4, len: 5 };
    entries[31] = HuffmanEntry::Link { offset: 32, width: 4 };

    // Second sub-table, indexed with 4 more bits: runs of 5 to 8 ones, and the escape marker
    // for a run of 9.
    let mut i = 32;
    while i < 40 {
        entries[i] = HuffmanEntry::Value { value: 5, len: 1 };
        i += 1;
    }
    while i < 44 {
        entries[i] = HuffmanEntry::Value { value: 6, len: 2 };
        i += 1;
    }
    while i < 46 {
        entries[i] = HuffmanEntry::Value { value: 7, len: 3 };
        i += 1;
    }
    entries[46] = HuffmanEntry::Value { value: 8, len: 4 };
    entries[47] = HuffmanEntry::Value { value: RICE_ESCAPE, len: 4 };

    entries
}

static RICE_MSB_TABLE_DATA: [HuffmanEntry; 48] = build_msb_table();

/// Prefix-code table for the quotient of a coded residual: unary runs of 0 to 8 ones terminated
/// by a zero, or nine ones marking an escape.
static RICE_MSB_TABLE: HuffmanTable =
    HuffmanTable { entries: &RICE_MSB_TABLE_DATA, init_width: 5, max_code_len: 9 };

/// Folds a signed residual to unsigned by sign-magnitude interleaving.
#[inline(always)]
fn fold_residual(residual: i32) -> u32 {
    ((residual << 1) ^ (residual >> 31)) as u32
}

/// Unfolds a sign-magnitude interleaved value back to a signed residual.
#[inline(always)]
fn unfold_residual(value: u32) -> i32 {
    (value >> 1) as i32 ^ -((value & 0x1) as i32)
}

/// Gets the rice parameter selected by the current history.
#[inline(always)]
fn lg3a(history: u32) -> u32 {
    31 - ((history >> 9) + 3).leading_zeros()
}

/// Gets the rice parameter for a zero-run length. Only meaningful for histories below 128.
#[inline(always)]
fn zero_run_k(history: u32) -> u32 {
    debug_assert!(history < 128);
    history.leading_zeros() - 24 + ((history + 16) >> 6)
}

/// Decays the history and folds in the latest coded value.
#[inline(always)]
fn update_history(history: u32, value: u32, multiplier: u32) -> u32 {
    let h = u64::from(history);
    let m = u64::from(multiplier);

    (h + u64::from(value) * m - ((h * m) >> 9)) as u32
}

/// Writes one folded value at rice parameter `k`.
///
/// Values whose quotient exceeds 8 are escaped and written raw in `escape_width` bits; a value
/// too large even for that raises [`Error::ResidualOverflow`].
fn write_residual<W: WriteBitsLtr>(
    writer: &mut W,
    value: u32,
    k: u32,
    escape_width: u32,
) -> Result<()> {
    debug_assert!(k >= 1);

    let msb = value / ((1 << k) - 1);

    if msb > 8 {
        if u64::from(value) >= (1u64 << escape_width) {
            return Err(Error::ResidualOverflow);
        }

        writer.write_bits_leq32(0x1ff, 9)?;
        writer.write_bits_leq32(value, escape_width)?;
    }
    else {
        writer.write_unary_ones(msb)?;

        if k > 1 {
            let lsb = value % ((1 << k) - 1);

            // A remainder of 0 is written in one fewer bit; non-zero remainders are offset by one
            // to stay distinguishable from it.
            if lsb > 0 {
                writer.write_bits_leq32(lsb + 1, k)?;
            }
            else {
                writer.write_bits_leq32(0, k - 1)?;
            }
        }
    }

    Ok(())
}

/// Reads one folded value at rice parameter `k`, reading `escape_width` raw bits after an escape
/// marker.
fn read_residual<B: ReadBitsLtr>(reader: &mut B, k: u32, escape_width: u32) -> Result<u32> {
    let msb = reader.read_huffman(&RICE_MSB_TABLE)?;

    if msb == RICE_ESCAPE {
        return Ok(reader.read_bits_leq32(escape_width)?);
    }

    let prefix = u32::from(msb);

    let value = if k > 1 {
        // The quotient is multiplied by `(1 << k) - 1`, rewritten as a shift and subtract.
        let value = (prefix << k) - prefix;

        // Ideally `k` bits would be read but not consumed here, because a remainder below 2 only
        // occupies `k - 1` bits. The bit reader does not support peeking, so read the `k - 1`
        // top-most bits; if they are non-zero the remainder is wide and its final bit is read
        // separately.
        let suffix = reader.read_bits_leq32(k - 1)?;

        if suffix > 0 {
            value + (suffix << 1) + u32::from(reader.read_bit()?) - 1
        }
        else {
            value
        }
    }
    else if k == 1 {
        prefix
    }
    else {
        0
    };

    Ok(value)
}

/// Codes a block of residuals into `writer`.
///
/// Returns [`Error::ResidualOverflow`] if any value, or any zero-run length, exceeds its escape
/// width; the caller is expected to recover by abandoning the frame attempt.
pub(crate) fn write_residual_block<W: WriteBitsLtr>(
    writer: &mut W,
    residuals: &[i32],
    sample_size: u32,
    initial_history: u32,
    history_multiplier: u32,
    maximum_k: u32,
) -> Result<()> {
    let mut history = initial_history;
    let mut sign_modifier = 0;
    let mut i = 0;

    while i < residuals.len() {
        let value = fold_residual(residuals[i]);

        let k = lg3a(history).min(maximum_k);

        debug_assert!(sign_modifier == 0 || value > 0);
        write_residual(writer, value - sign_modifier, k, sample_size)?;

        sign_modifier = 0;

        if value > 0xffff {
            history = 0xffff;
            i += 1;
            continue;
        }

        history = update_history(history, value, history_multiplier);
        i += 1;

        // A low history signals a run of zeros: code the run length as one value instead.
        if history < 128 && i < residuals.len() {
            let k = zero_run_k(history).min(maximum_k);

            let zeros = residuals[i..].iter().take_while(|&&r| r == 0).count();

            write_residual(writer, zeros as u32, k, 16)?;

            if zeros < 0xffff {
                sign_modifier = 1;
            }

            history = 0;
            i += zeros;
        }
    }

    Ok(())
}

/// Decodes a block of residuals from `reader` into `output`, which must be zeroed on entry.
pub(crate) fn read_residual_block<B: ReadBitsLtr>(
    reader: &mut B,
    output: &mut [i32],
    sample_size: u32,
    initial_history: u32,
    history_multiplier: u32,
    maximum_k: u32,
) -> Result<()> {
    let out_len = output.len();

    let mut history = initial_history;
    let mut sign_modifier = 0;
    let mut zero_run_end = 0;

    for (i, sample) in output.iter_mut().enumerate() {
        // Inside a run of zeros the output is already correct.
        if i < zero_run_end {
            continue;
        }

        let k = lg3a(history).min(maximum_k);

        let value = read_residual(reader, k, sample_size)? + sign_modifier;

        *sample = unfold_residual(value);

        if value > 0xffff {
            history = 0xffff;
        }
        else {
            history = update_history(history, value, history_multiplier);
        }

        sign_modifier = 0;

        if history < 128 && i + 1 < out_len {
            let k = zero_run_k(history).min(maximum_k);

            let zeros = read_residual(reader, k, 16)?;

            if zeros < 0xffff {
                sign_modifier = 1;
            }

            history = 0;
            zero_run_end = i + 1 + zeros as usize;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{fold_residual, read_residual_block, unfold_residual, write_residual_block};

    use cadence_core::errors::Error;
    use cadence_core::io::{BitReaderLtr, BitRecorder, WriteBitsLtr};

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn round_trip(residuals: &[i32], sample_size: u32) {
        let mut recorder = BitRecorder::new();

        write_residual_block(&mut recorder, residuals, sample_size, 10, 40, 14).unwrap();
        recorder.align().unwrap();

        let mut reader = BitReaderLtr::new(recorder.bytes());
        let mut output = vec![0; residuals.len()];

        read_residual_block(&mut reader, &mut output, sample_size, 10, 40, 14).unwrap();

        assert_eq!(output, residuals);
    }

    #[test]
    fn verify_fold_residual() {
        assert_eq!(fold_residual(0), 0);
        assert_eq!(fold_residual(1), 2);
        assert_eq!(fold_residual(-1), 1);
        assert_eq!(fold_residual(2), 4);
        assert_eq!(fold_residual(-2), 3);
        assert_eq!(fold_residual(32_767), 65_534);
        assert_eq!(fold_residual(-32_768), 65_535);

        for r in -1000..1000 {
            assert_eq!(unfold_residual(fold_residual(r)), r);
        }
    }

    #[test]
    fn verify_round_trip_small_residuals() {
        let mut rng = SmallRng::seed_from_u64(0x33cc);

        let residuals: Vec<i32> = (0..4096).map(|_| rng.random_range(-8..=8)).collect();

        round_trip(&residuals, 16);
    }

    #[test]
    fn verify_round_trip_full_scale_residuals() {
        let mut rng = SmallRng::seed_from_u64(0x44dd);

        // Large values force the escape path.
        let residuals: Vec<i32> =
            (0..1024).map(|_| rng.random_range(-32_768..=32_767)).collect();

        round_trip(&residuals, 16);

        // 17-bit values whose folded form exceeds 0xffff pin the history at its ceiling.
        let residuals: Vec<i32> =
            (0..1024).map(|_| rng.random_range(-65_536..=65_535)).collect();

        round_trip(&residuals, 17);
    }

    #[test]
    fn verify_round_trip_zero_runs() {
        let mut rng = SmallRng::seed_from_u64(0x55ee);

        // Sparse spikes separated by runs of zeros exercise the run coder and sign modifier.
        let mut residuals = vec![0i32; 4096];
        for _ in 0..64 {
            let at = rng.random_range(0..residuals.len());
            residuals[at] = rng.random_range(-300..=300);
        }

        round_trip(&residuals, 16);

        // Runs reaching the end of the block, and a block that is nothing but zeros.
        residuals[4090..].fill(0);
        round_trip(&residuals, 16);
        round_trip(&vec![0; 4096], 16);
    }

    #[test]
    fn verify_all_zero_block_is_26_bits() {
        // One coded zero, then a single escaped run length covering the rest of the block.
        let mut recorder = BitRecorder::new();

        write_residual_block(&mut recorder, &vec![0; 4096], 16, 10, 40, 14).unwrap();

        assert_eq!(recorder.num_bits_written(), 1 + 9 + 16);
    }

    #[test]
    fn verify_oversized_zero_run_overflows() {
        // The run length is escaped with a width of 16 bits, so a long enough run cannot be
        // represented and the block must report an overflow.
        let mut residuals = vec![0i32; 70_000];
        residuals[0] = 1;

        let mut recorder = BitRecorder::new();

        match write_residual_block(&mut recorder, &residuals, 16, 10, 40, 14) {
            Err(Error::ResidualOverflow) => (),
            result => panic!("expected residual overflow, got {:?}", result),
        }
    }
}
