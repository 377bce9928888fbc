// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements bit-oriented I/O over byte-oriented sources and sinks.
//!
//! All bit streams handled by Cadence are big-endian and MSB-first: the first bit read from or
//! written to a stream is the most-significant bit of the first byte. Readers operate over byte
//! slices, writers over anything implementing [`std::io::Write`], and the [`BitRecorder`] buffers
//! bits in memory so that alternative encodings can be measured before one is committed to an
//! outer stream.

mod bit;

pub use bit::huffman;
pub use bit::{BitReaderLtr, FiniteBitStream, ReadBitsLtr};
pub use bit::{BitRecorder, BitWriterLtr, WriteBitsLtr};
