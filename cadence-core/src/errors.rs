// Cadence
// Copyright (c) 2026 The Project Cadence Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Cadence.
#[derive(Debug)]
pub enum Error {
    /// A parameter or argument provided to an entry point is not valid.
    InvalidArgument(&'static str),
    /// The stated bit depth is not supported by the codec.
    UnsupportedBitDepth(u32),
    /// An IO error occurred while reading or writing a stream.
    IoError(io::Error),
    /// A frame declared a channel count other than 1 or 2.
    InvalidFrameChannelCount(u32),
    /// The frames of a frameset declared more channels than the stream has.
    ExcessiveFramesetChannels,
    /// The frames of a frameset did not agree on a block size.
    FrameBlockSizeMismatch,
    /// A block size is zero or exceeds the stream block size.
    InvalidBlockSize(u32),
    /// A subframe declared a prediction type other than 0.
    InvalidPredictionType(u32),
    /// A residual did not fit its escape width. This is an internal recovery signal: the encoder
    /// catches it within one frame attempt and re-emits the frame uncompressed. It is never
    /// returned from a public entry point.
    ResidualOverflow,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidArgument(msg) => {
                write!(f, "invalid argument: {}", msg)
            }
            Error::UnsupportedBitDepth(bits) => {
                write!(f, "unsupported bit depth: {}", bits)
            }
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::InvalidFrameChannelCount(count) => {
                write!(f, "invalid frame channel count: {}", count)
            }
            Error::ExcessiveFramesetChannels => {
                write!(f, "frameset declares more channels than the stream")
            }
            Error::FrameBlockSizeMismatch => {
                write!(f, "frames within a frameset disagree on the block size")
            }
            Error::InvalidBlockSize(size) => {
                write!(f, "invalid block size: {}", size)
            }
            Error::InvalidPredictionType(ptype) => {
                write!(f, "invalid prediction type: {}", ptype)
            }
            Error::ResidualOverflow => {
                write!(f, "residual exceeded its escape width")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an invalid argument error.
pub fn invalid_argument_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::InvalidArgument(msg))
}
