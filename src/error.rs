//! Error taxonomy for the capture pipeline

use std::io;

use thiserror::Error;

use crate::capture::session::SessionState;
use crate::capture::ring::SlotState;

/// Errors that are fatal to the call that produced them.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device {path} unavailable: {reason}")]
    DeviceUnavailable { path: String, reason: String },

    #[error("no acceptable mode for {width}x{height}@{fps}: {reason}")]
    NoAcceptableMode {
        width: u32,
        height: u32,
        fps: u32,
        reason: String,
    },

    #[error("buffer setup failed")]
    BufferSetup(#[source] io::Error),

    #[error("stream {transition} failed")]
    StreamTransition {
        transition: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("dequeue failed {failures} times in a row")]
    DequeueFailure {
        failures: u32,
        #[source]
        source: io::Error,
    },

    #[error("operation requires {expected:?} session, found {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    #[error("buffer slot {index}: {from:?} -> {to:?} is not allowed")]
    SlotTransition {
        index: usize,
        from: SlotState,
        to: SlotState,
    },
}

/// Per-frame JPEG decode failure. Never fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing SOI marker")]
    NoSoi,
    #[error("sample precision is not 8 bits")]
    NotEightBit,
    #[error("image height {image} smaller than destination {destination}")]
    HeightMismatch { image: u32, destination: u32 },
    #[error("image width {image} smaller than destination {destination}")]
    WidthMismatch { image: u32, destination: u32 },
    #[error("bad image dimensions {width}x{height}")]
    BadDimensions { width: u32, height: u32 },
    #[error("{0} components is too many")]
    TooManyComponents(u8),
    #[error("illegal sampling factor {h}x{v}")]
    IllegalSampling { h: u8, v: u8 },
    #[error("quantization table selector {0} out of range")]
    QuantSelector(u8),
    #[error("unsupported component layout")]
    UnsupportedLayout,
    #[error("scan references unknown component id {0}")]
    UnknownComponent(u8),
    #[error("not a baseline sequential DCT stream")]
    NotSequential,
    #[error("unexpected marker 0x{0:02x}")]
    WrongMarker(u8),
    #[error("missing EOI marker")]
    NoEoi,
    #[error("malformed table segment")]
    BadTables,
    #[error("destination of {got} bytes cannot hold {needed}")]
    DepthMismatch { needed: usize, got: usize },
    #[error("stream truncated")]
    Truncated,
    #[error("invalid Huffman code")]
    BadHuffmanCode,
    #[error("AC run past end of block")]
    AcOverflow,
}

impl DecodeError {
    /// Stable numeric code, one per failure kind.
    pub fn code(&self) -> u8 {
        match self {
            DecodeError::NoSoi => 1,
            DecodeError::NotEightBit => 2,
            DecodeError::HeightMismatch { .. } => 3,
            DecodeError::WidthMismatch { .. } => 4,
            DecodeError::BadDimensions { .. } => 5,
            DecodeError::TooManyComponents(_) => 6,
            DecodeError::IllegalSampling { .. } => 7,
            DecodeError::QuantSelector(_) => 8,
            DecodeError::UnsupportedLayout => 9,
            DecodeError::UnknownComponent(_) => 10,
            DecodeError::NotSequential => 11,
            DecodeError::WrongMarker(_) => 12,
            DecodeError::NoEoi => 13,
            DecodeError::BadTables => 14,
            DecodeError::DepthMismatch { .. } => 15,
            DecodeError::Truncated => 16,
            DecodeError::BadHuffmanCode => 17,
            DecodeError::AcOverflow => 18,
        }
    }
}

/// Pixel conversion argument errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("{which} buffer holds {got} bytes, needs {needed}")]
    BufferTooSmall {
        which: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("{width}x{height} does not fit the pixel grouping of this layout")]
    OddDimensions { width: usize, height: usize },
    #[error("stride {stride} shorter than row of {row} bytes")]
    StrideTooShort { stride: usize, row: usize },
    #[error("{0} layout cannot be converted here")]
    UnsupportedSource(&'static str),
}
