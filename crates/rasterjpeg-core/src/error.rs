//! Error types for encoding sessions, tiling and one-shot encodes.

use thiserror::Error;

use crate::codec::CodecError;
use crate::pixel::PixelFormat;

/// Errors that can occur while encoding.
///
/// None of these are retried internally; retrying (at a lower quality, a smaller
/// tile size, ...) is left to the caller.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// A row batch would run past the declared image height
    #[error("Row overflow: {received} rows received, pushing {pushed} exceeds height {height}")]
    Overflow {
        received: usize,
        pushed: usize,
        height: usize,
    },

    /// Finalize was called before every row arrived
    #[error("Incomplete image: {received} of {height} rows received")]
    IncompleteImage { received: usize, height: usize },

    /// The session was already finalized
    #[error("Session already finalized")]
    SessionClosed,

    /// The codec rejected the image or failed mid-stream
    #[error("Codec failure: {0}")]
    CodecFailure(#[from] CodecError),

    /// A pixel buffer could not be allocated
    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: u64 },

    /// Pixel data length doesn't match the declared geometry
    #[error("Invalid pixel data: expected {expected} elements, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Rows were pushed through the entry point of a different pixel format
    #[error("Pixel format mismatch: session expects {expected:?}, rows were pushed as {pushed}")]
    PixelFormatMismatch {
        expected: PixelFormat,
        pushed: &'static str,
    },

    /// Tile edge length of zero
    #[error("Invalid tile size: {0}")]
    InvalidTileSize(u32),
}

/// Result alias used throughout the crate.
pub type Result<T, E = EncodeError> = std::result::Result<T, E>;
