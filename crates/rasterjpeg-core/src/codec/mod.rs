//! The JPEG codec seam.
//!
//! This crate never implements JPEG itself. It drives a [`Codec`], which offers
//! two entry points:
//!
//! - [`Codec::compress`] - whole-image compression from one contiguous buffer
//! - [`Codec::begin_incremental`] - an [`IncrementalCompressor`] fed scanlines
//!   in batches, producing the same kind of codestream without the whole image
//!   ever being materialized
//!
//! A `Codec` value is a cheap, shareable factory. Every compression creates its
//! own codec instance internally, so one `Codec` can serve many threads at once
//! while no instance is ever shared between them.

mod jpeg;

pub use jpeg::{MozJpegCodec, MozJpegIncremental};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pixel::PixelLayout;

/// Errors reported by a codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Compression could not be started
    #[error("failed to start compression: {0}")]
    Start(String),

    /// Scanlines were rejected
    #[error("failed to write scanlines: {0}")]
    Write(String),

    /// The codestream could not be completed
    #[error("failed to finish compression: {0}")]
    Finish(String),

    /// The codec aborted by unwinding
    #[error("codec panicked: {0}")]
    Panicked(String),

    /// The request cannot be expressed to this codec
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Chroma subsampling applied to color images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    /// Full-resolution chroma.
    Cs444,
    /// Chroma halved horizontally.
    Cs422,
    /// Chroma halved in both directions.
    #[default]
    Cs420,
}

impl ChromaSubsampling {
    /// Horizontal and vertical chroma block size in luma pixels.
    #[inline]
    pub const fn pixel_sizes(self) -> (u8, u8) {
        match self {
            ChromaSubsampling::Cs444 => (1, 1),
            ChromaSubsampling::Cs422 => (2, 1),
            ChromaSubsampling::Cs420 => (2, 2),
        }
    }
}

/// Encoder behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompressFlags {
    /// Favor speed: baseline single-pass coding, no entropy or scan optimization.
    pub fast: bool,
}

impl CompressFlags {
    /// Speed-favoring flags.
    pub const FAST: Self = Self { fast: true };
    /// Codec default flags.
    pub const DEFAULT: Self = Self { fast: false };
}

/// Parameters shared by every compression call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressParams {
    /// Quality, 1-100 (callers clamp before building params).
    pub quality: u8,
    /// Chroma subsampling for color input.
    pub subsampling: ChromaSubsampling,
    /// Behavior switches.
    pub flags: CompressFlags,
}

impl CompressParams {
    /// Build params from a clamped quality and a subsampling policy.
    pub fn new(quality: u8, subsampling: ChromaSubsampling, flags: CompressFlags) -> Self {
        Self {
            quality,
            subsampling,
            flags,
        }
    }
}

/// Borrowed view of a whole image in one codec layout.
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    /// Pixel bytes, row-major.
    pub pixels: &'a [u8],
    /// Width in pixels.
    pub width: u32,
    /// Bytes between row starts; `0` means tightly packed.
    pub pitch: usize,
    /// Height in pixels.
    pub height: u32,
    /// Byte layout of each pixel.
    pub layout: PixelLayout,
}

impl<'a> ImageRef<'a> {
    /// View a tightly packed buffer.
    pub fn packed(pixels: &'a [u8], width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            pixels,
            width,
            pitch: 0,
            height,
            layout,
        }
    }

    /// Bytes of pixel data in one row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.layout.row_bytes(self.width)
    }

    /// Effective distance between row starts.
    #[inline]
    pub fn stride(&self) -> usize {
        if self.pitch == 0 {
            self.row_bytes()
        } else {
            self.pitch
        }
    }

    /// Minimum buffer length holding every row.
    pub fn required_len(&self) -> usize {
        match self.height as usize {
            0 => 0,
            h => (h - 1) * self.stride() + self.row_bytes(),
        }
    }

    /// Pixel bytes of row `y`, excluding any pitch padding.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride();
        &self.pixels[start..start + self.row_bytes()]
    }

    /// Check the buffer against the declared geometry.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.pitch != 0 && self.pitch < self.row_bytes() {
            return Err(CodecError::Unsupported(format!(
                "pitch {} is shorter than a row of {} bytes",
                self.pitch,
                self.row_bytes()
            )));
        }
        if self.pixels.len() < self.required_len() {
            return Err(CodecError::Unsupported(format!(
                "buffer holds {} bytes, image needs {}",
                self.pixels.len(),
                self.required_len()
            )));
        }
        Ok(())
    }
}

/// A scanline-fed compression in progress.
pub trait IncrementalCompressor {
    /// Append rows, top to bottom. Every row is one tightly packed scanline.
    fn write_rows(&mut self, rows: &[&[u8]]) -> Result<(), CodecError>;

    /// Complete the codestream once every row has been written.
    fn finish(self) -> Result<Vec<u8>, CodecError>;
}

/// A JPEG compressor factory.
pub trait Codec: Send + Sync {
    /// Incremental session type.
    type Incremental: IncrementalCompressor;

    /// Compress a whole image in one call.
    fn compress(
        &self,
        image: &ImageRef<'_>,
        params: &CompressParams,
    ) -> Result<Vec<u8>, CodecError>;

    /// Start an incremental compression of a `width` x `height` image whose rows
    /// will arrive in `layout`.
    fn begin_incremental(
        &self,
        width: u32,
        height: u32,
        layout: PixelLayout,
        params: &CompressParams,
    ) -> Result<Self::Incremental, CodecError>;

    /// Layout the incremental path accepts for rows stored in `stored`.
    ///
    /// Returns `stored` when it is accepted as-is; otherwise rows are reordered
    /// into the returned layout batch by batch before being written.
    fn incremental_layout(&self, stored: PixelLayout) -> PixelLayout {
        stored
    }
}

#[cfg(test)]
pub(crate) mod recording;
