//! Pixel formats, codec byte layouts and the image descriptor.
//!
//! Two related notions live here:
//!
//! - [`PixelFormat`] is what a producer hands to a streaming session: three or
//!   four interleaved bytes per pixel, or one packed `0xAARRGGBB` word.
//! - [`PixelLayout`] is what the codec consumes: interleaved bytes in a fixed
//!   channel order.
//!
//! Every [`PixelFormat`] has exactly one [`PixelLayout`] its rows are stored in
//! once accepted (see [`PixelFormat::stored_layout`]).

use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Lowest accepted JPEG quality.
pub const MIN_QUALITY: u8 = 1;

/// Highest accepted JPEG quality.
pub const MAX_QUALITY: u8 = 100;

/// Clamp a quality value into `1..=100`.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Interleaved byte layout of a pixel as handed to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelLayout {
    /// Red, green, blue.
    Rgb,
    /// Blue, green, red.
    Bgr,
    /// Red, green, blue, alpha.
    Rgba,
    /// Blue, green, red, alpha.
    Bgra,
    /// Red, green, blue, padding.
    Rgbx,
    /// Blue, green, red, padding.
    Bgrx,
    /// Single luma byte.
    Gray,
}

impl PixelLayout {
    /// Number of bytes one pixel occupies.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgb | PixelLayout::Bgr => 3,
            PixelLayout::Rgba | PixelLayout::Bgra | PixelLayout::Rgbx | PixelLayout::Bgrx => 4,
            PixelLayout::Gray => 1,
        }
    }

    /// Byte offsets of the red, green and blue channels inside one pixel.
    ///
    /// Returns `None` for [`PixelLayout::Gray`].
    #[inline]
    pub const fn rgb_offsets(self) -> Option<[usize; 3]> {
        match self {
            PixelLayout::Rgb | PixelLayout::Rgba | PixelLayout::Rgbx => Some([0, 1, 2]),
            PixelLayout::Bgr | PixelLayout::Bgra | PixelLayout::Bgrx => Some([2, 1, 0]),
            PixelLayout::Gray => None,
        }
    }

    /// Offset of the fourth byte (alpha or padding), if the layout has one.
    #[inline]
    pub const fn fourth_offset(self) -> Option<usize> {
        match self.bytes_per_pixel() {
            4 => Some(3),
            _ => None,
        }
    }

    /// Whether the layout carries color channels.
    #[inline]
    pub const fn is_color(self) -> bool {
        !matches!(self, PixelLayout::Gray)
    }

    /// Bytes in one tightly packed row of `width` pixels.
    #[inline]
    pub fn row_bytes(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }
}

/// Source pixel representation accepted by a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Interleaved red, green, blue bytes.
    Rgb,
    /// Interleaved blue, green, red bytes.
    Bgr,
    /// Interleaved red, green, blue, alpha bytes.
    Rgba,
    /// Interleaved blue, green, red, alpha bytes.
    Bgra,
    /// One native-endian `u32` per pixel holding `0xAARRGGBB`.
    ///
    /// Alpha is ignored; rows are repacked to [`PixelLayout::Bgr`] on push.
    PackedArgb,
}

impl PixelFormat {
    /// Layout rows of this format are stored in after a push.
    #[inline]
    pub const fn stored_layout(self) -> PixelLayout {
        match self {
            PixelFormat::Rgb => PixelLayout::Rgb,
            PixelFormat::Bgr => PixelLayout::Bgr,
            PixelFormat::Rgba => PixelLayout::Rgba,
            PixelFormat::Bgra => PixelLayout::Bgra,
            PixelFormat::PackedArgb => PixelLayout::Bgr,
        }
    }

    /// Whether pushed rows arrive as packed 32-bit words.
    #[inline]
    pub const fn is_packed(self) -> bool {
        matches!(self, PixelFormat::PackedArgb)
    }
}

/// Immutable description of an image being encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Image width in pixels (non-zero).
    pub width: u32,
    /// Image height in pixels (non-zero).
    pub height: u32,
    /// Source pixel format.
    pub format: PixelFormat,
    /// JPEG quality, already clamped to 1-100.
    pub quality: u8,
}

impl ImageDescriptor {
    /// Create a descriptor, rejecting empty images and clamping quality.
    pub fn new(
        width: u32,
        height: u32,
        quality: u8,
        format: PixelFormat,
    ) -> Result<Self, EncodeError> {
        check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            format,
            quality: clamp_quality(quality),
        })
    }

    /// Layout of stored rows.
    #[inline]
    pub fn layout(&self) -> PixelLayout {
        self.format.stored_layout()
    }

    /// Bytes in one stored row.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.layout().row_bytes(self.width)
    }

    /// Bytes the whole stored image occupies.
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.height as u64 * self.row_bytes() as u64
    }
}

/// Reject zero-sized images.
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<(), EncodeError> {
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Allocate a zeroed pixel buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_pixels(len: usize) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| EncodeError::OutOfMemory { bytes: len as u64 })?;
    buffer.resize(len, 0);
    Ok(buffer)
}
