//! One-shot encoding of an image already held in memory.
//!
//! For images that are complete before encoding starts. Producers that hand
//! over rows incrementally use [`StreamEncoder`](crate::StreamEncoder) instead.

use tracing::{debug, info};

use crate::codec::{Codec, CompressFlags, CompressParams, ImageRef, MozJpegCodec};
use crate::config::EncoderConfig;
use crate::convert::{convert_packed_rows, packed_as_native};
use crate::error::{EncodeError, Result};
use crate::pixel::{alloc_pixels, check_dimensions, clamp_quality, PixelLayout};

/// Layout packed pixels are converted into when they cannot be passed through.
const PACKED_FALLBACK_LAYOUT: PixelLayout = PixelLayout::Bgr;

/// Encode interleaved pixel data to JPEG bytes.
///
/// # Arguments
///
/// * `pixels` - Pixel data in `layout`, tightly packed, row-major order
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `quality` - JPEG quality (clamped to 1-100, where 100 is highest quality)
/// * `layout` - Channel order of `pixels`
///
/// # Quality Guidelines
///
/// * 90-100: High quality, suitable for archival or further editing
/// * 80-90: Good quality, recommended for most uses
/// * 60-80: Medium quality, acceptable for previews
/// * Below 60: Low quality, visible artifacts
///
/// # Example
///
/// ```ignore
/// use rasterjpeg_core::{encode, PixelLayout};
///
/// let pixels = vec![128u8; 100 * 100 * 3];
/// let jpeg = encode(&pixels, 100, 100, 90, PixelLayout::Rgb).unwrap();
/// assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
/// ```
pub fn encode(
    pixels: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    layout: PixelLayout,
) -> Result<Vec<u8>> {
    encode_with(
        &MozJpegCodec::new(),
        &EncoderConfig::default(),
        pixels,
        width,
        height,
        quality,
        layout,
    )
}

/// [`encode`] through an explicit codec and configuration.
pub fn encode_with<C: Codec>(
    codec: &C,
    config: &EncoderConfig,
    pixels: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    layout: PixelLayout,
) -> Result<Vec<u8>> {
    check_dimensions(width, height)?;
    let expected = layout.row_bytes(width) * height as usize;
    if pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: pixels.len(),
        });
    }

    let quality = clamp_quality(quality);
    let params = CompressParams::new(quality, config.subsampling, CompressFlags::FAST);
    let image = ImageRef::packed(pixels, width, height, layout);
    let codestream = codec.compress(&image, &params)?;

    info!(
        width,
        height,
        layout = ?layout,
        bytes_in = pixels.len(),
        bytes_out = codestream.len(),
        "image encoded"
    );
    Ok(codestream)
}

/// Encode packed `0xAARRGGBB` pixels (one native-endian `u32` each) to JPEG bytes.
///
/// Alpha is ignored. When the in-memory byte order of a packed word matches a
/// 4-channel layout the codec reads directly, the buffer is passed through
/// untouched; otherwise it is converted to BGR in parallel first.
pub fn encode_packed(pixels: &[u32], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    encode_packed_with(
        &MozJpegCodec::new(),
        &EncoderConfig::default(),
        pixels,
        width,
        height,
        quality,
    )
}

/// [`encode_packed`] through an explicit codec and configuration.
pub fn encode_packed_with<C: Codec>(
    codec: &C,
    config: &EncoderConfig,
    pixels: &[u32],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>> {
    check_dimensions(width, height)?;
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: pixels.len(),
        });
    }
    let quality = clamp_quality(quality);
    let params = CompressParams::new(quality, config.subsampling, CompressFlags::FAST);

    let codestream = match packed_as_native(pixels) {
        Some((bytes, layout)) => {
            debug!(layout = ?layout, "packed pixels passed through without conversion");
            let image = ImageRef {
                pixels: bytes,
                width,
                pitch: width as usize * 4,
                height,
                layout,
            };
            codec.compress(&image, &params)?
        }
        None => {
            let len = PACKED_FALLBACK_LAYOUT.row_bytes(width) * height as usize;
            let mut buffer = alloc_pixels(len)?;
            convert_packed_rows(
                pixels,
                width as usize,
                &mut buffer,
                PACKED_FALLBACK_LAYOUT,
                config.threads,
            );
            debug!(layout = ?PACKED_FALLBACK_LAYOUT, "packed pixels converted");
            let image = ImageRef::packed(&buffer, width, height, PACKED_FALLBACK_LAYOUT);
            codec.compress(&image, &params)?
        }
    };

    info!(width, height, bytes_out = codestream.len(), "packed image encoded");
    Ok(codestream)
}
