//! Pixel format conversion into codec-ready byte layouts.
//!
//! Conversion is pure repacking: channels are pulled out of packed words by
//! shift-and-mask (or moved between byte positions) with no rounding, color
//! transform or gamma handling.
//!
//! # Zero-copy
//!
//! A packed `0xAARRGGBB` word stored in native byte order may already be a
//! layout the codec understands (on little-endian targets the bytes read
//! `B G R A`, i.e. [`PixelLayout::Bgrx`]). [`native_packed_layout`] probes this
//! at runtime by byte and channel order instead of assuming it, and
//! [`packed_as_native`] reinterprets the buffer without rewriting a byte.

use crate::parallel;
use crate::pixel::PixelLayout;

/// Bit shift of the red channel in a packed `0xAARRGGBB` word.
pub const RED_SHIFT: u32 = 16;
/// Bit shift of the green channel.
pub const GREEN_SHIFT: u32 = 8;
/// Bit shift of the blue channel.
pub const BLUE_SHIFT: u32 = 0;
/// Bit shift of the alpha channel.
pub const ALPHA_SHIFT: u32 = 24;

/// Layouts a packed word could coincide with in memory.
const NATIVE_CANDIDATES: [PixelLayout; 2] = [PixelLayout::Bgrx, PixelLayout::Rgbx];

#[inline]
fn channel(word: u32, shift: u32) -> u8 {
    ((word >> shift) & 0xFF) as u8
}

/// Repack one row of `0xAARRGGBB` words into `layout`.
///
/// `dst` must hold `src.len() * layout.bytes_per_pixel()` bytes. The fourth
/// byte of 4-channel layouts receives the source alpha. Gray is not a valid
/// target: a packed pixel has no luma channel to reorder into.
pub fn convert_packed_row(src: &[u32], dst: &mut [u8], layout: PixelLayout) {
    let Some([r, g, b]) = layout.rgb_offsets() else {
        debug_assert!(false, "packed pixels cannot be repacked into {layout:?}");
        return;
    };
    let bpp = layout.bytes_per_pixel();
    debug_assert_eq!(dst.len(), src.len() * bpp);

    match layout.fourth_offset() {
        Some(a) => {
            for (&word, px) in src.iter().zip(dst.chunks_exact_mut(bpp)) {
                px[r] = channel(word, RED_SHIFT);
                px[g] = channel(word, GREEN_SHIFT);
                px[b] = channel(word, BLUE_SHIFT);
                px[a] = channel(word, ALPHA_SHIFT);
            }
        }
        None => {
            for (&word, px) in src.iter().zip(dst.chunks_exact_mut(bpp)) {
                px[r] = channel(word, RED_SHIFT);
                px[g] = channel(word, GREEN_SHIFT);
                px[b] = channel(word, BLUE_SHIFT);
            }
        }
    }
}

/// Repack `src` (rows of `width` packed words) into `dst`, in parallel by row range.
///
/// `dst` must hold `src.len() * layout.bytes_per_pixel()` bytes.
pub fn convert_packed_rows(
    src: &[u32],
    width: usize,
    dst: &mut [u8],
    layout: PixelLayout,
    threads: usize,
) {
    let row_bytes = width * layout.bytes_per_pixel();
    parallel::for_each_chunk_mut(dst, row_bytes, threads, |rows, out| {
        for (row, dst_row) in rows.zip(out.chunks_exact_mut(row_bytes)) {
            convert_packed_row(&src[row * width..(row + 1) * width], dst_row, layout);
        }
    });
}

/// Move the channels of one interleaved row from `from` order into `to` order.
///
/// Both layouts must be color, or both gray. A missing fourth byte on the
/// source side is written as opaque `0xFF`.
pub fn reorder_row(src: &[u8], from: PixelLayout, dst: &mut [u8], to: PixelLayout) {
    if from == to {
        dst.copy_from_slice(src);
        return;
    }
    let (Some(src_rgb), Some(dst_rgb)) = (from.rgb_offsets(), to.rgb_offsets()) else {
        debug_assert!(false, "cannot reorder {from:?} into {to:?}");
        return;
    };
    let (src_bpp, dst_bpp) = (from.bytes_per_pixel(), to.bytes_per_pixel());

    for (s, d) in src.chunks_exact(src_bpp).zip(dst.chunks_exact_mut(dst_bpp)) {
        for c in 0..3 {
            d[dst_rgb[c]] = s[src_rgb[c]];
        }
        if let Some(da) = to.fourth_offset() {
            d[da] = from.fourth_offset().map_or(0xFF, |sa| s[sa]);
        }
    }
}

/// Codec layout whose bytes coincide with a native-endian packed `0xAARRGGBB` word.
///
/// Verified by probing where each channel of a known word lands in memory.
pub fn native_packed_layout() -> Option<PixelLayout> {
    const PROBE: u32 = 0x4433_2211;
    let bytes = PROBE.to_ne_bytes();

    NATIVE_CANDIDATES.into_iter().find(|layout| {
        let (Some(rgb), Some(fourth)) = (layout.rgb_offsets(), layout.fourth_offset()) else {
            return false;
        };
        bytes[rgb[0]] == channel(PROBE, RED_SHIFT)
            && bytes[rgb[1]] == channel(PROBE, GREEN_SHIFT)
            && bytes[rgb[2]] == channel(PROBE, BLUE_SHIFT)
            && bytes[fourth] == channel(PROBE, ALPHA_SHIFT)
    })
}

/// View packed pixels as codec bytes without conversion, when the layouts coincide.
pub fn packed_as_native(pixels: &[u32]) -> Option<(&[u8], PixelLayout)> {
    native_packed_layout().map(|layout| (bytemuck::cast_slice(pixels), layout))
}
