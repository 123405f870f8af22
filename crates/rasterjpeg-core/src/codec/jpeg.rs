//! JPEG compression through `mozjpeg` (libjpeg-turbo derived).
//!
//! libjpeg reports fatal errors by unwinding, so every call into the library is
//! wrapped in `catch_unwind` and surfaced as [`CodecError::Panicked`].
//!
//! Incremental sessions always use the fastest (baseline, single-pass) profile:
//! progressive or entropy-optimized coding would make libjpeg buffer every
//! coefficient of the image, defeating the purpose of feeding scanlines.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use mozjpeg::compress::CompressStarted;
use mozjpeg::{ColorSpace, Compress};
use tracing::trace;

use super::{Codec, CodecError, CompressParams, ImageRef, IncrementalCompressor};
use crate::pixel::PixelLayout;

/// Stateless factory for `mozjpeg` compressors.
#[derive(Debug, Clone, Copy, Default)]
pub struct MozJpegCodec;

impl MozJpegCodec {
    /// Create a codec.
    pub fn new() -> Self {
        Self
    }
}

fn input_color_space(layout: PixelLayout) -> ColorSpace {
    match layout {
        PixelLayout::Rgb => ColorSpace::JCS_EXT_RGB,
        PixelLayout::Bgr => ColorSpace::JCS_EXT_BGR,
        PixelLayout::Rgba => ColorSpace::JCS_EXT_RGBA,
        PixelLayout::Bgra => ColorSpace::JCS_EXT_BGRA,
        PixelLayout::Rgbx => ColorSpace::JCS_EXT_RGBX,
        PixelLayout::Bgrx => ColorSpace::JCS_EXT_BGRX,
        PixelLayout::Gray => ColorSpace::JCS_GRAYSCALE,
    }
}

/// Build a fresh compressor. Settings are applied in libjpeg's required order:
/// profile defaults first, then color space, then sampling and quality.
fn configure(
    width: u32,
    height: u32,
    layout: PixelLayout,
    params: &CompressParams,
    fast: bool,
) -> Compress {
    let mut comp = Compress::new(input_color_space(layout));
    comp.set_size(width as usize, height as usize);

    if fast {
        comp.set_fastest_defaults();
        comp.set_optimize_coding(false);
        comp.set_optimize_scans(false);
    }

    if layout.is_color() {
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        let sizes = params.subsampling.pixel_sizes();
        comp.set_chroma_sampling_pixel_sizes(sizes, sizes);
    }

    comp.set_quality(params.quality as f32);
    comp
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown libjpeg error".to_string()
    }
}

/// Run `f`, converting a libjpeg unwind into an error.
fn guarded<T>(f: impl FnOnce() -> Result<T, CodecError>) -> Result<T, CodecError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(CodecError::Panicked(panic_message(payload))))
}

/// Rough output size guess: about a tenth of the raw pixels.
fn estimated_output(width: u32, height: u32, layout: PixelLayout) -> usize {
    (layout.row_bytes(width) * height as usize / 10).max(4096)
}

impl Codec for MozJpegCodec {
    type Incremental = MozJpegIncremental;

    fn compress(
        &self,
        image: &ImageRef<'_>,
        params: &CompressParams,
    ) -> Result<Vec<u8>, CodecError> {
        image.validate()?;
        let rows = image.height as usize;
        let tight = image.stride() == image.row_bytes();

        guarded(|| {
            let (width, height, layout) = (image.width, image.height, image.layout);
            let comp = configure(width, height, layout, params, params.flags.fast);
            let output = Vec::with_capacity(estimated_output(width, height, layout));
            let mut started = comp
                .start_compress(output)
                .map_err(|e| CodecError::Start(e.to_string()))?;

            if tight {
                started
                    .write_scanlines(&image.pixels[..rows * image.row_bytes()])
                    .map_err(|e| CodecError::Write(e.to_string()))?;
            } else {
                for y in 0..rows {
                    started
                        .write_scanlines(image.row(y))
                        .map_err(|e| CodecError::Write(e.to_string()))?;
                }
            }

            started.finish().map_err(|e| CodecError::Finish(e.to_string()))
        })
    }

    fn begin_incremental(
        &self,
        width: u32,
        height: u32,
        layout: PixelLayout,
        params: &CompressParams,
    ) -> Result<MozJpegIncremental, CodecError> {
        let started = guarded(|| {
            let comp = configure(width, height, layout, params, true);
            comp.start_compress(Vec::with_capacity(estimated_output(width, height, layout)))
                .map_err(|e| CodecError::Start(e.to_string()))
        })?;

        Ok(MozJpegIncremental {
            started: Some(started),
            row_bytes: layout.row_bytes(width),
            rows_left: height as usize,
        })
    }
}

/// An in-progress `mozjpeg` scanline compression.
///
/// Dropping it before [`finish`](IncrementalCompressor::finish) discards the
/// partial codestream and releases the compressor.
pub struct MozJpegIncremental {
    started: Option<CompressStarted<Vec<u8>>>,
    row_bytes: usize,
    rows_left: usize,
}

impl MozJpegIncremental {
    /// Rows still expected before the codestream can be finished.
    pub fn rows_left(&self) -> usize {
        self.rows_left
    }
}

impl IncrementalCompressor for MozJpegIncremental {
    fn write_rows(&mut self, rows: &[&[u8]]) -> Result<(), CodecError> {
        if rows.len() > self.rows_left {
            return Err(CodecError::Write(format!(
                "{} rows written with only {} remaining",
                rows.len(),
                self.rows_left
            )));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != self.row_bytes) {
            return Err(CodecError::Write(format!(
                "row of {} bytes, expected {}",
                row.len(),
                self.row_bytes
            )));
        }
        let started = self
            .started
            .as_mut()
            .ok_or_else(|| CodecError::Write("compressor already failed".to_string()))?;

        let written = guarded(|| {
            for row in rows {
                started
                    .write_scanlines(row)
                    .map_err(|e| CodecError::Write(e.to_string()))?;
            }
            Ok(())
        });

        match written {
            Ok(()) => {
                self.rows_left -= rows.len();
                trace!(rows = rows.len(), rows_left = self.rows_left, "wrote scanlines");
                Ok(())
            }
            Err(err) => {
                // libjpeg state is undefined after an error; drop the compressor.
                self.started = None;
                Err(err)
            }
        }
    }

    fn finish(mut self) -> Result<Vec<u8>, CodecError> {
        let started = self
            .started
            .take()
            .ok_or_else(|| CodecError::Finish("compressor already failed".to_string()))?;
        if self.rows_left > 0 {
            return Err(CodecError::Finish(format!(
                "{} rows were never written",
                self.rows_left
            )));
        }
        guarded(|| started.finish().map_err(|e| CodecError::Finish(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ChromaSubsampling, CompressFlags};

    fn params(quality: u8, flags: CompressFlags) -> CompressParams {
        CompressParams::new(quality, ChromaSubsampling::Cs420, flags)
    }

    fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x * 255 / width) as u8);
                pixels.push((y * 255 / height) as u8);
                pixels.push(128);
            }
        }
        pixels
    }

    fn assert_jpeg_markers(bytes: &[u8]) {
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_compress_rgb() {
        let pixels = gradient_rgb(64, 48);
        let image = ImageRef::packed(&pixels, 64, 48, PixelLayout::Rgb);
        let jpeg = MozJpegCodec
            .compress(&image, &params(90, CompressFlags::FAST))
            .unwrap();

        assert_jpeg_markers(&jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_compress_default_flags() {
        let pixels = gradient_rgb(32, 32);
        let image = ImageRef::packed(&pixels, 32, 32, PixelLayout::Rgb);
        let jpeg = MozJpegCodec
            .compress(&image, &params(75, CompressFlags::DEFAULT))
            .unwrap();
        assert_jpeg_markers(&jpeg);
    }

    #[test]
    fn test_compress_bgrx_with_pitch() {
        // 5 pixels of BGRX per row plus 4 bytes of padding.
        let (width, height, pitch) = (5u32, 4u32, 24usize);
        let mut pixels = vec![0xEEu8; pitch * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let px = &mut pixels[y * pitch + x * 4..y * pitch + x * 4 + 4];
                px.copy_from_slice(&[0, 0, 255, 0]);
            }
        }
        let image = ImageRef {
            pitch,
            ..ImageRef::packed(&pixels, width, height, PixelLayout::Bgrx)
        };
        let jpeg = MozJpegCodec
            .compress(&image, &params(95, CompressFlags::FAST))
            .unwrap();

        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (width, height));
        let center = decoded.get_pixel(2, 2);
        assert!(
            center[0] > 200 && center[1] < 60 && center[2] < 60,
            "expected red, got {center:?}"
        );
    }

    #[test]
    fn test_compress_gray() {
        let pixels = vec![100u8; 16 * 16];
        let image = ImageRef::packed(&pixels, 16, 16, PixelLayout::Gray);
        let jpeg = MozJpegCodec
            .compress(&image, &params(90, CompressFlags::FAST))
            .unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_luma8();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert!(decoded.pixels().all(|p| p[0].abs_diff(100) <= 2));
    }

    #[test]
    fn test_compress_rejects_short_buffer() {
        let pixels = vec![0u8; 10];
        let image = ImageRef::packed(&pixels, 8, 8, PixelLayout::Rgb);
        let result = MozJpegCodec.compress(&image, &params(90, CompressFlags::FAST));
        assert!(matches!(result, Err(CodecError::Unsupported(_))));
    }

    #[test]
    fn test_incremental_matches_dimensions() {
        let (width, height) = (40u32, 30u32);
        let pixels = gradient_rgb(width, height);
        let row_bytes = width as usize * 3;

        let mut inc = MozJpegCodec
            .begin_incremental(width, height, PixelLayout::Rgb, &params(90, CompressFlags::FAST))
            .unwrap();
        for batch in pixels.chunks(row_bytes * 7) {
            let rows: Vec<&[u8]> = batch.chunks_exact(row_bytes).collect();
            inc.write_rows(&rows).unwrap();
        }
        assert_eq!(inc.rows_left(), 0);
        let jpeg = inc.finish().unwrap();

        assert_jpeg_markers(&jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (width, height));
    }

    #[test]
    fn test_incremental_rejects_wrong_row_length() {
        let mut inc = MozJpegCodec
            .begin_incremental(4, 2, PixelLayout::Rgb, &params(90, CompressFlags::FAST))
            .unwrap();
        let short = [0u8; 5];
        assert!(matches!(inc.write_rows(&[&short]), Err(CodecError::Write(_))));
    }

    #[test]
    fn test_incremental_rejects_extra_rows() {
        let mut inc = MozJpegCodec
            .begin_incremental(2, 1, PixelLayout::Rgb, &params(90, CompressFlags::FAST))
            .unwrap();
        let row = [0u8; 6];
        assert!(inc.write_rows(&[&row, &row]).is_err());
    }

    #[test]
    fn test_incremental_finish_before_all_rows() {
        let mut inc = MozJpegCodec
            .begin_incremental(2, 3, PixelLayout::Rgb, &params(90, CompressFlags::FAST))
            .unwrap();
        let row = [0u8; 6];
        inc.write_rows(&[&row]).unwrap();
        assert!(matches!(inc.finish(), Err(CodecError::Finish(_))));
    }
}
