//! Finalize strategies.
//!
//! Small images are copied into one contiguous buffer and compressed with a
//! single codec call. Images at or above
//! [`EncoderConfig::batch_threshold_bytes`] never get a full-image buffer: rows
//! are fed to the codec's incremental interface in fixed-size batches, and if
//! the codec wants a different channel order each batch is reordered through a
//! scratch buffer holding one batch.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{
    Codec, CodecError, CompressFlags, CompressParams, ImageRef, IncrementalCompressor,
};
use crate::config::EncoderConfig;
use crate::convert::reorder_row;
use crate::error::{EncodeError, Result};
use crate::parallel;
use crate::pixel::{alloc_pixels, ImageDescriptor};

/// How a completed session is handed to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizeStrategy {
    /// Copy every row into one buffer, then compress it in one call.
    Batch,
    /// Feed rows to an incremental compressor `batch_rows` at a time.
    Scanline {
        /// Rows per codec call.
        batch_rows: usize,
    },
}

impl FinalizeStrategy {
    /// Pick the strategy for an image of `total_bytes` stored bytes.
    pub fn select(total_bytes: u64, config: &EncoderConfig) -> Self {
        if total_bytes < config.batch_threshold_bytes {
            FinalizeStrategy::Batch
        } else {
            FinalizeStrategy::Scanline {
                batch_rows: config.scanline_batch_rows.max(1),
            }
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            FinalizeStrategy::Batch => "batch",
            FinalizeStrategy::Scanline { .. } => "scanline",
        }
    }

    /// Compress `rows` (one stored row per entry, top to bottom).
    pub(crate) fn run<C: Codec>(
        self,
        codec: &C,
        descriptor: &ImageDescriptor,
        config: &EncoderConfig,
        rows: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        debug_assert_eq!(rows.len(), descriptor.height as usize);
        let params =
            CompressParams::new(descriptor.quality, config.subsampling, CompressFlags::FAST);

        match self {
            FinalizeStrategy::Batch => encode_batch(codec, descriptor, config, &params, rows),
            FinalizeStrategy::Scanline { batch_rows } => {
                encode_scanlines(codec, descriptor, config, &params, rows, batch_rows.max(1))
            }
        }
    }
}

fn encode_batch<C: Codec>(
    codec: &C,
    descriptor: &ImageDescriptor,
    config: &EncoderConfig,
    params: &CompressParams,
    rows: &[Vec<u8>],
) -> Result<Vec<u8>> {
    let total = descriptor.total_bytes();
    let len = usize::try_from(total).map_err(|_| EncodeError::OutOfMemory { bytes: total })?;
    let row_bytes = descriptor.row_bytes();

    let mut buffer = alloc_pixels(len)?;
    parallel::for_each_chunk_mut(&mut buffer, row_bytes, config.threads, |range, out| {
        for (src, dst) in rows[range].iter().zip(out.chunks_exact_mut(row_bytes)) {
            dst.copy_from_slice(src);
        }
    });

    let (width, height) = (descriptor.width, descriptor.height);
    let image = ImageRef::packed(&buffer, width, height, descriptor.layout());
    Ok(codec.compress(&image, params)?)
}

fn encode_scanlines<C: Codec>(
    codec: &C,
    descriptor: &ImageDescriptor,
    config: &EncoderConfig,
    params: &CompressParams,
    rows: &[Vec<u8>],
    batch_rows: usize,
) -> Result<Vec<u8>> {
    let stored = descriptor.layout();
    let target = codec.incremental_layout(stored);
    if target.is_color() != stored.is_color() {
        return Err(CodecError::Unsupported(format!(
            "incremental path wants {target:?} for {stored:?} rows"
        ))
        .into());
    }

    let mut session =
        codec.begin_incremental(descriptor.width, descriptor.height, target, params)?;

    if target == stored {
        for (i, batch) in rows.chunks(batch_rows).enumerate() {
            let slices: Vec<&[u8]> = batch.iter().map(Vec::as_slice).collect();
            session.write_rows(&slices)?;
            debug!(batch = i, rows = batch.len(), "scanline batch written");
        }
    } else {
        let dst_row = target.row_bytes(descriptor.width);
        let mut scratch = alloc_pixels(batch_rows.min(rows.len()) * dst_row)?;

        for (i, batch) in rows.chunks(batch_rows).enumerate() {
            let out = &mut scratch[..batch.len() * dst_row];
            let threads = config.threads_for_rows(batch.len());
            parallel::for_each_chunk_mut(out, dst_row, threads, |range, chunk| {
                for (src, dst) in batch[range].iter().zip(chunk.chunks_exact_mut(dst_row)) {
                    reorder_row(src, stored, dst, target);
                }
            });

            let slices: Vec<&[u8]> = out.chunks_exact(dst_row).collect();
            session.write_rows(&slices)?;
            debug!(
                batch = i,
                rows = batch.len(),
                from = ?stored,
                to = ?target,
                "scanline batch reordered"
            );
        }
    }

    Ok(session.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::recording::{Event, RecordingCodec};
    use crate::codec::MozJpegCodec;
    use crate::pixel::{PixelFormat, PixelLayout};

    fn bgr_rows(width: u32, height: u32) -> Vec<Vec<u8>> {
        (0..height)
            .map(|y| {
                (0..width)
                    .flat_map(|x| [(x * 7 + y) as u8, (y * 3) as u8, (x ^ y) as u8])
                    .collect()
            })
            .collect()
    }

    fn descriptor(width: u32, height: u32, format: PixelFormat) -> ImageDescriptor {
        ImageDescriptor::new(width, height, 85, format).unwrap()
    }

    fn write_counts(events: &[Event]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::WriteRows { count } => Some(*count),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_select_by_threshold() {
        let config = EncoderConfig::new()
            .with_batch_threshold_bytes(1000)
            .with_scanline_batch_rows(16);

        assert_eq!(FinalizeStrategy::select(999, &config), FinalizeStrategy::Batch);
        assert_eq!(
            FinalizeStrategy::select(1000, &config),
            FinalizeStrategy::Scanline { batch_rows: 16 }
        );
    }

    #[test]
    fn test_default_threshold_routes_large_images() {
        let config = EncoderConfig::default();
        let desc = descriptor(30_000, 20_000, PixelFormat::Rgb);
        assert_eq!(desc.total_bytes(), 1_800_000_000);
        assert!(matches!(
            FinalizeStrategy::select(desc.total_bytes(), &config),
            FinalizeStrategy::Scanline { batch_rows: 5000 }
        ));
        assert_eq!(FinalizeStrategy::select(1_499_999_999, &config), FinalizeStrategy::Batch);
    }

    #[test]
    fn test_batch_path_single_compress_call() {
        let codec = RecordingCodec::new();
        let desc = descriptor(9, 5, PixelFormat::Bgr);
        let config = EncoderConfig::new().with_threads(3);

        FinalizeStrategy::Batch
            .run(&codec, &desc, &config, &bgr_rows(9, 5))
            .unwrap();

        let events = codec.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::Compress {
                width: 9,
                height: 5,
                layout: PixelLayout::Bgr,
                pitch: 0,
                fast: true,
                ..
            }
        ));
    }

    #[test]
    fn test_scanline_batches_cover_height() {
        let codec = RecordingCodec::new();
        let desc = descriptor(6, 10, PixelFormat::Bgr);

        FinalizeStrategy::Scanline { batch_rows: 4 }
            .run(&codec, &desc, &EncoderConfig::default(), &bgr_rows(6, 10))
            .unwrap();

        let events = codec.events();
        assert_eq!(write_counts(&events), vec![4, 4, 2]);
        assert_eq!(
            events.first(),
            Some(&Event::BeginIncremental {
                width: 6,
                height: 10,
                layout: PixelLayout::Bgr,
            })
        );
        assert_eq!(events.last(), Some(&Event::Finish));
    }

    #[test]
    fn test_paths_produce_identical_images() {
        let codec = RecordingCodec::new();
        let desc = descriptor(13, 21, PixelFormat::Bgr);
        let rows = bgr_rows(13, 21);
        let config = EncoderConfig::new().with_threads(4);

        let batch = FinalizeStrategy::Batch.run(&codec, &desc, &config, &rows).unwrap();
        let scan = FinalizeStrategy::Scanline { batch_rows: 5 }
            .run(&codec, &desc, &config, &rows)
            .unwrap();

        assert_eq!(batch, scan);
    }

    #[test]
    fn test_scanline_reorders_into_accepted_layout() {
        let plain = RecordingCodec::new();
        let picky = RecordingCodec::new().with_incremental_layout(PixelLayout::Rgb);
        let desc = descriptor(8, 9, PixelFormat::Bgr);
        let rows = bgr_rows(8, 9);
        let config = EncoderConfig::new().with_parallel_copy_min_rows(2);

        let expected = FinalizeStrategy::Batch.run(&plain, &desc, &config, &rows).unwrap();
        let reordered = FinalizeStrategy::Scanline { batch_rows: 4 }
            .run(&picky, &desc, &config, &rows)
            .unwrap();

        assert_eq!(expected, reordered);
        assert!(picky.events().contains(&Event::BeginIncremental {
            width: 8,
            height: 9,
            layout: PixelLayout::Rgb,
        }));
        assert_eq!(write_counts(&picky.events()), vec![4, 4, 1]);
    }

    #[test]
    fn test_scanline_rejects_color_mismatch() {
        let codec = RecordingCodec::new().with_incremental_layout(PixelLayout::Gray);
        let desc = descriptor(4, 4, PixelFormat::Rgb);
        let rows = vec![vec![0u8; 12]; 4];

        let err = FinalizeStrategy::Scanline { batch_rows: 2 }
            .run(&codec, &desc, &EncoderConfig::default(), &rows)
            .unwrap_err();
        assert!(matches!(err, EncodeError::CodecFailure(CodecError::Unsupported(_))));
        assert!(codec.events().is_empty());
    }

    fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
        let total: u64 = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| (x as i16 - y as i16).unsigned_abs() as u64)
            .sum();
        total as f64 / a.len() as f64
    }

    #[test]
    fn test_jpeg_paths_are_interchangeable() {
        let (width, height) = (96, 80);
        let desc = descriptor(width, height, PixelFormat::Bgr);
        let rows: Vec<Vec<u8>> = (0..height)
            .map(|y| {
                (0..width)
                    .flat_map(|x| [(x * 2) as u8, (y * 3) as u8, 100])
                    .collect()
            })
            .collect();
        let config = EncoderConfig::default();

        let batch = FinalizeStrategy::Batch
            .run(&MozJpegCodec, &desc, &config, &rows)
            .unwrap();
        let scan = FinalizeStrategy::Scanline { batch_rows: 16 }
            .run(&MozJpegCodec, &desc, &config, &rows)
            .unwrap();

        let a = image::load_from_memory(&batch).unwrap().to_rgb8();
        let b = image::load_from_memory(&scan).unwrap().to_rgb8();
        assert_eq!(a.dimensions(), (width, height));
        assert_eq!(b.dimensions(), (width, height));
        assert!(mean_abs_diff(a.as_raw(), b.as_raw()) < 2.0);
    }
}
