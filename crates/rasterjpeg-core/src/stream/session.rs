use std::mem;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::finalize::FinalizeStrategy;
use crate::codec::{Codec, MozJpegCodec};
use crate::config::EncoderConfig;
use crate::convert::convert_packed_row;
use crate::error::{EncodeError, Result};
use crate::parallel;
use crate::pixel::{ImageDescriptor, PixelFormat};

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Accepting rows.
    Open,
    /// Every row has arrived; waiting for finalize.
    Ready,
    /// Finalized. Row storage has been released.
    Closed,
}

/// Accumulates row batches of one image and compresses them on finalize.
///
/// Rows must be pushed by one producer, top to bottom. A session is finalized
/// at most once; after that every call fails with [`EncodeError::SessionClosed`].
pub struct StreamEncoder<C: Codec = MozJpegCodec> {
    descriptor: ImageDescriptor,
    config: EncoderConfig,
    codec: C,
    rows: Vec<Option<Vec<u8>>>,
    rows_received: usize,
    state: SessionState,
}

impl StreamEncoder {
    /// Start a session backed by `mozjpeg` with default configuration.
    pub fn new(width: u32, height: u32, quality: u8, format: PixelFormat) -> Result<Self> {
        Self::with_config(width, height, quality, format, EncoderConfig::default())
    }

    /// Start a session backed by `mozjpeg`.
    pub fn with_config(
        width: u32,
        height: u32,
        quality: u8,
        format: PixelFormat,
        config: EncoderConfig,
    ) -> Result<Self> {
        let descriptor = ImageDescriptor::new(width, height, quality, format)?;
        Self::with_codec(descriptor, config, MozJpegCodec::new())
    }
}

impl<C: Codec> StreamEncoder<C> {
    /// Start a session compressing through `codec`.
    pub fn with_codec(
        descriptor: ImageDescriptor,
        config: EncoderConfig,
        codec: C,
    ) -> Result<Self> {
        let height = descriptor.height as usize;
        let mut rows = Vec::new();
        rows.try_reserve_exact(height).map_err(|_| EncodeError::OutOfMemory {
            bytes: (height * mem::size_of::<Option<Vec<u8>>>()) as u64,
        })?;
        rows.resize(height, None);

        debug!(
            width = descriptor.width,
            height = descriptor.height,
            format = ?descriptor.format,
            quality = descriptor.quality,
            "stream session created"
        );

        Ok(Self {
            descriptor,
            config,
            codec,
            rows,
            rows_received: 0,
            state: SessionState::Open,
        })
    }

    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn rows_received(&self) -> usize {
        self.rows_received
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether every row has arrived.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// The strategy [`finalize`](Self::finalize) will use for this image.
    pub fn planned_strategy(&self) -> FinalizeStrategy {
        FinalizeStrategy::select(self.descriptor.total_bytes(), &self.config)
    }

    /// Append `row_count` interleaved byte rows in the session's pixel format.
    ///
    /// Returns the number of rows received so far.
    pub fn push_rows(&mut self, data: &[u8], row_count: usize) -> Result<usize> {
        if self.descriptor.format.is_packed() {
            self.check_open()?;
            return Err(EncodeError::PixelFormatMismatch {
                expected: self.descriptor.format,
                pushed: "interleaved bytes",
            });
        }
        let row_bytes = self.descriptor.row_bytes();
        let Some(range) = self.claim(row_count, data.len(), row_bytes)? else {
            return Ok(self.rows_received);
        };

        let threads = self.config.threads_for_rows(row_count);
        let start = range.start;
        parallel::for_each_chunk_mut(&mut self.rows[range], 1, threads, |batch, slots| {
            for (i, slot) in batch.zip(slots.iter_mut()) {
                *slot = Some(data[i * row_bytes..(i + 1) * row_bytes].to_vec());
            }
        });

        Ok(self.commit(start, row_count))
    }

    /// Append `row_count` rows of packed `0xAARRGGBB` pixels.
    ///
    /// Rows are repacked to three-byte BGR as they are stored. Returns the number
    /// of rows received so far.
    pub fn push_packed_rows(&mut self, data: &[u32], row_count: usize) -> Result<usize> {
        if !self.descriptor.format.is_packed() {
            self.check_open()?;
            return Err(EncodeError::PixelFormatMismatch {
                expected: self.descriptor.format,
                pushed: "packed ARGB words",
            });
        }
        let width = self.descriptor.width as usize;
        let Some(range) = self.claim(row_count, data.len(), width)? else {
            return Ok(self.rows_received);
        };

        let layout = self.descriptor.layout();
        let row_bytes = self.descriptor.row_bytes();
        let threads = self.config.threads_for_rows(row_count);
        let start = range.start;
        parallel::for_each_chunk_mut(&mut self.rows[range], 1, threads, |batch, slots| {
            for (i, slot) in batch.zip(slots.iter_mut()) {
                let mut row = vec![0u8; row_bytes];
                convert_packed_row(&data[i * width..(i + 1) * width], &mut row, layout);
                *slot = Some(row);
            }
        });

        Ok(self.commit(start, row_count))
    }

    /// Compress the accumulated rows.
    ///
    /// Fails with [`EncodeError::IncompleteImage`] (leaving the session open)
    /// until every row has arrived. Otherwise the session closes and all row
    /// storage is released, whether or not compression succeeds.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        match self.state {
            SessionState::Closed => return Err(EncodeError::SessionClosed),
            SessionState::Open => {
                return Err(EncodeError::IncompleteImage {
                    received: self.rows_received,
                    height: self.descriptor.height as usize,
                })
            }
            SessionState::Ready => {}
        }
        self.state = SessionState::Closed;

        let height = self.descriptor.height as usize;
        let received = self.rows_received;
        let rows: Vec<Vec<u8>> = mem::take(&mut self.rows)
            .into_iter()
            .collect::<Option<_>>()
            .ok_or(EncodeError::IncompleteImage { received, height })?;

        let strategy = self.planned_strategy();
        info!(
            strategy = strategy.name(),
            bytes = self.descriptor.total_bytes(),
            threshold = self.config.batch_threshold_bytes,
            "finalizing stream session"
        );

        let result = strategy.run(&self.codec, &self.descriptor, &self.config, &rows);
        drop(rows);

        match &result {
            Ok(codestream) => info!(
                strategy = strategy.name(),
                bytes_in = self.descriptor.total_bytes(),
                bytes_out = codestream.len(),
                "stream session encoded"
            ),
            Err(err) => warn!(strategy = strategy.name(), error = %err, "stream session failed"),
        }
        result
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            SessionState::Closed => Err(EncodeError::SessionClosed),
            _ => Ok(()),
        }
    }

    /// Validate a batch and return the slot range it will fill, or `None` for an
    /// empty batch.
    fn claim(&self, row_count: usize, len: usize, unit: usize) -> Result<Option<Range<usize>>> {
        self.check_open()?;
        let height = self.descriptor.height as usize;
        if row_count > height - self.rows_received {
            return Err(EncodeError::Overflow {
                received: self.rows_received,
                pushed: row_count,
                height,
            });
        }
        let expected = batch_len(row_count, unit, len)?;
        if len != expected {
            return Err(EncodeError::InvalidPixelData {
                expected,
                actual: len,
            });
        }
        if row_count == 0 {
            return Ok(None);
        }
        Ok(Some(self.rows_received..self.rows_received + row_count))
    }

    fn commit(&mut self, start: usize, row_count: usize) -> usize {
        self.rows_received += row_count;
        if self.rows_received == self.descriptor.height as usize {
            self.state = SessionState::Ready;
        }
        debug!(
            rows = ?(start..self.rows_received),
            received = self.rows_received,
            height = self.descriptor.height,
            "rows pushed"
        );
        self.rows_received
    }
}

/// Element count of a batch of `row_count` rows of `unit` elements.
fn batch_len(row_count: usize, unit: usize, actual: usize) -> Result<usize> {
    row_count.checked_mul(unit).ok_or(EncodeError::InvalidPixelData {
        expected: usize::MAX,
        actual,
    })
}
