//! Encoder tuning knobs.

use serde::{Deserialize, Serialize};

use crate::codec::ChromaSubsampling;

/// Image byte size at or above which finalize switches to the scanline path.
///
/// Empirical value; override with [`EncoderConfig::with_batch_threshold_bytes`].
pub const DEFAULT_BATCH_THRESHOLD_BYTES: u64 = 1_500_000_000;

/// Rows handed to the incremental codec per call on the scanline path.
pub const DEFAULT_SCANLINE_BATCH_ROWS: usize = 5000;

/// Pushed batches shorter than this are copied on the calling thread.
pub const DEFAULT_PARALLEL_COPY_MIN_ROWS: usize = 64;

/// Configuration shared by streaming sessions, the tile encoder and one-shot encodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Worker thread hint; `0` resolves to the number of available cores.
    pub threads: usize,
    /// Finalize threshold between the batch and scanline paths.
    pub batch_threshold_bytes: u64,
    /// Rows per incremental codec call.
    pub scanline_batch_rows: usize,
    /// Minimum batch size before row conversion fans out to worker threads.
    pub parallel_copy_min_rows: usize,
    /// Chroma subsampling policy.
    pub subsampling: ChromaSubsampling,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_threshold_bytes: DEFAULT_BATCH_THRESHOLD_BYTES,
            scanline_batch_rows: DEFAULT_SCANLINE_BATCH_ROWS,
            parallel_copy_min_rows: DEFAULT_PARALLEL_COPY_MIN_ROWS,
            subsampling: ChromaSubsampling::default(),
        }
    }
}

impl EncoderConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread hint (`0` = auto).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the batch/scanline switch threshold in bytes.
    pub fn with_batch_threshold_bytes(mut self, bytes: u64) -> Self {
        self.batch_threshold_bytes = bytes;
        self
    }

    /// Set the rows per incremental codec call. Zero is treated as one.
    pub fn with_scanline_batch_rows(mut self, rows: usize) -> Self {
        self.scanline_batch_rows = rows.max(1);
        self
    }

    /// Set the minimum pushed batch size for parallel conversion.
    pub fn with_parallel_copy_min_rows(mut self, rows: usize) -> Self {
        self.parallel_copy_min_rows = rows;
        self
    }

    /// Set the chroma subsampling policy.
    pub fn with_subsampling(mut self, subsampling: ChromaSubsampling) -> Self {
        self.subsampling = subsampling;
        self
    }

    /// Thread hint to use for a batch of `rows` pushed rows.
    pub(crate) fn threads_for_rows(&self, rows: usize) -> usize {
        if rows < self.parallel_copy_min_rows {
            1
        } else {
            self.threads
        }
    }
}
