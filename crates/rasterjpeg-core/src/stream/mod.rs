//! Streaming encoder: accept an image in row batches, compress it on finalize.
//!
//! A [`StreamEncoder`] owns one slot per image row. Producers push batches top
//! to bottom with [`StreamEncoder::push_rows`] (interleaved bytes) or
//! [`StreamEncoder::push_packed_rows`] (packed `0xAARRGGBB` words, repacked to
//! BGR on arrival). Once the last row is in, [`StreamEncoder::finalize`] picks
//! a [`FinalizeStrategy`] by image size:
//!
//! - below [`EncoderConfig::batch_threshold_bytes`](crate::EncoderConfig): one
//!   contiguous copy and a single codec call
//! - at or above it: rows fed to the codec incrementally, never holding a second
//!   full copy of the image
//!
//! Both produce interchangeable codestreams.
//!
//! ```text
//! Open --push_rows--> Open --(last row)--> Ready --finalize--> Closed
//! ```

mod finalize;
mod session;

pub use finalize::FinalizeStrategy;
pub use session::{SessionState, StreamEncoder};
