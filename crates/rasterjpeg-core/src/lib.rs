//! RasterJPEG Core - Parallel JPEG encoding of large in-memory images
//!
//! This crate turns raster images that live in memory into JPEG codestreams,
//! using every core and keeping peak memory bounded:
//!
//! - [`StreamEncoder`] accepts an image in row batches and, once complete,
//!   compresses it either from one contiguous buffer or incrementally in
//!   scanline batches, depending on its size
//! - [`TileEncoder`] cuts an image into a tile grid and compresses every tile
//!   as an independent codestream on a pool of worker threads
//! - [`encode`] and [`encode_packed`] compress an image that is already whole
//!
//! JPEG itself is delegated to a [`Codec`]; [`MozJpegCodec`] is the default.
//!
//! # Logging
//!
//! Progress and failures are reported through `tracing`. The crate never
//! installs a subscriber.

pub mod codec;
pub mod config;
pub mod convert;
pub mod encode;
pub mod error;
pub mod parallel;
pub mod pixel;
pub mod stream;
pub mod tile;

pub use codec::{
    ChromaSubsampling, Codec, CodecError, CompressFlags, CompressParams, ImageRef,
    IncrementalCompressor, MozJpegCodec,
};
pub use config::EncoderConfig;
pub use encode::{encode, encode_packed, encode_packed_with, encode_with};
pub use error::{EncodeError, Result};
pub use pixel::{ImageDescriptor, PixelFormat, PixelLayout};
pub use stream::{FinalizeStrategy, SessionState, StreamEncoder};
pub use tile::{encode_tiles, EncodedTile, Tile, TileEncoder, TileGrid};
