//! Tile-parallel encoding.
//!
//! The image is cut into a uniform grid of `tile_size` squares (edge tiles are
//! clipped to the image) and every tile is compressed as its own standalone
//! codestream. Tiles are not stitched back together; each result carries its
//! placement so the caller can reassemble them however it likes.
//!
//! Workers claim tiles from a shared atomic counter until it runs past the last
//! tile, so expensive tiles do not hold up a statically assigned share of the
//! work. Each result lands in its own write-once slot; the counter is the only
//! state the workers share.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{Codec, CodecError, CompressFlags, CompressParams, ImageRef, MozJpegCodec};
use crate::config::EncoderConfig;
use crate::convert::convert_packed_row;
use crate::error::{EncodeError, Result};
use crate::parallel::resolve_threads;
use crate::pixel::{alloc_pixels, check_dimensions, clamp_quality, PixelLayout};

/// Layout tiles are converted into before compression.
const TILE_LAYOUT: PixelLayout = PixelLayout::Bgr;

/// A rectangle of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Tile {
    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Number of pixels covered.
    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Tile) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// A grid of `tile_size` tiles over a `width` x `height` image, indexed row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    columns: u32,
    rows: u32,
}

impl TileGrid {
    /// Build the grid, rejecting empty images and a zero tile size.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        if tile_size == 0 {
            return Err(EncodeError::InvalidTileSize(tile_size));
        }
        Ok(Self {
            width,
            height,
            tile_size,
            columns: width.div_ceil(tile_size),
            rows: height.div_ceil(tile_size),
        })
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The tile at `index`, clipped to the image bounds.
    pub fn tile(&self, index: usize) -> Option<Tile> {
        if index >= self.len() {
            return None;
        }
        let column = (index % self.columns as usize) as u32;
        let row = (index / self.columns as usize) as u32;
        let x = column * self.tile_size;
        let y = row * self.tile_size;
        Some(Tile {
            x,
            y,
            width: self.tile_size.min(self.width - x),
            height: self.tile_size.min(self.height - y),
        })
    }

    /// All tiles in index order.
    pub fn iter(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.len()).filter_map(|i| self.tile(i))
    }
}

/// One tile's placement and its codestream, or why it failed.
#[derive(Debug)]
pub struct EncodedTile {
    pub tile: Tile,
    pub result: Result<Vec<u8>>,
}

impl EncodedTile {
    /// The codestream, if this tile compressed.
    pub fn codestream(&self) -> Option<&[u8]> {
        self.result.as_deref().ok()
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Compresses tiles of packed `0xAARRGGBB` images across worker threads.
#[derive(Debug, Clone)]
pub struct TileEncoder<C: Codec = MozJpegCodec> {
    codec: C,
    config: EncoderConfig,
}

impl TileEncoder {
    /// Tile encoder backed by `mozjpeg`.
    pub fn new(config: EncoderConfig) -> Self {
        Self::with_codec(MozJpegCodec::new(), config)
    }
}

impl<C: Codec> TileEncoder<C> {
    pub fn with_codec(codec: C, config: EncoderConfig) -> Self {
        Self { codec, config }
    }

    /// Compress every tile of `pixels` (`width * height` packed words).
    ///
    /// Fails as a whole only for invalid arguments. A tile the codec rejects is
    /// reported in its own [`EncodedTile::result`] and does not affect the others.
    pub fn encode(
        &self,
        pixels: &[u32],
        width: u32,
        height: u32,
        quality: u8,
        tile_size: u32,
    ) -> Result<Vec<EncodedTile>> {
        let grid = TileGrid::new(width, height, tile_size)?;
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(EncodeError::InvalidPixelData {
                expected,
                actual: pixels.len(),
            });
        }

        let params = CompressParams::new(
            clamp_quality(quality),
            self.config.subsampling,
            CompressFlags::FAST,
        );
        let count = grid.len();
        let workers = resolve_threads(self.config.threads).min(count);
        let next = AtomicUsize::new(0);
        let slots: Vec<OnceLock<EncodedTile>> = (0..count).map(|_| OnceLock::new()).collect();

        let work = || loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(tile) = grid.tile(index) else {
                break;
            };
            let encoded = self.encode_tile(pixels, width, index, tile, &params);
            let _ = slots[index].set(encoded);
        };

        if workers <= 1 {
            work();
        } else {
            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(work);
                }
            });
        }

        let tiles: Vec<EncodedTile> = slots
            .into_iter()
            .zip(grid.iter())
            .map(|(slot, tile)| {
                slot.into_inner().unwrap_or_else(|| EncodedTile {
                    tile,
                    result: Err(CodecError::Panicked("tile was never claimed".to_string()).into()),
                })
            })
            .collect();

        let failed = tiles.iter().filter(|t| !t.is_ok()).count();
        info!(tiles = count, failed, workers, tile_size, "tile encode finished");
        Ok(tiles)
    }

    fn encode_tile(
        &self,
        pixels: &[u32],
        stride: u32,
        index: usize,
        tile: Tile,
        params: &CompressParams,
    ) -> EncodedTile {
        let result = self.compress_tile(pixels, stride as usize, tile, params);
        match &result {
            Ok(codestream) => debug!(
                tile = index,
                x = tile.x,
                y = tile.y,
                width = tile.width,
                height = tile.height,
                bytes = codestream.len(),
                "tile encoded"
            ),
            Err(err) => warn!(tile = index, x = tile.x, y = tile.y, error = %err, "tile failed"),
        }
        EncodedTile { tile, result }
    }

    fn compress_tile(
        &self,
        pixels: &[u32],
        stride: usize,
        tile: Tile,
        params: &CompressParams,
    ) -> Result<Vec<u8>> {
        let (x, width) = (tile.x as usize, tile.width as usize);
        let row_bytes = TILE_LAYOUT.row_bytes(tile.width);
        let mut buffer = alloc_pixels(row_bytes * tile.height as usize)?;

        for (row, dst) in buffer.chunks_exact_mut(row_bytes).enumerate() {
            let start = (tile.y as usize + row) * stride + x;
            convert_packed_row(&pixels[start..start + width], dst, TILE_LAYOUT);
        }

        let image = ImageRef::packed(&buffer, tile.width, tile.height, TILE_LAYOUT);
        Ok(self.codec.compress(&image, params)?)
    }
}

/// Compress every tile of `pixels` with `mozjpeg` and the default configuration.
///
/// See [`TileEncoder::encode`].
pub fn encode_tiles(
    pixels: &[u32],
    width: u32,
    height: u32,
    quality: u8,
    tile_size: u32,
) -> Result<Vec<EncodedTile>> {
    TileEncoder::new(EncoderConfig::default()).encode(pixels, width, height, quality, tile_size)
}
