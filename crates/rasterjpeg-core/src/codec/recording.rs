//! In-memory codec for tests.
//!
//! Instead of JPEG it emits a deterministic "codestream": an 8-byte header
//! (width, height as little-endian `u32`) followed by every pixel as RGB (or
//! raw luma). Whichever entry point produced it, equal images give equal bytes,
//! which makes batch/scanline equivalence checkable byte for byte. Every call is
//! logged for inspection.

use std::sync::{Arc, Mutex};

use super::{Codec, CodecError, CompressParams, ImageRef, IncrementalCompressor};
use crate::convert::reorder_row;
use crate::pixel::PixelLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Compress {
        width: u32,
        height: u32,
        layout: PixelLayout,
        pitch: usize,
        fast: bool,
        pixels_addr: usize,
    },
    BeginIncremental {
        width: u32,
        height: u32,
        layout: PixelLayout,
    },
    WriteRows {
        count: usize,
    },
    Finish,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingCodec {
    log: Arc<Mutex<Vec<Event>>>,
    incremental_layout: Option<PixelLayout>,
    fail_width: Option<u32>,
}

impl RecordingCodec {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Only accept `layout` on the incremental path.
    pub(crate) fn with_incremental_layout(mut self, layout: PixelLayout) -> Self {
        self.incremental_layout = Some(layout);
        self
    }

    /// Fail every whole-image compression of exactly this width.
    pub(crate) fn failing_width(mut self, width: u32) -> Self {
        self.fail_width = Some(width);
        self
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }
}

fn header(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out
}

fn append_canonical(out: &mut Vec<u8>, row: &[u8], layout: PixelLayout) {
    let target = if layout.is_color() {
        PixelLayout::Rgb
    } else {
        PixelLayout::Gray
    };
    let pixels = row.len() / layout.bytes_per_pixel();
    let start = out.len();
    out.resize(start + pixels * target.bytes_per_pixel(), 0);
    reorder_row(row, layout, &mut out[start..], target);
}

impl Codec for RecordingCodec {
    type Incremental = RecordingIncremental;

    fn compress(
        &self,
        image: &ImageRef<'_>,
        params: &CompressParams,
    ) -> Result<Vec<u8>, CodecError> {
        self.record(Event::Compress {
            width: image.width,
            height: image.height,
            layout: image.layout,
            pitch: image.pitch,
            fast: params.flags.fast,
            pixels_addr: image.pixels.as_ptr() as usize,
        });
        image.validate()?;
        if self.fail_width == Some(image.width) {
            return Err(CodecError::Write(format!("refusing width {}", image.width)));
        }

        let mut out = header(image.width, image.height);
        for y in 0..image.height as usize {
            append_canonical(&mut out, image.row(y), image.layout);
        }
        Ok(out)
    }

    fn begin_incremental(
        &self,
        width: u32,
        height: u32,
        layout: PixelLayout,
        _params: &CompressParams,
    ) -> Result<RecordingIncremental, CodecError> {
        if let Some(accepted) = self.incremental_layout {
            if accepted != layout {
                return Err(CodecError::Unsupported(format!(
                    "incremental path only takes {accepted:?}"
                )));
            }
        }
        self.record(Event::BeginIncremental {
            width,
            height,
            layout,
        });
        Ok(RecordingIncremental {
            log: Arc::clone(&self.log),
            layout,
            row_bytes: layout.row_bytes(width),
            out: header(width, height),
        })
    }

    fn incremental_layout(&self, stored: PixelLayout) -> PixelLayout {
        self.incremental_layout.unwrap_or(stored)
    }
}

pub(crate) struct RecordingIncremental {
    log: Arc<Mutex<Vec<Event>>>,
    layout: PixelLayout,
    row_bytes: usize,
    out: Vec<u8>,
}

impl IncrementalCompressor for RecordingIncremental {
    fn write_rows(&mut self, rows: &[&[u8]]) -> Result<(), CodecError> {
        self.log
            .lock()
            .unwrap()
            .push(Event::WriteRows { count: rows.len() });
        for row in rows {
            if row.len() != self.row_bytes {
                return Err(CodecError::Write("bad row length".to_string()));
            }
            append_canonical(&mut self.out, row, self.layout);
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, CodecError> {
        self.log.lock().unwrap().push(Event::Finish);
        Ok(self.out)
    }
}
