use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{CompositionError, Result};
use crate::video::types::{Asset, Frame, Size};

/// Context handed to a [`FrameProducer`] for every output frame
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest {
    /// Zero-based index of the output frame
    pub index: u64,

    /// Presentation time of the frame in seconds
    pub timestamp: f64,

    /// Size the produced frame must have
    pub render_size: Size,
}

/// Pull-based frame production: one call per output frame during export
pub trait FrameProducer: Send + Sync {
    /// Size of every frame this producer emits
    fn render_size(&self) -> Size;

    /// Derive one output frame from one decoded source frame
    ///
    /// An error here is terminal for the whole export.
    fn produce_frame(&self, source: &Frame, request: &FrameRequest) -> Result<Frame>;
}

/// Pillar-box composition: each source frame centered on a black canvas
#[derive(Debug, Clone)]
pub struct VideoComposition {
    render_size: Size,
    video_size: Size,
    offset: (i64, i64),
    background: Frame,
}

impl VideoComposition {
    pub fn render_size(&self) -> Size {
        self.render_size
    }

    /// Natural size of the source video track
    pub fn video_size(&self) -> Size {
        self.video_size
    }

    /// Translation applied to every source frame
    pub fn offset(&self) -> (i64, i64) {
        self.offset
    }
}

/// Translation that centers `video` within `render`
///
/// Halves are floored, so odd leftovers put the extra pixel on the right/bottom.
/// Negative values mean the source overhangs the canvas and gets clipped.
pub fn centering_offset(render: Size, video: Size) -> (i64, i64) {
    let dx = (render.width as i64 - video.width as i64).div_euclid(2);
    let dy = (render.height as i64 - video.height as i64).div_euclid(2);
    (dx, dy)
}

/// Build the pillar-box composition for the first video track of `asset`
pub fn build_composition(asset: &Asset, render_size: Size) -> Result<VideoComposition> {
    let video_tracks = asset.video_tracks();
    let video_track = video_tracks.first().ok_or_else(|| CompositionError::NoVideoTrack {
        path: asset.path().display().to_string(),
    })?;

    // The loader guarantees a size for video tracks
    let video_size = video_track.natural_size.ok_or_else(|| CompositionError::NoVideoTrack {
        path: asset.path().display().to_string(),
    })?;

    let background = black_background(render_size)?;
    let offset = centering_offset(render_size, video_size);

    info!(
        "Composing {} video into {} canvas at offset ({}, {})",
        video_size, render_size, offset.0, offset.1
    );

    Ok(VideoComposition {
        render_size,
        video_size,
        offset,
        background,
    })
}

fn black_background(size: Size) -> Result<Frame> {
    if size.is_empty() {
        return Err(CompositionError::BackgroundCreationFailed {
            reason: format!("render size {} has no area", size),
        }.into());
    }

    if size.rgb_len().is_none() {
        return Err(CompositionError::BackgroundCreationFailed {
            reason: format!("render size {} is too large", size),
        }.into());
    }

    Ok(Frame::new_black(size.width, size.height))
}

/// Overlapping span of a source axis placed at `offset` on a canvas axis of `canvas` pixels
///
/// Returns `(source_start, canvas_start, len)`, or `None` if nothing overlaps.
fn visible_span(offset: i64, source: u32, canvas: u32) -> Option<(usize, usize, usize)> {
    let start = offset.max(0);
    let end = (offset + source as i64).min(canvas as i64);
    if end <= start {
        return None;
    }
    Some(((start - offset) as usize, start as usize, (end - start) as usize))
}

impl FrameProducer for VideoComposition {
    fn render_size(&self) -> Size {
        self.render_size
    }

    fn produce_frame(&self, source: &Frame, request: &FrameRequest) -> Result<Frame> {
        let fail = |reason: String| CompositionError::FrameProcessingFailed {
            frame: request.index,
            reason,
        };

        if request.render_size != self.render_size {
            return Err(fail(format!(
                "requested {} but the composition renders {}",
                request.render_size, self.render_size
            )).into());
        }

        if source.size() != self.video_size {
            return Err(fail(format!(
                "source frame is {}, expected {}",
                source.size(),
                self.video_size
            )).into());
        }

        let mut output = self.background.clone();

        let spans = (
            visible_span(self.offset.0, self.video_size.width, self.render_size.width),
            visible_span(self.offset.1, self.video_size.height, self.render_size.height),
        );
        let ((src_x, dst_x, width), (src_y, dst_y, height)) = match spans {
            (Some(x), Some(y)) => (x, y),
            // Fully off-canvas: the frame is all background
            _ => return Ok(output),
        };

        let src_stride = self.video_size.width as usize * 3;
        let dst_stride = self.render_size.width as usize * 3;
        let row_bytes = width * 3;
        let src = source.as_raw();

        // Opaque RGB source, so source-atop reduces to a straight copy
        output
            .as_raw_mut()
            .par_chunks_exact_mut(dst_stride)
            .skip(dst_y)
            .take(height)
            .enumerate()
            .for_each(|(row, dst_row)| {
                let src_start = (src_y + row) * src_stride + src_x * 3;
                let dst_start = dst_x * 3;
                dst_row[dst_start..dst_start + row_bytes]
                    .copy_from_slice(&src[src_start..src_start + row_bytes]);
            });

        debug!("Composed frame {} at {:.3}s", request.index, request.timestamp);
        Ok(output)
    }
}
