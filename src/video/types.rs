use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Pixel dimensions of a frame, a track or the render canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of bytes an RGB24 frame of this size occupies, if it fits in memory
    pub fn rgb_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(3)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Represents a single video frame
///
/// This is a simple wrapper around an RGB image buffer, the pixel layout
/// used on both sides of the ffmpeg pipes.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        let buffer = ImageBuffer::new(width, height);
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Raw RGB bytes, row-major
    pub fn as_raw(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Mutable raw RGB bytes, row-major
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data)
            .map(|buffer| Self { buffer })
    }

    /// Give the raw RGB bytes back, to be reused as a read buffer
    pub fn into_raw(self) -> Vec<u8> {
        self.buffer.into_raw()
    }
}

/// Rational frame rate as reported by ffprobe (`30000/1001`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Parse ffprobe's `num/den` notation; `0/0` and garbage give `None`
    pub fn parse(value: &str) -> Option<Self> {
        let (num, den) = match value.split_once('/') {
            Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
            None => (value.trim().parse().ok()?, 1),
        };

        if num == 0 || den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl TrackKind {
    pub fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "subtitle" => Self::Subtitle,
            _ => Self::Other,
        }
    }
}

/// One stream of an input container
#[derive(Debug, Clone)]
pub struct Track {
    /// Stream index within the container
    pub index: usize,

    pub kind: TrackKind,

    pub codec: String,

    /// Untransformed pixel size (video only)
    pub natural_size: Option<Size>,

    /// Average frame rate (video only)
    pub frame_rate: Option<FrameRate>,

    /// Frame count, when the container records it
    pub frame_count: Option<u64>,

    /// Stream duration in seconds
    pub duration: Option<f64>,
}

impl Track {
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }
}

/// A probed source video file and its tracks
#[derive(Debug, Clone)]
pub struct Asset {
    pub path: PathBuf,

    pub tracks: Vec<Track>,

    /// Container duration in seconds
    pub duration: Option<f64>,
}

impl Asset {
    pub fn new<P: Into<PathBuf>>(path: P, tracks: Vec<Track>, duration: Option<f64>) -> Self {
        Self {
            path: path.into(),
            tracks,
            duration,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All video tracks, in container order
    pub fn video_tracks(&self) -> Vec<&Track> {
        self.tracks.iter().filter(|t| t.is_video()).collect()
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }

    /// Ordinal of a track among the asset's video tracks (`0:v:N` in ffmpeg terms)
    pub fn video_ordinal(&self, track: &Track) -> Option<usize> {
        self.tracks
            .iter()
            .filter(|t| t.is_video())
            .position(|t| t.index == track.index)
    }

    /// Best guess at how many frames the given track will decode to
    pub fn estimated_frame_count(&self, track: &Track) -> Option<u64> {
        if let Some(count) = track.frame_count.filter(|&c| c > 0) {
            return Some(count);
        }

        let duration = track.duration.or(self.duration)?;
        let fps = track.frame_rate?.as_f64();
        let estimate = (duration * fps).round();
        (estimate >= 1.0).then_some(estimate as u64)
    }
}
