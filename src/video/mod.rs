//! # Video Processing Module
//!
//! Probes source files, composes pillar-boxed frames and drives the external
//! ffmpeg decoder/encoder pair that produces the output file.

pub mod types;
pub mod loader;
pub mod composer;
pub mod exporter;

mod decoder;
mod encoder;
mod stderr;

#[cfg(test)]
pub(crate) mod test_support;

pub use types::{Asset, Frame, FrameRate, Size, Track, TrackKind};
pub use loader::AssetLoader;
pub use composer::{build_composition, centering_offset, FrameProducer, FrameRequest, VideoComposition};
pub use exporter::{ExportProgress, ExportSession, ExportStatus};
pub use encoder::{ExportPreset, OutputFileType};
