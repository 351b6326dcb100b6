//! # encodeformastodon
//!
//! Encodes and resizes any input video in a format suitable for publishing to Mastodon.
//!
//! Every frame of the source video is centered on a black 1920×1080 canvas
//! (pillar-boxing when the aspect ratios differ) and the result is re-encoded
//! into `<stem>-Mastodon.mov` next to the input. Decoding and encoding go through
//! the system `ffmpeg`/`ffprobe`; compositing happens here on RGB frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use encodeformastodon::{config::Config, pipeline::EncodeEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = EncodeEngine::new(Config::default());
//! let encoded = engine.encode("holiday.mp4").await?;
//! println!("wrote {}", encoded.path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`paths`] - Input validation and output naming
//! - [`video`] - Probing, composition and the export session
//! - [`progress`] - Terminal progress reporting
//! - [`pipeline`] - The engine running all of the above
//! - [`config`] - Configuration management
//!
//! ## Custom frame production
//!
//! The export session pulls frames through the [`FrameProducer`](video::FrameProducer)
//! trait, so other per-frame rules can be plugged in:
//!
//! ```rust,no_run
//! use encodeformastodon::video::{Frame, FrameProducer, FrameRequest, Size};
//! use encodeformastodon::Result;
//!
//! struct Passthrough(Size);
//!
//! impl FrameProducer for Passthrough {
//!     fn render_size(&self) -> Size {
//!         self.0
//!     }
//!
//!     fn produce_frame(&self, source: &Frame, _request: &FrameRequest) -> Result<Frame> {
//!         Ok(source.clone())
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{EncoderError, Result},
    pipeline::{EncodeEngine, EncodedVideo},
};
