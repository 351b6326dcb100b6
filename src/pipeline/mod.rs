//! # Encode Pipeline
//!
//! The engine ties path resolution, probing, composition and export together
//! into the single linear run the command line performs.

pub mod engine;

// Re-exports for convenience
pub use engine::{EncodeEngine, EncodedVideo};
