use thiserror::Error;

/// Main error type for the encoder library
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while resolving or probing the input file
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Input file doesn't exist at {path}")]
    NotFound { path: String },

    #[error("Failed to probe input file {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Invalid media metadata: {details}")]
    InvalidMetadata { details: String },
}

/// Errors raised while building or evaluating a video composition
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("Couldn't find video track in input file {path}")]
    NoVideoTrack { path: String },

    #[error("Unable to create black background image: {reason}")]
    BackgroundCreationFailed { reason: String },

    #[error("Frame {frame} processing failed: {reason}")]
    FrameProcessingFailed { frame: u64, reason: String },
}

/// Errors raised by the export session
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create export session: {reason}")]
    SessionConstructionFailed { reason: String },

    #[error("Export session failed: {reason}")]
    ExportFailed { reason: String },

    #[error("Export session was already started")]
    AlreadyStarted,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EncoderError
pub type Result<T> = std::result::Result<T, EncoderError>;

impl EncoderError {
    /// Wrap any failure that happened while the export was running
    pub fn export_failed<S: Into<String>>(reason: S) -> Self {
        Self::Export(ExportError::ExportFailed { reason: reason.into() })
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Input(InputError::NotFound { path }) => {
                format!("Input file doesn't exist at {}. Please check the path and try again.", path)
            }
            Self::Input(InputError::ProbeFailed { path, .. }) => {
                format!("Could not read '{}'. Is it a video file, and is ffprobe installed?", path)
            }
            Self::Composition(CompositionError::NoVideoTrack { path }) => {
                format!("'{}' has no video track to encode.", path)
            }
            Self::Export(ExportError::SessionConstructionFailed { reason }) => {
                format!("Could not start encoding: {}", reason)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
