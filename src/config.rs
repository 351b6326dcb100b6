use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::{OutputFileType, Size},
};

/// Main configuration for the encoder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output naming and canvas settings
    pub output: OutputConfig,

    /// External encoder settings
    pub encoder: EncoderConfig,

    /// Progress reporting settings
    pub progress: ProgressConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.encoder.validate()?;
        self.progress.validate()?;
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Output naming and canvas configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Appended to the input file stem
    pub suffix: String,

    /// Extension of the output container
    pub extension: String,

    /// Canvas width in pixels
    pub render_width: u32,

    /// Canvas height in pixels
    pub render_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: "-Mastodon".to_string(),
            extension: "mov".to_string(),
            render_width: 1920,
            render_height: 1080,
        }
    }
}

impl OutputConfig {
    /// The fixed canvas every output frame is rendered into
    pub fn render_size(&self) -> Size {
        Size::new(self.render_width, self.render_height)
    }

    /// Container matching `extension`; only QuickTime and MPEG-4 are written
    pub fn file_type(&self) -> Result<OutputFileType> {
        OutputFileType::from_extension(&self.extension)
            .ok_or_else(|| invalid("output.extension", &self.extension).into())
    }

    fn validate(&self) -> Result<()> {
        if self.suffix.is_empty() {
            return Err(invalid("output.suffix", "\"\"").into());
        }

        self.file_type()?;

        // yuv420p needs even dimensions
        if self.render_width == 0 || self.render_width % 2 != 0 {
            return Err(invalid("output.render_width", self.render_width).into());
        }

        if self.render_height == 0 || self.render_height % 2 != 0 {
            return Err(invalid("output.render_height", self.render_height).into());
        }

        Ok(())
    }
}

/// Settings handed to the external ffmpeg/ffprobe tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg executable used for decoding and encoding
    pub ffmpeg_path: String,

    /// ffprobe executable used for reading track metadata
    pub ffprobe_path: String,

    /// Video encoder name
    pub video_codec: String,

    /// Constant rate factor (0-51, lower is better)
    pub crf: u8,

    /// Encoder speed preset
    pub speed_preset: String,

    /// Audio encoder name
    pub audio_codec: String,

    /// Audio bitrate
    pub audio_bitrate: String,

    /// Number of encoder threads
    pub threads: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            crf: 20,
            speed_preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            threads: num_cpus::get(),
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.is_empty() {
            return Err(invalid("encoder.ffmpeg_path", "\"\"").into());
        }

        if self.ffprobe_path.is_empty() {
            return Err(invalid("encoder.ffprobe_path", "\"\"").into());
        }

        if self.crf > 51 {
            return Err(invalid("encoder.crf", self.crf).into());
        }

        if self.threads == 0 {
            return Err(invalid("encoder.threads", self.threads).into());
        }

        Ok(())
    }
}

/// Progress reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Polling period in milliseconds
    pub interval_ms: u64,

    /// Setting this variable to "1" disables cursor escape codes
    pub plain_env_var: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            plain_env_var: "XCODE".to_string(),
        }
    }
}

impl ProgressConfig {
    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(invalid("progress.interval_ms", self.interval_ms).into());
        }
        Ok(())
    }
}
