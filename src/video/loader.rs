use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{InputError, Result};
use crate::video::types::{Asset, FrameRate, Size, Track, TrackKind};

/// Reads track metadata from media files through an external ffprobe
pub struct AssetLoader {
    ffprobe_path: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl AssetLoader {
    pub fn new<S: Into<String>>(ffprobe_path: S) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Probe a media file and describe its tracks
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Asset> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        debug!("Probing {} with {}", path_str, self.ffprobe_path);

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InputError::ProbeFailed {
                path: path_str.clone(),
                reason: format!("failed to run {}: {}", self.ffprobe_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InputError::ProbeFailed {
                path: path_str,
                reason: format!("ffprobe exited with status {}: {}", output.status, stderr.trim()),
            }.into());
        }

        let json_output = String::from_utf8(output.stdout).map_err(|_| InputError::ProbeFailed {
            path: path_str.clone(),
            reason: "invalid ffprobe output".to_string(),
        })?;

        let asset = parse_probe_json(path, &json_output)?;

        for track in asset.video_tracks() {
            info!(
                "Video track {}: {} {} @ {} fps",
                track.index,
                track.codec,
                track.natural_size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string()),
                track.frame_rate.map(|r| format!("{:.2}", r.as_f64())).unwrap_or_else(|| "?".to_string()),
            );
        }

        Ok(asset)
    }
}

fn parse_number<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Turn ffprobe's `-print_format json` output into an [`Asset`]
pub(crate) fn parse_probe_json(path: &Path, json: &str) -> Result<Asset> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| InputError::ProbeFailed {
        path: path.display().to_string(),
        reason: format!("malformed ffprobe JSON: {}", e),
    })?;

    let mut tracks = Vec::with_capacity(probe.streams.len());
    for stream in probe.streams {
        let kind = TrackKind::from_codec_type(stream.codec_type.as_deref().unwrap_or(""));

        let natural_size = match (kind, stream.width, stream.height) {
            (TrackKind::Video, Some(w), Some(h)) if w > 0 && h > 0 => Some(Size::new(w, h)),
            (TrackKind::Video, w, h) => {
                return Err(InputError::InvalidMetadata {
                    details: format!(
                        "video stream {} has no usable size ({:?}x{:?})",
                        stream.index, w, h
                    ),
                }.into());
            }
            _ => None,
        };

        let frame_rate = match kind {
            TrackKind::Video => stream
                .avg_frame_rate
                .as_deref()
                .and_then(FrameRate::parse)
                .or_else(|| stream.r_frame_rate.as_deref().and_then(FrameRate::parse)),
            _ => None,
        };

        tracks.push(Track {
            index: stream.index,
            kind,
            codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
            natural_size,
            frame_rate,
            frame_count: parse_number(stream.nb_frames.as_deref()),
            duration: parse_number(stream.duration.as_deref()),
        });
    }

    let duration = probe
        .format
        .and_then(|f| parse_number(f.duration.as_deref()));

    Ok(Asset::new(path, tracks, duration))
}
