use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::debug;

use crate::config::EncoderConfig;
use crate::error::{EncoderError, ExportError, Result};
use crate::video::stderr::StderrTail;
use crate::video::types::{Frame, FrameRate, Size};

/// Container written by the export session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFileType {
    Mov,
    Mp4,
}

impl OutputFileType {
    /// Name of the ffmpeg muxer
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mov => "mov",
            Self::Mp4 => "mp4",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mov" => Some(Self::Mov),
            "mp4" | "m4v" => Some(Self::Mp4),
            _ => None,
        }
    }
}

/// A fixed encode preset, tied to the render resolution
#[derive(Debug, Clone)]
pub struct ExportPreset {
    pub name: String,
    pub size: Size,
    pub video_codec: String,
    pub crf: u8,
    pub speed_preset: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub threads: usize,
}

impl ExportPreset {
    /// Preset named after its resolution (`1920x1080`), configured from `encoder`
    pub fn for_size(size: Size, encoder: &EncoderConfig) -> Self {
        Self {
            name: size.to_string(),
            size,
            video_codec: encoder.video_codec.clone(),
            crf: encoder.crf,
            speed_preset: encoder.speed_preset.clone(),
            pixel_format: "yuv420p".to_string(),
            audio_codec: encoder.audio_codec.clone(),
            audio_bitrate: encoder.audio_bitrate.clone(),
            threads: encoder.threads,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size.is_empty() {
            return Err(ExportError::SessionConstructionFailed {
                reason: format!("preset {} has an empty frame size", self.name),
            }.into());
        }
        if self.size.width % 2 != 0 || self.size.height % 2 != 0 {
            return Err(ExportError::SessionConstructionFailed {
                reason: format!(
                    "preset {} needs even dimensions for {} output",
                    self.name, self.pixel_format
                ),
            }.into());
        }
        Ok(())
    }
}

/// Everything the encoder process needs to know about one export
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Source file, used for its audio tracks
    pub source: PathBuf,
    pub map_audio: bool,
    pub frame_rate: FrameRate,
    pub output: PathBuf,
    pub file_type: OutputFileType,
}

pub fn is_ffmpeg_available(ffmpeg_path: &str) -> bool {
    Command::new(ffmpeg_path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Build the ffmpeg argument list for an export
pub(crate) fn encoder_args(preset: &ExportPreset, job: &EncodeJob) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        preset.size.to_string(),
        "-r".into(),
        job.frame_rate.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];

    if job.map_audio {
        args.push("-i".to_string());
        args.push(job.source.display().to_string());
        args.extend(["-map", "0:v:0", "-map", "1:a?"].map(String::from));
    } else {
        args.extend(["-map", "0:v:0", "-an"].map(String::from));
    }

    args.extend(["-c:v".to_string(), preset.video_codec.clone()]);
    args.extend(["-preset".to_string(), preset.speed_preset.clone()]);
    args.extend(["-crf".to_string(), preset.crf.to_string()]);
    args.extend(["-pix_fmt".to_string(), preset.pixel_format.clone()]);
    args.extend(["-threads".to_string(), preset.threads.to_string()]);

    if job.map_audio {
        args.extend(["-c:a".to_string(), preset.audio_codec.clone()]);
        args.extend(["-b:a".to_string(), preset.audio_bitrate.clone()]);
    }

    args.extend(["-f".to_string(), job.file_type.muxer().to_string()]);
    args
}

/// Feeds composed RGB24 frames into an ffmpeg child process
pub struct FrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: StderrTail,
    size: Size,
    frames_written: u64,
}

impl FrameWriter {
    pub fn spawn(ffmpeg_path: &str, preset: &ExportPreset, job: &EncodeJob) -> Result<Self> {
        let mut cmd = Command::new(ffmpeg_path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(encoder_args(preset, job))
            .arg(&job.output);

        debug!("Spawning encoder: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            EncoderError::export_failed(format!(
                "failed to spawn {} for encoding: {}",
                ffmpeg_path, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::export_failed("failed to open encoder stdin"))?;
        let stderr = StderrTail::start(child.stderr.take());

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            size: preset.size,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.size() != self.size {
            return Err(EncoderError::export_failed(format!(
                "frame size mismatch: got {}, expected {}",
                frame.size(),
                self.size
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(EncoderError::export_failed("encoder is already finalized"));
        };

        stdin.write_all(frame.as_raw()).map_err(|e| {
            EncoderError::export_failed(format!("failed to write frame to encoder: {}", e))
        })?;

        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close the input pipe and wait for the container to be written
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());

        let status = self.child.wait().map_err(|e| {
            EncoderError::export_failed(format!("failed to wait for encoder: {}", e))
        })?;
        let stderr = self.stderr.collect();

        if !status.success() {
            return Err(EncoderError::export_failed(format!(
                "encoder exited with status {}: {}",
                status, stderr
            )));
        }

        Ok(())
    }

    /// Kill the encoder and collect whatever it had to say
    pub fn abort(mut self) -> String {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.stderr.collect()
    }
}

/// Remove a partially written output; missing files are fine
pub(crate) fn discard_partial_output(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(map_audio: bool) -> EncodeJob {
        EncodeJob {
            source: PathBuf::from("/videos/clip.mp4"),
            map_audio,
            frame_rate: FrameRate::new(30000, 1001),
            output: PathBuf::from("/videos/clip-Mastodon.mov"),
            file_type: OutputFileType::Mov,
        }
    }

    fn preset() -> ExportPreset {
        ExportPreset::for_size(Size::new(1920, 1080), &EncoderConfig::default())
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_preset_named_after_size() {
        let preset = preset();
        assert_eq!(preset.name, "1920x1080");
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn test_odd_preset_rejected() {
        let preset = ExportPreset::for_size(Size::new(1919, 1080), &EncoderConfig::default());
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_args_describe_raw_input_and_mov_output() {
        let args = encoder_args(&preset(), &job(true));

        assert_eq!(value_after(&args, "-s"), Some("1920x1080"));
        assert_eq!(value_after(&args, "-r"), Some("30000/1001"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(args.last().map(String::as_str), Some("mov"));
        assert!(args.iter().any(|a| a == "1:a?"));
        assert!(args.iter().any(|a| a == "/videos/clip.mp4"));
    }

    #[test]
    fn test_args_without_audio() {
        let args = encoder_args(&preset(), &job(false));
        assert!(args.iter().any(|a| a == "-an"));
        assert!(!args.iter().any(|a| a == "-c:a"));
        assert!(!args.iter().any(|a| a == "/videos/clip.mp4"));
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(OutputFileType::from_extension("MOV"), Some(OutputFileType::Mov));
        assert_eq!(OutputFileType::from_extension("mp4"), Some(OutputFileType::Mp4));
        assert_eq!(OutputFileType::from_extension("avi"), None);
    }

    #[test]
    fn test_discard_missing_output_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discard_partial_output(&dir.path().join("nothing.mov")).is_ok());
    }
}
