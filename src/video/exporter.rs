use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::task;
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::error::{EncoderError, ExportError, Result};
use crate::video::composer::{FrameProducer, FrameRequest};
use crate::video::decoder::FrameReader;
use crate::video::encoder::{
    discard_partial_output, is_ffmpeg_available, EncodeJob, ExportPreset, FrameWriter,
    OutputFileType,
};
use crate::video::types::{Asset, FrameRate, Size};

/// Lifecycle of an export session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Idle,
    Exporting,
    Completed,
    Failed,
}

impl ExportStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Exporting,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Exporting => 1,
            Self::Completed => 2,
            Self::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Progress and status of an export, shared between the exporter and observers
///
/// Only the exporter writes. Progress never decreases.
#[derive(Debug)]
pub struct ExportProgress {
    fraction: AtomicU64,
    status: AtomicU8,
}

impl Default for ExportProgress {
    fn default() -> Self {
        Self {
            fraction: AtomicU64::new(0f64.to_bits()),
            status: AtomicU8::new(ExportStatus::Idle.as_u8()),
        }
    }
}

impl ExportProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.fraction.load(Ordering::Acquire))
    }

    pub fn status(&self) -> ExportStatus {
        ExportStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Raise progress to `value`; lower values and NaN are ignored
    pub(crate) fn advance(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        let value = value.clamp(0.0, 1.0);
        if value > self.fraction() {
            self.fraction.store(value.to_bits(), Ordering::Release);
        }
    }

    pub(crate) fn set_status(&self, status: ExportStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }
}

/// Fraction reported while frames are still flowing; 1.0 is reserved for a finished file
const IN_FLIGHT_CAP: f64 = 0.99;

fn frame_fraction(written: u64, expected: Option<u64>) -> f64 {
    match expected {
        Some(total) if total > 0 => (written as f64 / total as f64).min(IN_FLIGHT_CAP),
        _ => 0.0,
    }
}

/// Single-use session that encodes an asset through a composition into an output file
pub struct ExportSession {
    asset: Asset,
    preset: ExportPreset,
    ffmpeg_path: String,
    composition: Option<Arc<dyn FrameProducer>>,
    output: Option<(PathBuf, OutputFileType)>,
    progress: Arc<ExportProgress>,
}

impl ExportSession {
    /// Bind a session to `asset` and `preset`
    ///
    /// Fails when the combination can't be exported at all.
    pub fn new(asset: Asset, preset: ExportPreset, encoder: &EncoderConfig) -> Result<Self> {
        preset.validate()?;

        if asset.video_tracks().is_empty() {
            return Err(ExportError::SessionConstructionFailed {
                reason: format!("{} has no video track", asset.path().display()),
            }.into());
        }

        if !is_ffmpeg_available(&encoder.ffmpeg_path) {
            return Err(ExportError::SessionConstructionFailed {
                reason: format!("{} not found. Please install FFmpeg.", encoder.ffmpeg_path),
            }.into());
        }

        debug!("Created export session with preset {}", preset.name);

        Ok(Self {
            asset,
            preset,
            ffmpeg_path: encoder.ffmpeg_path.clone(),
            composition: None,
            output: None,
            progress: Arc::new(ExportProgress::new()),
        })
    }

    pub fn set_video_composition(&mut self, composition: Arc<dyn FrameProducer>) {
        self.composition = Some(composition);
    }

    pub fn set_output<P: Into<PathBuf>>(&mut self, path: P, file_type: OutputFileType) {
        self.output = Some((path.into(), file_type));
    }

    /// Handle for observing progress from another task
    pub fn progress_handle(&self) -> Arc<ExportProgress> {
        Arc::clone(&self.progress)
    }

    pub fn progress(&self) -> f64 {
        self.progress.fraction()
    }

    pub fn status(&self) -> ExportStatus {
        self.progress.status()
    }

    /// Run the export to completion
    ///
    /// Suspends until the output is fully written or the export failed. On failure
    /// no output file is left behind.
    pub async fn export(&mut self) -> Result<()> {
        if self.status() != ExportStatus::Idle {
            return Err(ExportError::AlreadyStarted.into());
        }
        self.progress.set_status(ExportStatus::Exporting);

        match self.run().await {
            Ok(frames) => {
                self.progress.advance(1.0);
                self.progress.set_status(ExportStatus::Completed);
                info!("Export complete: {} frames", frames);
                Ok(())
            }
            Err(e) => {
                self.progress.set_status(ExportStatus::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<u64> {
        let composition = self.composition.clone().ok_or_else(|| {
            EncoderError::export_failed("no video composition was set")
        })?;
        let (output, file_type) = self.output.clone().ok_or_else(|| {
            EncoderError::export_failed("no output path was set")
        })?;

        if !output_directory_exists(&output) {
            return Err(EncoderError::export_failed(format!(
                "output directory for {} does not exist",
                output.display()
            )));
        }

        if composition.render_size() != self.preset.size {
            return Err(EncoderError::export_failed(format!(
                "composition renders {} but preset {} encodes {}",
                composition.render_size(),
                self.preset.name,
                self.preset.size
            )));
        }

        let plan = ExportPlan::new(&self.asset, &self.preset, &self.ffmpeg_path, output, file_type)?;
        let progress = Arc::clone(&self.progress);

        info!("Exporting {} to {}", self.asset.path().display(), plan.job.output.display());

        let output_path = plan.job.output.clone();
        let outcome = task::spawn_blocking(move || plan.run(composition.as_ref(), &progress))
            .await
            .map_err(|e| EncoderError::export_failed(format!("export task panicked: {}", e)))
            .and_then(|result| result);

        if outcome.is_err() {
            if let Err(cleanup) = discard_partial_output(&output_path) {
                warn!("Failed to remove partial output {}: {}", output_path.display(), cleanup);
            }
        }
        outcome
    }
}

/// Everything the blocking export loop needs, detached from the session
struct ExportPlan {
    ffmpeg_path: String,
    preset: ExportPreset,
    job: EncodeJob,
    video_ordinal: usize,
    video_size: Size,
    frame_rate: FrameRate,
    expected_frames: Option<u64>,
}

impl ExportPlan {
    fn new(
        asset: &Asset,
        preset: &ExportPreset,
        ffmpeg_path: &str,
        output: PathBuf,
        file_type: OutputFileType,
    ) -> Result<Self> {
        let track = asset.video_tracks().first().copied().ok_or_else(|| {
            EncoderError::export_failed("asset lost its video track")
        })?;
        let video_size = track.natural_size.ok_or_else(|| {
            EncoderError::export_failed("video track has no size")
        })?;
        let frame_rate = track.frame_rate.unwrap_or_default();

        Ok(Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            preset: preset.clone(),
            job: EncodeJob {
                source: asset.path().to_path_buf(),
                map_audio: asset.has_audio(),
                frame_rate,
                output,
                file_type,
            },
            video_ordinal: asset.video_ordinal(track).unwrap_or(0),
            video_size,
            frame_rate,
            expected_frames: asset.estimated_frame_count(track),
        })
    }

    /// Decode, compose and encode every frame; returns the number of frames written
    fn run(self, composition: &dyn FrameProducer, progress: &ExportProgress) -> Result<u64> {
        let mut reader = FrameReader::spawn(
            &self.ffmpeg_path,
            &self.job.source,
            self.video_ordinal,
            self.video_size,
        )?;

        let mut writer = match FrameWriter::spawn(&self.ffmpeg_path, &self.preset, &self.job) {
            Ok(writer) => writer,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };

        let render_size = composition.render_size();
        let fps = self.frame_rate.as_f64();
        let mut recycled = None;

        loop {
            let source = match reader.next_frame(recycled.take()) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => return Err(fail(reader, writer, e)),
            };

            let index = writer.frames_written();
            let request = FrameRequest {
                index,
                timestamp: index as f64 / fps,
                render_size,
            };

            let composed = match composition.produce_frame(&source, &request) {
                Ok(frame) => frame,
                Err(e) => return Err(fail(reader, writer, e)),
            };
            recycled = Some(source.into_raw());

            if let Err(e) = writer.write_frame(&composed) {
                return Err(fail(reader, writer, e));
            }

            progress.advance(frame_fraction(writer.frames_written(), self.expected_frames));
        }

        let frames = writer.frames_written();
        if frames == 0 {
            return Err(fail(
                reader,
                writer,
                EncoderError::export_failed("decoder produced no frames"),
            ));
        }

        debug!("Decoded {} frames, encoded {}", reader.frames_read(), frames);

        if let Err(e) = reader.finish() {
            let _ = writer.abort();
            return Err(e);
        }
        writer.finish()?;

        Ok(frames)
    }
}

/// Tear down both child processes, folding the encoder's diagnostics into the error
fn fail(reader: FrameReader, writer: FrameWriter, error: EncoderError) -> EncoderError {
    reader.abort();
    let stderr = writer.abort();
    if stderr.is_empty() {
        return error;
    }
    match error {
        EncoderError::Export(ExportError::ExportFailed { reason }) => {
            EncoderError::export_failed(format!("{} ({})", reason, stderr))
        }
        other => other,
    }
}

/// `true` if `path` can be written by the session, i.e. its directory exists
pub fn output_directory_exists(path: &Path) -> bool {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositionError;
    use crate::video::composer::{build_composition, VideoComposition};
    use crate::video::test_support::standin_ffmpeg;
    use crate::video::types::{Frame, Track, TrackKind};

    const SMALL_RENDER: Size = Size::new(8, 6);

    /// Five frames of 4x2 video, matching the stand-in decoder
    fn small_clip() -> Asset {
        Asset::new(
            "clip.mp4",
            vec![Track {
                index: 0,
                kind: TrackKind::Video,
                codec: "h264".to_string(),
                natural_size: Some(Size::new(4, 2)),
                frame_rate: Some(FrameRate::new(10, 1)),
                frame_count: Some(5),
                duration: Some(0.5),
            }],
            Some(0.5),
        )
    }

    fn standin_session() -> (ExportSession, VideoComposition) {
        let encoder = EncoderConfig {
            ffmpeg_path: standin_ffmpeg(),
            ..EncoderConfig::default()
        };
        let asset = small_clip();
        let composition = build_composition(&asset, SMALL_RENDER).unwrap();
        let preset = ExportPreset::for_size(SMALL_RENDER, &encoder);
        let session = ExportSession::new(asset, preset, &encoder).unwrap();
        (session, composition)
    }

    /// Centers like the real composition but gives up on one frame
    struct FailsAt {
        inner: VideoComposition,
        frame: u64,
    }

    impl FrameProducer for FailsAt {
        fn render_size(&self) -> Size {
            self.inner.render_size()
        }

        fn produce_frame(&self, source: &Frame, request: &FrameRequest) -> Result<Frame> {
            if request.index == self.frame {
                return Err(CompositionError::FrameProcessingFailed {
                    frame: request.index,
                    reason: "boom".to_string(),
                }
                .into());
            }
            self.inner.produce_frame(source, request)
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_writes_every_frame_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip-Mastodon.mov");
        let (mut session, composition) = standin_session();
        session.set_video_composition(Arc::new(composition));
        session.set_output(&output, OutputFileType::Mov);

        session.export().await.unwrap();

        assert_eq!(session.status(), ExportStatus::Completed);
        assert_eq!(session.progress(), 1.0);
        let written = std::fs::metadata(&output).unwrap().len();
        assert_eq!(written, 5 * SMALL_RENDER.rgb_len().unwrap() as u64);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, composition) = standin_session();
        session.set_video_composition(Arc::new(composition));
        session.set_output(dir.path().join("clip-Mastodon.mov"), OutputFileType::Mov);

        session.export().await.unwrap();
        let err = session.export().await.unwrap_err();

        assert!(matches!(err, EncoderError::Export(ExportError::AlreadyStarted)));
        assert_eq!(err.to_string(), "Export session was already started");
        assert_eq!(session.status(), ExportStatus::Completed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frame_failure_stops_export_and_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip-Mastodon.mov");
        let (mut session, composition) = standin_session();
        session.set_video_composition(Arc::new(FailsAt {
            inner: composition,
            frame: 2,
        }));
        session.set_output(&output, OutputFileType::Mov);

        let err = session.export().await.unwrap_err();

        assert!(matches!(
            err,
            EncoderError::Composition(CompositionError::FrameProcessingFailed { frame: 2, .. })
        ));
        assert_eq!(err.to_string(), "Frame 2 processing failed: boom");
        assert_eq!(session.status(), ExportStatus::Failed);
        assert!(session.progress() < 1.0);
        assert!(!output.exists());

        assert!(matches!(
            session.export().await.unwrap_err(),
            EncoderError::Export(ExportError::AlreadyStarted)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_without_composition_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _) = standin_session();
        session.set_output(dir.path().join("clip-Mastodon.mov"), OutputFileType::Mov);

        let err = session.export().await.unwrap_err();
        assert!(matches!(err, EncoderError::Export(ExportError::ExportFailed { .. })));
        assert_eq!(session.status(), ExportStatus::Failed);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let progress = ExportProgress::new();
        assert_eq!(progress.fraction(), 0.0);

        progress.advance(0.4);
        progress.advance(0.2);
        assert_eq!(progress.fraction(), 0.4);

        progress.advance(f64::NAN);
        assert_eq!(progress.fraction(), 0.4);

        progress.advance(3.0);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_status_roundtrip() {
        let progress = ExportProgress::new();
        assert_eq!(progress.status(), ExportStatus::Idle);
        for status in [ExportStatus::Exporting, ExportStatus::Completed, ExportStatus::Failed] {
            progress.set_status(status);
            assert_eq!(progress.status(), status);
        }
        assert!(ExportStatus::Failed.is_terminal());
        assert!(!ExportStatus::Exporting.is_terminal());
    }

    #[test]
    fn test_frame_fraction_stays_below_one_in_flight() {
        assert_eq!(frame_fraction(5, Some(10)), 0.5);
        assert_eq!(frame_fraction(10, Some(10)), IN_FLIGHT_CAP);
        assert_eq!(frame_fraction(12, Some(10)), IN_FLIGHT_CAP);
        assert_eq!(frame_fraction(5, None), 0.0);
        assert_eq!(frame_fraction(5, Some(0)), 0.0);
    }

    #[test]
    fn test_output_directory_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(output_directory_exists(&dir.path().join("a.mov")));
        assert!(!output_directory_exists(&dir.path().join("missing").join("a.mov")));
        assert!(output_directory_exists(Path::new("a.mov")));
    }

    #[test]
    fn test_session_requires_video_track() {
        let audio_only = Asset::new(
            "song.m4a",
            vec![Track {
                index: 0,
                kind: TrackKind::Audio,
                codec: "aac".to_string(),
                natural_size: None,
                frame_rate: None,
                frame_count: None,
                duration: Some(3.0),
            }],
            Some(3.0),
        );
        let encoder = EncoderConfig::default();
        let preset = ExportPreset::for_size(Size::new(1920, 1080), &encoder);

        let err = ExportSession::new(audio_only, preset, &encoder).err().unwrap();
        assert!(matches!(
            err,
            EncoderError::Export(ExportError::SessionConstructionFailed { .. })
        ));
    }

    #[test]
    fn test_session_requires_ffmpeg() {
        let asset = Asset::new(
            "clip.mp4",
            vec![Track {
                index: 0,
                kind: TrackKind::Video,
                codec: "h264".to_string(),
                natural_size: Some(Size::new(640, 360)),
                frame_rate: Some(FrameRate::new(30, 1)),
                frame_count: Some(30),
                duration: Some(1.0),
            }],
            Some(1.0),
        );
        let encoder = EncoderConfig {
            ffmpeg_path: "definitely-not-a-real-ffmpeg-binary".to_string(),
            ..EncoderConfig::default()
        };
        let preset = ExportPreset::for_size(Size::new(1920, 1080), &encoder);

        let err = ExportSession::new(asset, preset, &encoder).err().unwrap();
        assert!(matches!(
            err,
            EncoderError::Export(ExportError::SessionConstructionFailed { .. })
        ));
    }
}
