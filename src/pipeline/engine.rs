use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::{
    config::Config,
    error::Result,
    paths::{remove_stale_output, resolve_paths, ResolvedPaths},
    progress::{OutputMode, ProgressReporter},
    video::{
        build_composition, Asset, AssetLoader, ExportPreset, ExportSession, Size, VideoComposition,
    },
};

/// Summary of a finished encode
#[derive(Debug, Clone)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub source_size: Size,
    pub render_size: Size,
    pub file_size: u64,
}

/// Runs the whole resize-and-encode pipeline for one input file
///
/// The pipeline is strictly linear:
/// 1. Resolve the input and output paths, removing a stale output
/// 2. Probe the input for its video track
/// 3. Build the pillar-box composition
/// 4. Export, with progress reported on stderr while it runs
pub struct EncodeEngine {
    config: Config,
}

impl EncodeEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Encode `input` into `<dir>/<stem>-Mastodon.mov`
    pub async fn encode<P: AsRef<Path>>(&self, input: P) -> Result<EncodedVideo> {
        self.config.validate()?;

        // Step 1: paths
        let paths = self.prepare_paths(input.as_ref()).await?;

        // Step 2: asset
        let asset = self.load_asset(&paths.input)?;

        // Step 3: composition
        let render_size = self.config.output.render_size();
        let composition = build_composition(&asset, render_size)?;
        let source_size = composition.video_size();

        // Step 4: export
        self.export(asset, composition, &paths.output).await?;

        let file_size = tokio::fs::metadata(&paths.output).await?.len();
        info!(
            "Encoded {} ({:.1} MB)",
            paths.output.display(),
            file_size as f64 / 1024.0 / 1024.0
        );

        Ok(EncodedVideo {
            path: paths.output,
            source_size,
            render_size,
            file_size,
        })
    }

    async fn prepare_paths(&self, input: &Path) -> Result<ResolvedPaths> {
        let paths = resolve_paths(input, &self.config.output)?;
        debug!("Input: {}", paths.input.display());
        debug!("Output: {}", paths.output.display());

        remove_stale_output(&paths.output).await?;
        Ok(paths)
    }

    fn load_asset(&self, input: &Path) -> Result<Asset> {
        let loader = AssetLoader::new(self.config.encoder.ffprobe_path.clone());
        let asset = loader.load(input)?;
        debug!("Loaded {} tracks from {}", asset.tracks.len(), input.display());
        Ok(asset)
    }

    async fn export(&self, asset: Asset, composition: VideoComposition, output: &Path) -> Result<()> {
        let preset = ExportPreset::for_size(composition.render_size(), &self.config.encoder);
        let file_type = self.config.output.file_type()?;

        let mut session = ExportSession::new(asset, preset, &self.config.encoder)?;
        session.set_video_composition(Arc::new(composition));
        session.set_output(output, file_type);

        let reporter = ProgressReporter::new(
            Duration::from_millis(self.config.progress.interval_ms),
            OutputMode::from_env(&self.config.progress.plain_env_var),
        );
        let reporting = reporter.spawn(session.progress_handle());

        let result = session.export().await;

        // The reporter exits on its own once the session is terminal
        if let Ok(last) = reporting.await {
            debug!("Progress reporter finished at {:.2}", last);
        }

        result
    }
}
