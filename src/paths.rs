//! Input validation and output naming.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::OutputConfig;
use crate::error::{InputError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// `<dir>/<stem><suffix>.<extension>`; only the last extension of the input is dropped
pub fn output_path_for(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let mut file_name = input
        .file_stem()
        .map(OsString::from)
        .unwrap_or_default();
    file_name.push(suffix);
    file_name.push(".");
    file_name.push(extension);

    input.with_file_name(file_name)
}

/// Check that the input exists and work out where the output goes
pub fn resolve_paths<P: AsRef<Path>>(input: P, output: &OutputConfig) -> Result<ResolvedPaths> {
    let input = input.as_ref();

    if !input.exists() {
        return Err(InputError::NotFound {
            path: input.display().to_string(),
        }.into());
    }

    if input.is_dir() {
        return Err(InputError::InvalidMetadata {
            details: format!("{} is a directory, not a video file", input.display()),
        }.into());
    }

    Ok(ResolvedPaths {
        input: input.to_path_buf(),
        output: output_path_for(input, &output.suffix, &output.extension),
    })
}

/// Delete a previous output so a failed run can't leave it looking fresh
///
/// Returns whether a file was removed.
pub async fn remove_stale_output(path: &Path) -> Result<bool> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(false);
    }

    tokio::fs::remove_file(path).await?;
    info!("Removed existing output {}", path.display());
    Ok(true)
}
