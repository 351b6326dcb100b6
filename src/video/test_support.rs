//! Helpers shared by the session tests

use std::path::PathBuf;

/// Path of the shell stand-in for ffmpeg under `tests/fixtures`
///
/// Decoding yields five black 4x2 frames; encoding copies raw input to the output path.
pub(crate) fn standin_ffmpeg() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("ffmpeg-standin.sh");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755));
    }

    path.display().to_string()
}
