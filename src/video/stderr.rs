use std::io::{ErrorKind, Read};
use std::process::ChildStderr;
use std::thread::{self, JoinHandle};

use tracing::warn;

/// Bytes of ffmpeg error output kept for diagnostics
pub(crate) const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Reads a child's stderr on its own thread so the child never blocks on a full pipe
///
/// Only the last [`STDERR_TAIL_BYTES`] are kept; ffmpeg puts the useful part at the end.
pub(crate) struct StderrTail {
    handle: Option<JoinHandle<Vec<u8>>>,
}

impl StderrTail {
    pub(crate) fn start(stderr: Option<ChildStderr>) -> Self {
        let handle = stderr.and_then(|pipe| {
            thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || drain(pipe, STDERR_TAIL_BYTES))
                .map_err(|e| warn!("Could not start stderr reader: {}", e))
                .ok()
        });
        Self { handle }
    }

    /// Wait for the pipe to close and return what was kept
    ///
    /// Call only after the child has exited, or the join waits on it.
    pub(crate) fn collect(mut self) -> String {
        let bytes = self
            .handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// Read `reader` to the end, keeping at most the last `cap` bytes
fn drain<R: Read>(mut reader: R, cap: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                if kept.len() > cap * 2 {
                    kept.drain(..kept.len() - cap);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    if kept.len() > cap {
        kept.drain(..kept.len() - cap);
    }
    kept
}
