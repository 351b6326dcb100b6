use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::error::{EncoderError, Result};
use crate::video::stderr::StderrTail;
use crate::video::types::{Frame, Size};

/// Streams decoded RGB24 frames of one video track out of an ffmpeg child process
pub struct FrameReader {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: StderrTail,
    size: Size,
    frame_len: usize,
    frames_read: u64,
}

impl FrameReader {
    /// Start decoding the `video_ordinal`-th video track of `input`
    ///
    /// Autorotation is disabled so frames keep the track's natural size.
    pub fn spawn(ffmpeg_path: &str, input: &Path, video_ordinal: usize, size: Size) -> Result<Self> {
        let frame_len = size.rgb_len().ok_or_else(|| {
            EncoderError::export_failed(format!("source frame size {} is too large", size))
        })?;

        let mut cmd = Command::new(ffmpeg_path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd.args(["-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(input)
            .args([
                "-map",
                &format!("0:v:{}", video_ordinal),
                "-an",
                "-sn",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ]);

        debug!("Spawning decoder: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            EncoderError::export_failed(format!(
                "failed to spawn {} for decoding: {}",
                ffmpeg_path, e
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncoderError::export_failed("failed to open decoder stdout"))?;
        let stderr = StderrTail::start(child.stderr.take());

        Ok(Self {
            child,
            stdout: Some(stdout),
            stderr,
            size,
            frame_len,
            frames_read: 0,
        })
    }

    /// Read the next frame, reusing `recycled` as the pixel buffer when given
    ///
    /// Returns `Ok(None)` at the end of the stream.
    pub fn next_frame(&mut self, recycled: Option<Vec<u8>>) -> Result<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = recycled.unwrap_or_default();
        buf.resize(self.frame_len, 0);

        let filled = read_full(stdout, &mut buf)?;
        if filled == 0 {
            self.stdout = None;
            return Ok(None);
        }

        if filled < self.frame_len {
            return Err(EncoderError::export_failed(format!(
                "decoder produced a truncated frame {} ({} of {} bytes)",
                self.frames_read, filled, self.frame_len
            )));
        }

        self.frames_read += 1;
        Frame::from_rgb_bytes(self.size.width, self.size.height, buf)
            .map(Some)
            .ok_or_else(|| EncoderError::export_failed("decoded frame buffer has the wrong length"))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Wait for the decoder to exit and surface its error output
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdout.take());

        let status = self.child.wait().map_err(|e| {
            EncoderError::export_failed(format!("failed to wait for decoder: {}", e))
        })?;
        let stderr = self.stderr.collect();

        if !status.success() {
            return Err(EncoderError::export_failed(format!(
                "decoder exited with status {}: {}",
                status, stderr
            )));
        }

        Ok(())
    }

    /// Stop decoding early, after a failure elsewhere in the pipeline
    pub fn abort(mut self) {
        drop(self.stdout.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.stderr.collect();
    }
}

/// Fill `buf` as far as the stream allows; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EncoderError::export_failed(format!(
                    "failed to read from decoder: {}",
                    e
                )))
            }
        }
    }
    Ok(filled)
}
