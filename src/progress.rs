//! # Progress Reporting
//!
//! Polls an [`ExportProgress`] on a fixed period and renders it as a single
//! `Exporting… NN%` line on stderr.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::video::{ExportProgress, ExportStatus};

const CLEAR_LINE: &str = "\u{1b}[2K";
const CURSOR_TO_COLUMN_ONE: &str = "\u{1b}[G";

/// How progress lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Rewrite the current line with cursor escape codes
    Terminal,
    /// One line per tick, for consoles that can't handle escape codes
    Plain,
}

impl OutputMode {
    /// `Plain` when `var` is set to `"1"`, `Terminal` otherwise
    pub fn from_env(var: &str) -> Self {
        Self::from_flag(std::env::var(var).ok().as_deref())
    }

    fn from_flag(value: Option<&str>) -> Self {
        match value {
            Some("1") => Self::Plain,
            _ => Self::Terminal,
        }
    }
}

/// `Exporting… NN%`, with NN the floored percentage
pub fn progress_message(fraction: f64) -> String {
    let percent = (fraction.clamp(0.0, 1.0) * 100.0).floor() as u32;
    format!("Exporting… {:02}%", percent)
}

pub struct ProgressReporter {
    period: Duration,
    mode: OutputMode,
}

impl ProgressReporter {
    pub fn new(period: Duration, mode: OutputMode) -> Self {
        Self { period, mode }
    }

    /// Write one progress update to `out`
    pub fn render<W: Write>(&self, out: &mut W, fraction: f64) -> std::io::Result<()> {
        let message = progress_message(fraction);
        match self.mode {
            OutputMode::Terminal => {
                write!(out, "{}{}{}", CLEAR_LINE, CURSOR_TO_COLUMN_ONE, message)?;
            }
            OutputMode::Plain => {
                writeln!(out, "{}", message)?;
            }
        }
        out.flush()
    }

    /// The line printed before the first poll
    pub fn announce<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "Exporting…")?;
        if self.mode == OutputMode::Plain {
            writeln!(out)?;
        }
        out.flush()
    }

    /// Poll until progress reaches 1.0 or the export ends
    ///
    /// On failure the terminal line is ended so the error message starts on its own.
    /// Output errors are swallowed; reporting never affects the export.
    pub async fn run<W: Write>(&self, progress: Arc<ExportProgress>, mut out: W) -> f64 {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let status = progress.status();
            let fraction = progress.fraction();

            if status == ExportStatus::Failed {
                if self.mode == OutputMode::Terminal {
                    let _ = writeln!(out).and_then(|_| out.flush());
                }
                return fraction;
            }

            let _ = self.render(&mut out, fraction);

            if fraction >= 1.0 || status.is_terminal() {
                return fraction;
            }
        }
    }

    /// Detach a reporting task writing to stderr
    pub fn spawn(self, progress: Arc<ExportProgress>) -> JoinHandle<f64> {
        let _ = self.announce(&mut std::io::stderr());
        tokio::spawn(async move { self.run(progress, std::io::stderr()).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_floors_percentage() {
        assert_eq!(progress_message(0.0), "Exporting… 00%");
        assert_eq!(progress_message(0.079), "Exporting… 07%");
        assert_eq!(progress_message(0.999), "Exporting… 99%");
        assert_eq!(progress_message(1.0), "Exporting… 100%");
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(OutputMode::from_flag(Some("1")), OutputMode::Plain);
        assert_eq!(OutputMode::from_flag(Some("0")), OutputMode::Terminal);
        assert_eq!(OutputMode::from_flag(Some("true")), OutputMode::Terminal);
        assert_eq!(OutputMode::from_flag(None), OutputMode::Terminal);
    }

    #[test]
    fn test_terminal_render_rewrites_line() {
        let reporter = ProgressReporter::new(Duration::from_millis(100), OutputMode::Terminal);
        let mut out = Vec::new();
        reporter.render(&mut out, 0.42).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\u{1b}[2K\u{1b}[GExporting… 42%");
    }

    #[test]
    fn test_plain_render_appends_lines() {
        let reporter = ProgressReporter::new(Duration::from_millis(100), OutputMode::Plain);
        let mut out = Vec::new();
        reporter.render(&mut out, 0.1).unwrap();
        reporter.render(&mut out, 0.2).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Exporting… 10%\nExporting… 20%\n");
    }

    #[tokio::test]
    async fn test_run_stops_at_completion() {
        let progress = Arc::new(ExportProgress::new());
        progress.set_status(ExportStatus::Exporting);

        let writer = Arc::clone(&progress);
        let producer = tokio::spawn(async move {
            for step in 1..=4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                writer.advance(step as f64 / 4.0);
            }
            writer.set_status(ExportStatus::Completed);
        });

        let reporter = ProgressReporter::new(Duration::from_millis(1), OutputMode::Plain);
        let mut out = Vec::new();
        let last = reporter.run(Arc::clone(&progress), &mut out).await;
        producer.await.unwrap();

        assert_eq!(last, 1.0);

        let text = String::from_utf8(out).unwrap();
        let percents: Vec<u32> = text
            .lines()
            .map(|line| line.trim_start_matches("Exporting… ").trim_end_matches('%').parse().unwrap())
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_run_stops_on_failure() {
        let progress = Arc::new(ExportProgress::new());
        progress.advance(0.3);
        progress.set_status(ExportStatus::Failed);

        let reporter = ProgressReporter::new(Duration::from_millis(1), OutputMode::Plain);
        let mut out = Vec::new();
        let last = reporter.run(progress, &mut out).await;

        assert_eq!(last, 0.3);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_failure_ends_the_line() {
        let progress = Arc::new(ExportProgress::new());
        progress.advance(0.5);
        progress.set_status(ExportStatus::Failed);

        let reporter = ProgressReporter::new(Duration::from_millis(1), OutputMode::Terminal);
        let mut out = Vec::new();
        reporter.announce(&mut out).unwrap();
        reporter.run(progress, &mut out).await;

        assert_eq!(String::from_utf8(out).unwrap(), "Exporting…\n");
    }
}
