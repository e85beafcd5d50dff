// src/progress/mod.rs
// =============================================================================
// This module is the status side channel for both phases.
//
// The crawl walker and the download workers never print anything
// themselves. They emit ProgressEvents into a ProgressSink, and the sink
// decides how to show them:
// - terminal: live, in-place lines rendered with indicatif
// - log: one tracing event per status change (--no-progress, --json, pipes)
//
// Reporting is best effort. on_event() cannot fail, and a sink that cannot
// draw (closed terminal, poisoned lock) just drops the update.
// =============================================================================

mod log;
mod terminal;

pub use log::LogProgress;
pub use terminal::TerminalProgress;

use serde::Serialize;
use std::fmt;

/// Which logical stream an event belongs to.
///
/// The terminal renderer keeps one line per crawl and one line per download,
/// and each new event overwrites the line of its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Crawl,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Loading,
    Success,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Loading => "LOADING",
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
        };
        // pad() so callers can align it with {:<8}
        f.pad(text)
    }
}

/// Optional number attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Remaining crawl depth of the page being fetched.
    Depth(usize),
    /// Bytes written for a finished download.
    Bytes(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub channel: Channel,
    pub status: Status,
    /// Identifies the page or job: the page URL, or the download's source
    /// URL. Two downloads can share a label but never a key.
    pub key: String,
    /// URL for crawl events, file name for download events.
    pub label: String,
    pub metric: Option<Metric>,
    /// Failure cause, shown next to FAILED lines.
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn crawl(status: Status, url: &str, depth: usize) -> Self {
        Self {
            channel: Channel::Crawl,
            status,
            key: url.to_string(),
            label: url.to_string(),
            metric: Some(Metric::Depth(depth)),
            detail: None,
        }
    }

    pub fn download(status: Status, source_url: &str, file_name: &str) -> Self {
        Self {
            channel: Channel::Download,
            status,
            key: source_url.to_string(),
            label: file_name.to_string(),
            metric: None,
            detail: None,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receiver of crawl and download status events.
///
/// Shared between concurrent download workers, so implementations must
/// serialize their own output.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);

    /// Called once the run is over, to settle any line still animating.
    fn finish(&self) {}
}

/// Formats a byte count the way the status lines show sizes.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

// One status line, without any terminal decoration:
//   "SUCCESS   3.00 MB  song.mp3"
//   "LOADING  depth 2  http://x/page2"
pub fn render_line(event: &ProgressEvent) -> String {
    let metric = match event.metric {
        Some(Metric::Depth(depth)) => format!("depth {depth}"),
        Some(Metric::Bytes(bytes)) => format_megabytes(bytes),
        None => "-".to_string(),
    };

    let mut line = format!("{:<8} {:>10}  {}", event.status, metric, event.label);
    if let Some(detail) = &event.detail {
        line.push_str(" (");
        line.push_str(detail);
        line.push(')');
    }
    line
}
