// src/progress/log.rs
// Status events as plain tracing records: no cursor movement, one record per
// event. Used for --json/--no-progress runs and whenever stderr is not a TTY.

use super::{render_line, Channel, ProgressEvent, ProgressSink, Status};
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_event(&self, event: &ProgressEvent) {
        let channel = match event.channel {
            Channel::Crawl => "crawl",
            Channel::Download => "download",
        };
        let line = render_line(event);

        match event.status {
            Status::Failed => warn!(channel, "{line}"),
            Status::Loading | Status::Success => info!(channel, "{line}"),
        }
    }
}
