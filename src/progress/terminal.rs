// src/progress/terminal.rs
// =============================================================================
// Live, in-place status lines on stderr, drawn with indicatif.
//
// Layout:
//   one line for the crawl, rewritten on every crawl event
//   one line per download, a spinner while LOADING, frozen on SUCCESS/FAILED
//
// indicatif's MultiProgress redraws all of its lines together, so output
// stays bounded however many pages or files we go through. It is also
// thread safe: workers on different tokio threads can report at once.
// =============================================================================

use super::{render_line, Channel, ProgressEvent, ProgressSink, Status};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

pub struct TerminalProgress {
    multi: MultiProgress,
    crawl_line: Mutex<Option<ProgressBar>>,
    // Keyed by source URL: a download's FAILED/SUCCESS event finds the line
    // its own LOADING event created, even when file names collide.
    download_lines: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            crawl_line: Mutex::new(None),
            download_lines: Mutex::new(HashMap::new()),
        }
    }

    /// Prints a static line above the live ones (e.g. a table header).
    pub fn println(&self, line: &str) {
        // Best effort: a terminal we cannot write to is not worth failing over
        let _ = self.multi.println(line);
    }

    fn spinner(&self) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(TICK);
        bar
    }

    fn freeze(bar: &ProgressBar, line: String) {
        bar.set_style(
            ProgressStyle::with_template("  {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.finish_with_message(line);
    }

    fn on_crawl(&self, event: &ProgressEvent) {
        let Ok(mut slot) = self.crawl_line.lock() else {
            return;
        };
        let bar = slot.get_or_insert_with(|| self.spinner());
        bar.set_message(render_line(event));
    }

    fn on_download(&self, event: &ProgressEvent) {
        let Ok(mut lines) = self.download_lines.lock() else {
            return;
        };
        let line = render_line(event);

        match event.status {
            Status::Loading => {
                let bar = self.spinner();
                bar.set_message(line);
                lines.insert(event.key.clone(), bar);
            }
            Status::Success | Status::Failed => {
                // A terminal event without a LOADING first still gets a line
                let bar = lines.remove(&event.key).unwrap_or_else(|| self.spinner());
                Self::freeze(&bar, line);
            }
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event.channel {
            Channel::Crawl => self.on_crawl(event),
            Channel::Download => self.on_download(event),
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.crawl_line.lock() {
            if let Some(bar) = slot.take() {
                let last = bar.message();
                Self::freeze(&bar, last);
            }
        }
        if let Ok(mut lines) = self.download_lines.lock() {
            for (_, bar) in lines.drain() {
                bar.abandon();
            }
        }
    }
}
