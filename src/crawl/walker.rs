// src/crawl/walker.rs
// =============================================================================
// This module walks a website depth-first, collecting MP3 links.
//
// How it works:
// 1. Put the seed URL on a stack with the full depth budget
// 2. Pop a page, fetch it, pull every URL out of the body
// 3. URLs ending in .mp3 go into the media set (a set: duplicates collapse)
// 4. Every other URL not seen before is marked visited and pushed with
//    one less hop of depth budget, unless that budget is used up
// 5. Repeat until the stack is empty
//
// Depth semantics:
//   max_depth=0: nothing is fetched
//   max_depth=1: only the seed page
//   max_depth=2: the seed page + every page it links to
//
// A page that fails to load is reported and treated as a dead end. The
// crawl itself never fails. A URL that answers with something other than
// text (a video, an archive) is skipped quietly: a dead end, not a failure.
// =============================================================================

use crate::error::FetchError;
use crate::extract::{extract_links, extract_media_links};
use crate::fetch::fetch_page;
use crate::progress::{ProgressEvent, ProgressSink, Status};
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// A page waiting on the stack
#[derive(Debug, Clone)]
struct CrawlTask {
    url: String,
    remaining_depth: usize, // hops left, counting this page
}

/// A page that could not be fetched.
#[derive(Debug, Clone, Serialize)]
pub struct PageFailure {
    pub url: String,
    pub error: String,
}

/// Everything a crawl found out.
#[derive(Debug, Default, Serialize)]
pub struct CrawlReport {
    /// Every distinct MP3 URL seen on a fetched page.
    pub media: BTreeSet<String>,
    /// Every page URL that was fetched or queued. A URL in here is never
    /// fetched a second time.
    #[serde(skip)]
    pub visited: HashSet<String>,
    pub pages_fetched: usize,
    pub failures: Vec<PageFailure>,
}

// Crawls from seed_url and returns the MP3 links found within max_depth hops
//
// Parameters:
//   client: shared HTTP client
//   seed_url: the page to start from
//   max_depth: how many levels deep to go (0 = fetch nothing)
//   progress: where LOADING/SUCCESS/FAILED lines go
//   cancel: stops the walk between (or during) page fetches
pub async fn crawl_website(
    client: &Client,
    seed_url: &str,
    max_depth: usize,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> CrawlReport {
    let mut report = CrawlReport::default();

    if max_depth == 0 {
        debug!(seed_url, "depth budget is zero, nothing to crawl");
        return report;
    }

    report.visited.insert(seed_url.to_string());
    let mut stack = vec![CrawlTask {
        url: seed_url.to_string(),
        remaining_depth: max_depth,
    }];

    while let Some(task) = stack.pop() {
        if cancel.is_cancelled() {
            info!(unvisited = stack.len() + 1, "crawl cancelled");
            break;
        }

        progress.on_event(&ProgressEvent::crawl(Status::Loading, &task.url, task.remaining_depth));

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled(task.url.clone())),
            result = fetch_page(client, &task.url) => result,
        };

        let body = match body {
            Ok(body) => body,
            Err(e) if e.is_skipped_page() => {
                debug!(url = %task.url, reason = %e, "not a page, skipping");
                progress.on_event(
                    &ProgressEvent::crawl(Status::Success, &task.url, task.remaining_depth)
                        .with_detail("skipped"),
                );
                continue;
            }
            Err(e) => {
                // Dead end: report it and move on to the next page
                warn!(url = %task.url, error = %e, "page fetch failed");
                progress.on_event(
                    &ProgressEvent::crawl(Status::Failed, &task.url, task.remaining_depth)
                        .with_detail(e.to_string()),
                );
                report.failures.push(PageFailure {
                    url: task.url,
                    error: e.to_string(),
                });
                continue;
            }
        };
        report.pages_fetched += 1;

        let links = extract_links(&body);
        let media = extract_media_links(&body);
        debug!(
            url = %task.url,
            links = links.len(),
            media = media.len(),
            "page scanned"
        );

        let child_depth = task.remaining_depth - 1;
        // Reversed so pages are popped in the order they were extracted.
        // Media links are collected, never fetched as pages.
        for link in links.into_iter().rev().filter(|link| !media.contains(link)) {
            // insert() is the visited check: false means we've been here
            if report.visited.insert(link.clone()) && child_depth > 0 {
                stack.push(CrawlTask {
                    url: link,
                    remaining_depth: child_depth,
                });
            }
        }
        report.media.extend(media);

        progress.on_event(&ProgressEvent::crawl(Status::Success, &task.url, task.remaining_depth));
    }

    report
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why a stack instead of recursion?
//    - An async fn can't call itself without boxing the future
//    - An explicit Vec<CrawlTask> gives the same depth-first order and
//      can't blow the call stack on a deep site
//
// 2. Why mark visited when a link is discovered, not when it's fetched?
//    - A page linked from many places would otherwise be pushed many
//      times before its first fetch
//    - Marking on discovery means each URL is queued at most once
//
// 3. Why BTreeSet for the media links?
//    - Set semantics give de-duplication for free
//    - Sorted order makes the printed list and the download order stable
// -----------------------------------------------------------------------------
