// src/crawl/mod.rs
// =============================================================================
// This module handles the crawl phase.
//
// Features:
// - Depth-first walk starting from a seed URL
// - Configurable depth limit
// - Cycle-safe: every URL is fetched at most once
// - Collects the set of MP3 links seen on every fetched page
//
// The crawl is sequential: one page at a time, so the visited and media
// sets are plain collections owned by the walk, with no locking.
// =============================================================================

mod walker;

// Re-export the main crawling function and its result
pub use walker::{crawl_website, CrawlReport, PageFailure};
