// src/error.rs
// =============================================================================
// Error types for a single unit of work (one crawled page or one download).
//
// None of these ever abort the whole run: the crawl walker and the download
// pool catch them where they happen and turn them into a Failed status line
// plus a Failed outcome. Only configuration problems are fatal, and those
// live in config.rs as anyhow errors.
// =============================================================================

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// A page or media URL could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure: DNS, connect, TLS, timeout, broken body stream...
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered, but not with a 2xx status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    /// A crawled URL turned out not to be a text page (image, archive, video...).
    #[error("{url} is not a text page ({content_type})")]
    NotText { url: String, content_type: String },

    /// A page body grew past the size we are willing to scan.
    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },

    /// The run was cancelled (Ctrl-C or --timeout) while the request was pending.
    #[error("cancelled while fetching {0}")]
    Cancelled(String),
}

/// A downloaded body could not be written to disk.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot move finished download to {}: {source}", .path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything that can go wrong with one download job.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// The URL has no final path segment we could use as a file name.
    #[error("cannot derive a file name from {0}")]
    NoFileName(String),

    /// The worker task itself died (panicked or was aborted).
    #[error("download task for {0} did not finish")]
    Aborted(String),
}

impl FetchError {
    /// True for a resource that was reachable but is not worth scanning.
    pub fn is_skipped_page(&self) -> bool {
        matches!(self, FetchError::NotText { .. } | FetchError::TooLarge { .. })
    }
}

impl DownloadError {
    /// True when the job ended because the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Fetch(FetchError::Cancelled(_)))
    }
}
