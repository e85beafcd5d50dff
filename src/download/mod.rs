// src/download/mod.rs
// =============================================================================
// This module handles the download phase.
//
// Submodules:
// - job: one URL -> one file, streamed through its own partial file
// - pool: runs many jobs with a concurrency cap and waits for all of them
// =============================================================================

mod job;
mod pool;

pub use job::{DownloadOutcome, OutcomeStatus};
pub use pool::download_all;
