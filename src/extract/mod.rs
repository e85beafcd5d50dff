// src/extract/mod.rs
// =============================================================================
// This module finds URLs in fetched page text.
//
// Submodules:
// - links: regex-based URL matching and the MP3 suffix filter
//
// Matching is purely textual. We do not parse HTML, so a URL inside an
// attribute, a <script> block or plain prose is found all the same.
// =============================================================================

mod links;

pub use links::{extract_links, extract_media_links};
