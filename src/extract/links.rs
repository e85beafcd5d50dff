// src/extract/links.rs
// =============================================================================
// This module pulls absolute http(s) URLs out of raw page text.
//
// Key functionality:
// - One compiled regular expression, shared by every call
// - extract_links: every URL found in the text
// - extract_media_links: the subset of those that point at an .mp3 file
//
// Both return sets, so a URL that appears ten times on a page is reported
// once. Relative links ("/page2", "../a.mp3") are not resolved: only
// absolute URLs written out in the page are found.
// =============================================================================

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

// Scheme, then a host part (letters, digits, dots, ports, userinfo...), then
// an optional path/query part. Quotes, whitespace, angle brackets and
// parentheses end a match, which is what stops us at the end of href='...'.
const URL_PATTERN: &str = r"https?://[-a-zA-Z0-9@:%._+~#=]{1,256}(?:/[-a-zA-Z0-9@:%_+.~#?&/=]*)?";

// Sentence punctuation that the pattern happily swallows at the end of a URL
// ("see http://x/a.mp3.") but which is never part of the link.
const TRAILING_PUNCTUATION: &[char] = &['.', ':', '?'];

const MEDIA_SUFFIX: &[u8] = b".mp3";

fn url_regex() -> &'static Regex {
    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    // The pattern is a constant, so failing to compile it is a programmer error
    URL_REGEX.get_or_init(|| Regex::new(URL_PATTERN).expect("URL pattern is valid"))
}

// Extracts every absolute http/https URL from page text
//
// Example:
//   text = "<a href='http://x/page2'>...</a> http://x/a.mp3"
//   result = {"http://x/a.mp3", "http://x/page2"}
pub fn extract_links(text: &str) -> BTreeSet<String> {
    url_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        // "http://" followed only by punctuation trims down to nothing useful
        .filter(|url| !url.ends_with("://"))
        .map(str::to_string)
        .collect()
}

// Extracts the URLs that point at MP3 files
//
// Always a subset of extract_links(text): same matches, filtered by suffix.
pub fn extract_media_links(text: &str) -> BTreeSet<String> {
    extract_links(text)
        .into_iter()
        .filter(|url| is_media_link(url))
        .collect()
}

/// True if the URL ends in `.mp3` (ASCII case-insensitive).
pub fn is_media_link(url: &str) -> bool {
    let bytes = url.as_bytes();
    bytes.len() > MEDIA_SUFFIX.len()
        && bytes[bytes.len() - MEDIA_SUFFIX.len()..].eq_ignore_ascii_case(MEDIA_SUFFIX)
}
