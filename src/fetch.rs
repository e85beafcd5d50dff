// src/fetch.rs
// =============================================================================
// This module owns the HTTP side of both phases.
//
// Strategy:
// - Build ONE reqwest Client and share it (clones are cheap, it's an Arc
//   around a connection pool)
// - Pages are small: read the whole body as text, but only when the server
//   says it is text, and never past MAX_PAGE_BYTES
// - Media files can be large: hand back the Response so the caller can
//   stream the body to disk chunk by chunk
//
// Every error here is a FetchError that names the URL, so a failure line
// printed to the user is enough to retry by hand.
// =============================================================================

use crate::error::FetchError;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// Time allowed to open a TCP/TLS connection, for pages and downloads alike
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// Pages get a total deadline. Downloads do not: a large file on a slow link
// may legitimately take minutes, and the run-level --timeout covers that.
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 10;

// Largest page body we scan for links
const MAX_PAGE_BYTES: usize = 5 * 1024 * 1024;

/// Builds the client shared by the crawler and every download worker.
pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
}

// Fetches a page and returns its body as text
//
// Returns an error for network failures, for any non-2xx status, for a
// Content-Type that isn't text, and for bodies over MAX_PAGE_BYTES. A missing
// Content-Type is read as text.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, FetchError> {
    debug!(url, "fetching page");
    let response = send(client, url, Some(PAGE_TIMEOUT)).await?;

    if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
        let content_type = content_type.to_str().unwrap_or_default().to_ascii_lowercase();
        if !is_text_content_type(&content_type) {
            return Err(FetchError::NotText {
                url: url.to_string(),
                content_type,
            });
        }
    }

    let too_large = || FetchError::TooLarge {
        url: url.to_string(),
        limit: MAX_PAGE_BYTES,
    };
    if response.content_length().is_some_and(|len| len > MAX_PAGE_BYTES as u64) {
        return Err(too_large());
    }

    // Chunked bodies have no length up front, so count as we go
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        if body.len() + chunk.len() > MAX_PAGE_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

// text/*, plus the XML and JSON flavours pages are sometimes served as
fn is_text_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.starts_with("text/")
        || essence.ends_with("+xml")
        || matches!(essence, "application/xml" | "application/json" | "application/javascript")
}

// Starts a download and returns the response once the headers are in
//
// The body has NOT been read yet: call bytes_stream() on the result.
pub async fn open_download(client: &Client, url: &str) -> Result<Response, FetchError> {
    debug!(url, "opening download");
    send(client, url, None).await
}

async fn send(client: &Client, url: &str, timeout: Option<Duration>) -> Result<Response, FetchError> {
    let mut request = client.get(url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    Ok(response)
}
