// src/download/job.rs
// =============================================================================
// One download: where it comes from, where it goes, and how it ended.
//
// Writing strategy:
// - The body is streamed chunk by chunk, never held in memory whole
// - Chunks go to a partial file next to the destination first, named
//   ".<file name>.<random>.part" so two jobs never share one
// - Only a complete transfer is renamed onto the destination, so a failed
//   or cancelled download never clobbers a file that was already there
// - The partial file deletes itself when dropped unless it was renamed
// =============================================================================

use crate::error::{DownloadError, FetchError, WriteError};
use crate::fetch::open_download;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

const PARTIAL_SUFFIX: &str = ".part";

/// A media URL paired with the file it will be saved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadJob {
    pub source_url: String,
    pub destination: PathBuf,
}

impl DownloadJob {
    /// `<destination_dir>/<last path segment of url>`
    pub fn new(source_url: &str, destination_dir: &Path) -> Result<Self, DownloadError> {
        let file_name =
            file_name_from_url(source_url).ok_or_else(|| DownloadError::NoFileName(source_url.to_string()))?;

        Ok(Self {
            source_url: source_url.to_string(),
            destination: destination_dir.join(file_name),
        })
    }

    /// The label used in status lines.
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_url.clone())
    }

    // Creates this job's own partial file in the destination directory
    fn create_partial(&self) -> Result<(File, TempPath), WriteError> {
        let dir = self.destination.parent().unwrap_or_else(|| Path::new("."));
        let prefix = format!(".{}.", self.file_name());

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(PARTIAL_SUFFIX);
        // tempfile defaults to 0600; a finished download gets the mode
        // File::create would have given it
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }

        let partial = builder
            .tempfile_in(dir)
            .map_err(|source| WriteError::Create {
                path: dir.join(format!("{prefix}*{PARTIAL_SUFFIX}")),
                source,
            })?;

        let (file, path) = partial.into_parts();
        Ok((File::from_std(file), path))
    }

    // Fetches the URL and streams the body to disk
    //
    // Returns the number of bytes written on success.
    pub(crate) async fn run(&self, client: &Client, cancel: &CancellationToken) -> Result<u64, DownloadError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled(self.source_url.clone())),
            result = open_download(client, &self.source_url) => result,
        }?;

        // Nothing touches the filesystem until the server said yes.
        // Every early return below drops `partial`, which removes the file.
        let (file, partial) = self.create_partial()?;
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled(self.source_url.clone()).into()),
            result = stream_to_file(response, file, &partial, &self.source_url) => result,
        }?;

        // rename() replaces the destination in one step, so readers only
        // ever see a complete file
        partial.persist(&self.destination).map_err(|e| WriteError::Finalize {
            path: self.destination.clone(),
            source: e.error,
        })?;

        Ok(bytes)
    }
}

async fn stream_to_file(response: Response, mut file: File, path: &Path, url: &str) -> Result<u64, DownloadError> {
    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(|source| WriteError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        written += chunk.len() as u64;
    }

    // tokio's File buffers internally; flush before the rename sees it
    file.flush().await.map_err(|source| WriteError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(written)
}

/// Last non-empty path segment of a URL, e.g. `song.mp3` for
/// `http://x/music/song.mp3`. `None` if the URL doesn't parse or ends in `/`.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;

    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// How one download ended.
#[derive(Debug, Serialize)]
pub struct DownloadOutcome {
    pub url: String,
    /// `None` when no destination could be derived from the URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub bytes_written: u64,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_cause")]
    pub cause: Option<DownloadError>,
}

impl DownloadOutcome {
    pub fn success(job: DownloadJob, bytes_written: u64) -> Self {
        Self {
            url: job.source_url,
            destination: Some(job.destination),
            bytes_written,
            status: OutcomeStatus::Success,
            cause: None,
        }
    }

    pub fn failed(url: String, destination: Option<PathBuf>, cause: DownloadError) -> Self {
        Self {
            url,
            destination,
            bytes_written: 0,
            status: OutcomeStatus::Failed,
            cause: Some(cause),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

fn serialize_cause<S: Serializer>(cause: &Option<DownloadError>, serializer: S) -> Result<S::Ok, S::Error> {
    match cause {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}
