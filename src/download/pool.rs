// src/download/pool.rs
// =============================================================================
// This module downloads a set of media URLs with a cap on concurrency.
//
// How it works:
// - A tokio Semaphore with `concurrency` permits
// - For each URL: wait for a permit, then spawn a task that owns it
// - The permit is dropped when the task ends, which lets the next one start
// - After dispatching everything we await every JoinHandle
//
// So at most `concurrency` transfers are ever in flight, and the function
// only returns when every job has finished. One outcome per URL, always:
// a failure (even a panicking task) becomes a Failed outcome and never
// stops the other jobs.
// =============================================================================

use super::job::{DownloadJob, DownloadOutcome};
use crate::error::DownloadError;
use crate::progress::{Metric, ProgressEvent, ProgressSink, Status};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Downloads every URL into destination_dir
//
// Parameters:
//   client: shared HTTP client (cloned into each task)
//   urls: the media links to fetch
//   destination_dir: existing, writable directory
//   concurrency: max simultaneous transfers (0 is treated as 1)
//   progress: status sink shared by all workers
//   cancel: aborts pending and in-flight transfers
//
// Returns: one DownloadOutcome per input URL, in input order
pub async fn download_all<I>(
    client: &Client,
    urls: I,
    destination_dir: &Path,
    concurrency: usize,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> Vec<DownloadOutcome>
where
    I: IntoIterator<Item = String>,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    // Jobs that could not even be built are finished immediately; the rest
    // are awaited below. Each entry keeps its job so a dead task can still
    // be reported.
    let mut slots: Vec<Slot> = Vec::new();

    for url in urls {
        let job = match DownloadJob::new(&url, destination_dir) {
            Ok(job) => job,
            Err(e) => {
                report_failure(progress.as_ref(), &url, &url, &e);
                slots.push(Slot::Done(DownloadOutcome::failed(url, None, e)));
                continue;
            }
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Only happens if the semaphore is closed, which we never do
                let cause = DownloadError::Aborted(url.clone());
                report_failure(progress.as_ref(), &url, &job.file_name(), &cause);
                slots.push(Slot::Done(DownloadOutcome::failed(url, Some(job.destination), cause)));
                continue;
            }
        };

        let client = client.clone();
        let progress = Arc::clone(&progress);
        let cancel = cancel.clone();
        let task_job = job.clone();
        let handle = tokio::spawn(async move {
            // Held until this job is completely done, write included
            let _permit = permit;
            run_job(&client, task_job, progress.as_ref(), &cancel).await
        });
        slots.push(Slot::Running(job, handle));
    }

    info!(jobs = slots.len(), "all downloads dispatched, waiting for them to finish");

    let mut outcomes = Vec::with_capacity(slots.len());
    for slot in slots {
        let outcome = match slot {
            Slot::Done(outcome) => outcome,
            Slot::Running(job, handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(url = %job.source_url, error = %e, "download task died");
                    let cause = DownloadError::Aborted(job.source_url.clone());
                    report_failure(progress.as_ref(), &job.source_url, &job.file_name(), &cause);
                    DownloadOutcome::failed(job.source_url, Some(job.destination), cause)
                }
            },
        };
        outcomes.push(outcome);
    }

    outcomes
}

enum Slot {
    Done(DownloadOutcome),
    Running(DownloadJob, JoinHandle<DownloadOutcome>),
}

async fn run_job(
    client: &Client,
    job: DownloadJob,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> DownloadOutcome {
    let label = job.file_name();
    let key = job.source_url.clone();
    progress.on_event(&ProgressEvent::download(Status::Loading, &key, &label));

    match job.run(client, cancel).await {
        Ok(bytes) => {
            debug!(url = %job.source_url, bytes, "download finished");
            progress.on_event(
                &ProgressEvent::download(Status::Success, &key, &label).with_metric(Metric::Bytes(bytes)),
            );
            DownloadOutcome::success(job, bytes)
        }
        Err(e) => {
            if e.is_cancelled() {
                info!(url = %job.source_url, "download cancelled");
            } else {
                warn!(url = %job.source_url, error = %e, "download failed");
            }
            progress.on_event(&ProgressEvent::download(Status::Failed, &key, &label).with_detail(e.to_string()));
            DownloadOutcome::failed(job.source_url, Some(job.destination), e)
        }
    }
}

// LOADING then FAILED, so every job shows up exactly once in the status lines
fn report_failure(progress: &dyn ProgressSink, url: &str, label: &str, cause: &DownloadError) {
    warn!(url, error = %cause, "download failed");
    progress.on_event(&ProgressEvent::download(Status::Loading, url, label));
    progress.on_event(&ProgressEvent::download(Status::Failed, url, label).with_detail(cause.to_string()));
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why acquire the permit BEFORE spawning?
//    - The dispatch loop itself waits, so we never have more than
//      `concurrency` tasks alive, not just running
//    - acquire_owned() gives a permit that can move into the task
//
// 2. Why keep JoinHandles instead of fire-and-forget?
//    - Awaiting them is the barrier: the run isn't over until every file is
//    - A JoinError (panic) still maps back to the job that caused it
//
// 3. Why Arc<dyn ProgressSink>?
//    - Spawned tasks need 'static data, so the sink is shared by refcount
//    - The sink serializes its own output (see progress/)
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::OutcomeStatus;
    use crate::fetch::build_client;
    use crate::progress::testing::RecordingProgress;
    use crate::progress::Channel;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn run(
        urls: Vec<String>,
        dir: &Path,
        concurrency: usize,
        progress: Arc<RecordingProgress>,
        cancel: CancellationToken,
    ) -> Vec<DownloadOutcome> {
        let client = build_client().unwrap();
        download_all(&client, urls, dir, concurrency, progress, cancel).await
    }

    fn leftover_partials(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".part"))
            .collect()
    }

    #[tokio::test]
    async fn test_successful_download_writes_file() {
        let server = MockServer::start().await;
        serve(&server, "/a.mp3", ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024])).await;
        let dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(RecordingProgress::default());

        let outcomes = run(
            vec![format!("{}/a.mp3", server.uri())],
            dir.path(),
            1,
            progress.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Success);
        assert_eq!(outcomes[0].bytes_written, 1024);
        assert!(outcomes[0].cause.is_none());

        let file = dir.path().join("a.mp3");
        assert_eq!(std::fs::metadata(&file).unwrap().len(), 1024);
        assert!(leftover_partials(dir.path()).is_empty());

        let events = progress.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].metric, Some(Metric::Bytes(1024)));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_existing_file_alone() {
        let server = MockServer::start().await;
        serve(&server, "/gone.mp3", ResponseTemplate::new(404)).await;
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("gone.mp3");
        std::fs::write(&existing, b"previous download").unwrap();
        let progress = Arc::new(RecordingProgress::default());

        let outcomes = run(
            vec![format!("{}/gone.mp3", server.uri())],
            dir.path(),
            2,
            progress.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(outcomes[0].bytes_written, 0);
        assert!(matches!(outcomes[0].cause, Some(DownloadError::Fetch(_))));
        assert_eq!(std::fs::read(&existing).unwrap(), b"previous download");
        assert_eq!(progress.count(Channel::Download, Status::Failed), 1);
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let server = MockServer::start().await;
        let delayed = ResponseTemplate::new(200)
            .set_body_bytes(vec![1u8; 64])
            .set_delay(Duration::from_millis(150));
        let mut urls = Vec::new();
        for i in 0..6 {
            let route = format!("/track{i}.mp3");
            serve(&server, &route, delayed.clone()).await;
            urls.push(format!("{}{route}", server.uri()));
        }
        let dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(RecordingProgress::default());

        let outcomes = run(urls, dir.path(), 2, progress.clone(), CancellationToken::new()).await;

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(DownloadOutcome::is_success));
        // Every response is slow, so both permits are busy at once
        assert_eq!(progress.max_in_flight(), 2);
        assert_eq!(progress.count(Channel::Download, Status::Success), 6);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_others() {
        let server = MockServer::start().await;
        serve(&server, "/ok1.mp3", ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10])).await;
        serve(&server, "/broken.mp3", ResponseTemplate::new(500)).await;
        serve(&server, "/ok2.mp3", ResponseTemplate::new(200).set_body_bytes(vec![0u8; 20])).await;
        let dir = tempfile::tempdir().unwrap();
        let urls = vec![
            format!("{}/ok1.mp3", server.uri()),
            format!("{}/broken.mp3", server.uri()),
            format!("{}/ok2.mp3", server.uri()),
        ];

        let outcomes = run(
            urls,
            dir.path(),
            3,
            Arc::new(RecordingProgress::default()),
            CancellationToken::new(),
        )
        .await;

        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OutcomeStatus::Success, OutcomeStatus::Failed, OutcomeStatus::Success]
        );
        assert_eq!(outcomes[2].bytes_written, 20);
    }

    #[tokio::test]
    async fn test_url_without_file_name_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(RecordingProgress::default());

        let outcomes = run(
            vec![format!("{}/", server.uri())],
            dir.path(),
            1,
            progress.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].cause, Some(DownloadError::NoFileName(_))));
        assert!(outcomes[0].destination.is_none());
        assert_eq!(progress.count(Channel::Download, Status::Failed), 1);
    }

    #[tokio::test]
    async fn test_same_file_name_later_write_wins() {
        let server = MockServer::start().await;
        serve(&server, "/x/a.mp3", ResponseTemplate::new(200).set_body_bytes(b"first".to_vec())).await;
        serve(&server, "/y/a.mp3", ResponseTemplate::new(200).set_body_bytes(b"second".to_vec())).await;
        let dir = tempfile::tempdir().unwrap();
        let urls = vec![format!("{}/x/a.mp3", server.uri()), format!("{}/y/a.mp3", server.uri())];

        // One at a time, so the order of the writes is the order of the input
        let outcomes = run(
            urls,
            dir.path(),
            1,
            Arc::new(RecordingProgress::default()),
            CancellationToken::new(),
        )
        .await;

        assert!(outcomes.iter().all(DownloadOutcome::is_success));
        assert_eq!(std::fs::read(dir.path().join("a.mp3")).unwrap(), b"second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_file_name_at_the_same_time_never_mixes() {
        const SIZE: usize = 4 * 1024 * 1024;
        let server = MockServer::start().await;
        serve(&server, "/x/a.mp3", ResponseTemplate::new(200).set_body_bytes(vec![1u8; SIZE])).await;
        serve(&server, "/y/a.mp3", ResponseTemplate::new(200).set_body_bytes(vec![2u8; SIZE])).await;
        let urls = vec![format!("{}/x/a.mp3", server.uri()), format!("{}/y/a.mp3", server.uri())];

        for _ in 0..5 {
            let dir = tempfile::tempdir().unwrap();
            let progress = Arc::new(RecordingProgress::default());
            let outcomes = run(urls.clone(), dir.path(), 2, progress.clone(), CancellationToken::new()).await;

            assert_eq!(outcomes.len(), 2);
            for outcome in &outcomes {
                assert!(outcome.is_success(), "unexpected failure: {:?}", outcome.cause);
                assert_eq!(outcome.bytes_written, SIZE as u64);
            }

            let written = std::fs::read(dir.path().join("a.mp3")).unwrap();
            assert_eq!(written.len(), SIZE);
            let first = written[0];
            assert!(first == 1 || first == 2);
            assert!(written.iter().all(|&b| b == first), "file mixes both sources");
            assert!(leftover_partials(dir.path()).is_empty());
            assert_eq!(progress.count(Channel::Download, Status::Success), 2);
        }
    }

    #[tokio::test]
    async fn test_cancel_during_transfer_aborts_cleanly() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/a.mp3",
            ResponseTemplate::new(200)
                .set_body_bytes(vec![9u8; 1024])
                .set_delay(Duration::from_secs(5)),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.mp3");
        std::fs::write(&existing, b"previous download").unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let progress = Arc::new(RecordingProgress::default());
        let started = std::time::Instant::now();
        let outcomes = run(
            vec![format!("{}/a.mp3", server.uri())],
            dir.path(),
            1,
            progress.clone(),
            cancel,
        )
        .await;

        // The slow response was abandoned, not waited out
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(outcomes[0].bytes_written, 0);
        assert!(outcomes[0].cause.as_ref().unwrap().is_cancelled());
        assert_eq!(std::fs::read(&existing).unwrap(), b"previous download");
        assert!(leftover_partials(dir.path()).is_empty());
        assert_eq!(progress.count(Channel::Download, Status::Failed), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_body_is_streaming_removes_partial_file() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        // Sends the headers and part of the body, then stalls
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[5u8; 4096]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.mp3");
        std::fs::write(&existing, b"previous download").unwrap();

        let progress = Arc::new(RecordingProgress::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watcher = progress.clone();
        let partial_dir = dir.path().to_path_buf();
        tokio::spawn(async move {
            // Wait until the partial file exists, so the cancel lands mid-body
            loop {
                if watcher.count(Channel::Download, Status::Loading) == 1
                    && !leftover_partials(&partial_dir).is_empty()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            trigger.cancel();
        });

        let outcomes = tokio::time::timeout(
            Duration::from_secs(10),
            run(vec![format!("http://{addr}/a.mp3")], dir.path(), 1, progress.clone(), cancel),
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
        assert!(outcomes[0].cause.as_ref().unwrap().is_cancelled());
        assert_eq!(std::fs::read(&existing).unwrap(), b"previous download");
        assert!(leftover_partials(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_still_reports_every_job() {
        let server = MockServer::start().await;
        serve(&server, "/a.mp3", ResponseTemplate::new(200).set_body_bytes(vec![0u8; 8])).await;
        serve(&server, "/b.mp3", ResponseTemplate::new(200).set_body_bytes(vec![0u8; 8])).await;
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = run(
            vec![format!("{}/a.mp3", server.uri()), format!("{}/b.mp3", server.uri())],
            dir.path(),
            1,
            Arc::new(RecordingProgress::default()),
            cancel,
        )
        .await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert_eq!(outcome.status, OutcomeStatus::Failed);
            assert!(outcome.cause.as_ref().unwrap().is_cancelled());
        }
        assert!(!dir.path().join("a.mp3").exists());
        assert!(!dir.path().join("b.mp3").exists());
    }

    #[tokio::test]
    async fn test_empty_job_set() {
        let dir = tempfile::tempdir().unwrap();
        let outcomes = run(
            Vec::new(),
            dir.path(),
            4,
            Arc::new(RecordingProgress::default()),
            CancellationToken::new(),
        )
        .await;
        assert!(outcomes.is_empty());
    }
}
