// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Load config.json and apply the command-line overrides
// 3. Crawl from the seed page, collecting MP3 links
// 4. (download) Fetch every link with a bounded worker pool
// 5. Print results and exit with a proper code
//    (0 = all good, 1 = something failed, 2 = error)
// =============================================================================

mod cli;
mod config;
mod crawl;
mod download;
mod error;
mod extract;
mod fetch;
mod logging;
mod progress;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::{ConfigFile, Settings};
use crawl::CrawlReport;
use download::{DownloadOutcome, OutcomeStatus};
use progress::{format_megabytes, LogProgress, ProgressSink, TerminalProgress};
use reqwest::Client;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = nothing failed
//   Ok(1) = at least one page (crawl) or file (download) failed
//   Err   = configuration or setup error
async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let plain_output = match &cli.command {
        Commands::Crawl { json, .. } => *json,
        Commands::Download { json, no_progress, .. } => *json || *no_progress,
    };
    let live_progress = !plain_output && std::io::stderr().is_terminal();
    logging::init_logging(cli.verbose, live_progress)?;

    let settings = ConfigFile::load_or_create(&cli.config)?.resolve(cli.command.overrides())?;
    info!(
        url = %settings.url,
        max_depth = settings.max_depth,
        concurrency = settings.concurrency,
        "configuration loaded from {}",
        cli.config.display()
    );

    let client = fetch::build_client().context("Failed to create HTTP client")?;

    // Ctrl-C and --timeout both end up here
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    // Keep the concrete terminal renderer around for the table header
    let terminal = live_progress.then(|| Arc::new(TerminalProgress::new()));
    let progress: Arc<dyn ProgressSink> = match &terminal {
        Some(terminal) => terminal.clone(),
        None => Arc::new(LogProgress),
    };

    let json = cli.command.json();
    match cli.command {
        Commands::Crawl { .. } => handle_crawl(&client, &settings, json, progress, &cancel).await,
        Commands::Download { timeout, .. } => {
            if let Some(secs) = timeout {
                cancel_after(Duration::from_secs(secs), cancel.clone());
            }
            settings.prepare_downloads_dir()?;
            handle_download(&client, &settings, json, progress, terminal.as_deref(), &cancel).await
        }
    }
}

// Handles the 'crawl' subcommand: list the MP3 links, download nothing
async fn handle_crawl(
    client: &Client,
    settings: &Settings,
    json: bool,
    progress: Arc<dyn ProgressSink>,
    cancel: &CancellationToken,
) -> Result<i32> {
    let report = crawl::crawl_website(client, &settings.url, settings.max_depth, progress.as_ref(), cancel).await;
    progress.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_crawl_summary(&settings.url, &report);
        for url in &report.media {
            println!("{}", url);
        }
    }

    Ok(if report.failures.is_empty() { 0 } else { 1 })
}

// Handles the 'download' subcommand: crawl, then download everything found
async fn handle_download(
    client: &Client,
    settings: &Settings,
    json: bool,
    progress: Arc<dyn ProgressSink>,
    terminal: Option<&TerminalProgress>,
    cancel: &CancellationToken,
) -> Result<i32> {
    let report = crawl::crawl_website(client, &settings.url, settings.max_depth, progress.as_ref(), cancel).await;

    if report.media.is_empty() {
        // Not an error: the pages simply didn't link to any MP3 files
        progress.finish();
        if json {
            print_results(&settings.url, &report, &[], true)?;
        } else {
            print_crawl_summary(&settings.url, &report);
            println!("✅ No MP3 links found, nothing to download");
        }
        return Ok(0);
    }

    info!(
        files = report.media.len(),
        dir = %settings.downloads_dir.display(),
        "starting downloads"
    );
    if let Some(terminal) = terminal {
        terminal.println(&format!("{:<8} {:>10}  {}", "STATUS", "SIZE", "NAME"));
    }

    let outcomes = download::download_all(
        client,
        report.media.iter().cloned(),
        &settings.downloads_dir,
        settings.concurrency,
        Arc::clone(&progress),
        cancel.clone(),
    )
    .await;
    progress.finish();

    print_results(&settings.url, &report, &outcomes, json)?;

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    Ok(if failed > 0 { 1 } else { 0 })
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling outstanding work");
            cancel.cancel();
        }
    });
}

fn cancel_after(limit: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        warn!(seconds = limit.as_secs(), "time limit reached, cancelling outstanding work");
        cancel.cancel();
    });
}

#[derive(Serialize)]
struct RunSummary<'a> {
    seed: &'a str,
    crawl: &'a CrawlReport,
    downloads: &'a [DownloadOutcome],
}

// Prints the results either as a table or JSON
fn print_results(seed: &str, report: &CrawlReport, outcomes: &[DownloadOutcome], json: bool) -> Result<()> {
    if json {
        let summary = RunSummary {
            seed,
            crawl: report,
            downloads: outcomes,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_crawl_summary(seed, report);
        print_table(outcomes);
    }
    Ok(())
}

fn print_crawl_summary(seed: &str, report: &CrawlReport) {
    println!("🔍 Crawled {} page(s) from {}", report.pages_fetched, seed);
    for failure in &report.failures {
        println!("   ❌ {} ({})", failure.url, failure.error);
    }
    println!("🎵 Found {} MP3 link(s)", report.media.len());
    println!();
}

// One row per download, numbered like "3/12"
fn print_table(outcomes: &[DownloadOutcome]) {
    println!("{:<8} {:<10} {:>10}  {}", "#", "STATUS", "SIZE", "NAME");
    println!("{}", "=".repeat(72));

    let total = outcomes.len();
    for (i, outcome) in outcomes.iter().enumerate() {
        let size = match outcome.status {
            OutcomeStatus::Success => format_megabytes(outcome.bytes_written),
            OutcomeStatus::Failed => "-".to_string(),
        };
        println!(
            "{:<8} {:<10} {:>10}  {}",
            format!("{}/{}", i + 1, total),
            format_status(outcome.status),
            size,
            display_name(outcome)
        );
        if let Some(cause) = &outcome.cause {
            println!("{:<8} ↳ {}", "", cause);
        }
    }

    println!();

    let ok_count = outcomes.iter().filter(|o| o.is_success()).count();
    let bytes: u64 = outcomes.iter().map(|o| o.bytes_written).sum();
    println!("📊 Summary:");
    println!("   ✅ Downloaded: {} ({})", ok_count, format_megabytes(bytes));
    println!("   ❌ Failed: {}", total - ok_count);
    println!("   📋 Total: {}", total);
}

fn format_status(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Success => "✅ SUCCESS",
        OutcomeStatus::Failed => "❌ FAILED",
    }
}

// File name when we have one, otherwise the URL (enough to retry by hand)
fn display_name(outcome: &DownloadOutcome) -> String {
    outcome
        .destination
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| outcome.url.clone())
}
