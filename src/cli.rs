// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Every flag here is optional: anything left out comes from the config file
// (config.json by default), which is created with defaults on first run.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Overrides, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(
    name = "mp3-crawler",
    version,
    about = "Crawl a web page for MP3 links and download them concurrently",
    long_about = "mp3-crawler starts from a seed page, follows the links it finds up to a \
                  maximum depth, collects every URL ending in .mp3 and downloads them into a \
                  local directory with a bounded number of concurrent transfers."
)]
pub struct Cli {
    /// Path to the JSON config file (created with defaults if missing)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl and list the MP3 links found, without downloading
    ///
    /// Example: mp3-crawler crawl https://example.com/music --max-depth 2
    Crawl {
        #[command(flatten)]
        target: CrawlArgs,

        /// Output results in JSON format instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Crawl, then download every MP3 link found
    ///
    /// Example: mp3-crawler download https://example.com/music --concurrency 4
    Download {
        #[command(flatten)]
        target: CrawlArgs,

        /// Directory to save files into (overrides "downloads-directory")
        #[arg(long)]
        downloads_dir: Option<PathBuf>,

        /// Maximum simultaneous downloads (overrides "goroutines")
        #[arg(long)]
        concurrency: Option<usize>,

        /// Give up after this many seconds; unfinished downloads are cancelled
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Log status changes instead of drawing live status lines
        #[arg(long)]
        no_progress: bool,

        /// Output results in JSON format instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Seed page to start from (overrides "url")
    pub url: Option<String>,

    /// How many link hops to follow: 1 = only the seed page (overrides "max-depth")
    #[arg(long)]
    pub max_depth: Option<usize>,
}

impl Commands {
    /// The config-file overrides carried by this subcommand.
    pub fn overrides(&self) -> Overrides {
        match self {
            Commands::Crawl { target, .. } => Overrides {
                url: target.url.clone(),
                max_depth: target.max_depth,
                ..Overrides::default()
            },
            Commands::Download {
                target,
                downloads_dir,
                concurrency,
                ..
            } => Overrides {
                url: target.url.clone(),
                max_depth: target.max_depth,
                downloads_dir: downloads_dir.clone(),
                concurrency: *concurrency,
            },
        }
    }

    pub fn json(&self) -> bool {
        match self {
            Commands::Crawl { json, .. } | Commands::Download { json, .. } => *json,
        }
    }
}
