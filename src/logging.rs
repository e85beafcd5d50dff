// src/logging.rs
// =============================================================================
// tracing setup.
//
// Logs go to stderr so stdout stays clean for --json output. RUST_LOG wins
// when set. Otherwise:
//   --verbose        our debug records
//   live progress    errors only (the status lines already show failures)
//   plain output     our info records, which include every status event
// Dependencies only ever get to log errors by default.
// =============================================================================

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the logging system
pub fn init_logging(verbose: bool, live_progress: bool) -> Result<()> {
    let own_level = match (verbose, live_progress) {
        (true, _) => "mp3_crawler=debug",
        (false, true) => "mp3_crawler=error",
        (false, false) => "mp3_crawler=info",
    };

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("error").add_directive(own_level.parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}
