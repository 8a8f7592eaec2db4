//! # Monitora Feed Extractor
//!
//! Incrementally downloads media-monitoring articles from a Monitora feed and
//! writes them as one flat CSV table, remembering the highest article id so the
//! next run only asks for newer articles.
//!
//! ## Usage
//!
//! ```sh
//! monitora_feed_extractor --data-dir ./data
//! ```
//!
//! ## Pipeline
//!
//! 1. **Configure**: read and validate `config.json` and `in/state.json`
//! 2. **Fetch**: page through `/feed/{id}?lower_id={LAST_ID + 1}` following `next_url`
//! 3. **Flatten**: collapse each nested article into `parent_child` columns
//! 4. **Project**: pin every row to the fixed export schema
//! 5. **Commit**: write the table, its manifest, then `out/state.json`
//!
//! ## Exit codes
//!
//! - `0`: success
//! - `1`: configuration, authentication or unknown-feed error
//! - `2`: any other failure

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod component;
mod config;
mod error;
mod flatten;
mod models;
mod outputs;
mod schema;
mod state;
mod utils;

use cli::Cli;
use component::DataDir;
use utils::error_chain;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();

    // --- Tracing init ---
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "monitora_feed_extractor starting up");
    debug!(data_dir = %args.data_dir.display(), base_url = %args.base_url, "Parsed CLI arguments");

    let data_dir = DataDir::new(&args.data_dir);
    match component::run(&data_dir, &args.base_url).await {
        Ok(summary) => {
            let elapsed = start_time.elapsed();
            info!(
                articles = summary.articles,
                previous_watermark = summary.previous_watermark,
                watermark = summary.watermark,
                table = %summary.table_path.display(),
                millis = elapsed.as_millis() as u64,
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            if e.is_user_error() {
                error!(exit_code = code, "{e}");
            } else {
                error!(exit_code = code, error = %error_chain(&e), "Extraction failed unexpectedly");
            }
            ExitCode::from(code)
        }
    }
}
