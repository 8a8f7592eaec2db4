//! Command-line interface definitions for the Monitora feed extractor.
//!
//! The extractor is normally started by the orchestrator with no arguments;
//! every option can also come from the environment.

use clap::Parser;
use std::path::PathBuf;

/// Default Monitora API root.
pub const DEFAULT_BASE_URL: &str = "https://api.monitora.cz";

/// Command-line arguments for the extractor.
///
/// # Examples
///
/// ```sh
/// # Run against a local data directory
/// monitora_feed_extractor --data-dir ./data
///
/// # Point at a staging API with verbose logging
/// MONITORA_BASE_URL=https://staging.example monitora_feed_extractor -d ./data --log-level debug
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Data directory holding config.json, in/ and out/
    #[arg(short, long, env = "KBC_DATADIR", default_value = "/data")]
    pub data_dir: PathBuf,

    /// Monitora API root URL
    #[arg(long, env = "MONITORA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
