//! One extraction run: config, fetch, flatten, project, write, commit state.
//!
//! Nothing is written until every page has been fetched and every article
//! flattened. The state file is written last, after the table and manifest,
//! so a run that fails at any point leaves the previous watermark in place and
//! the next run retries the same window.

use crate::api::{HttpFeed, RetryFetch, fetch_new_articles};
use crate::config::ComponentConfig;
use crate::error::Result;
use crate::flatten::flatten;
use crate::models::{Article, article_id};
use crate::outputs::manifest::{TableManifest, write_manifest};
use crate::outputs::table::write_table;
use crate::schema::Schema;
use crate::state::{self, Watermark};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

/// Base delay between retries of transient feed failures.
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Layout of the runtime data directory.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `config.json` at the root.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// State handed in from the previous run.
    pub fn input_state_path(&self) -> PathBuf {
        self.root.join("in").join("state.json")
    }

    pub fn output_state_path(&self) -> PathBuf {
        self.root.join("out").join("state.json")
    }

    /// Directory the host runtime imports tables from.
    pub fn tables_dir(&self) -> PathBuf {
        self.root.join("out").join("tables")
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub articles: usize,
    pub previous_watermark: u64,
    pub watermark: u64,
    pub table_path: PathBuf,
}

/// Flatten and project every article, tracking the highest id.
///
/// # Errors
///
/// Returns [`crate::error::Error::MalformedRecord`] on the first article that
/// cannot be flattened or has no usable id.
pub fn transform(
    articles: &[Article],
    schema: &Schema,
    start: u64,
) -> Result<(Vec<Vec<String>>, Watermark)> {
    let mut watermark = Watermark::new(start);
    let mut rows = Vec::with_capacity(articles.len());

    for article in articles {
        let flat = flatten(article, "")?;
        watermark.observe(article_id(article)?);
        rows.push(schema.project(&flat));
    }

    Ok((rows, watermark))
}

/// Execute one extraction run against `base_url`.
///
/// Reads `config.json` and `in/state.json`, downloads every article above the
/// stored watermark, then writes `out/tables/<source>`, its manifest and
/// `out/state.json`, in that order.
///
/// # Arguments
///
/// * `data_dir` - Runtime data directory
/// * `base_url` - Feed API root, e.g. `https://api.monitora.cz`
///
/// # Returns
///
/// A [`RunSummary`] with the article count and the old and new watermarks.
///
/// # Errors
///
/// Configuration problems are reported before any request is made. Fetch and
/// flatten failures are reported before anything is written. See
/// [`crate::error::Error::exit_code`] for how each failure maps to an exit code.
///
/// # Example
///
/// ```ignore
/// let summary = run(&DataDir::new("/data"), "https://api.monitora.cz").await?;
/// println!("{} articles, last id {}", summary.articles, summary.watermark);
/// ```
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.root.display()))]
pub async fn run(data_dir: &DataDir, base_url: &str) -> Result<RunSummary> {
    let config = ComponentConfig::load(&data_dir.config_path()).await?;
    let start = state::load_watermark(&data_dir.input_state_path()).await?;

    let client = HttpFeed::new(config.api_token.as_str(), config.timeout)?;
    let fetcher = RetryFetch::new(client, config.max_retries, RETRY_BASE_DELAY);
    let articles = fetch_new_articles(&fetcher, base_url, &config.feed_id, start).await?;

    let (rows, watermark) = transform(&articles, &config.schema, start)?;

    let tables_dir = data_dir.tables_dir();
    fs::create_dir_all(&tables_dir).await?;
    let table_path = tables_dir.join(&config.output.source);
    commit(
        &table_path,
        &data_dir.output_state_path(),
        &config,
        &rows,
        watermark,
    )
    .await?;

    info!(last_id = watermark.value(), "Last article ID");
    Ok(RunSummary {
        articles: articles.len(),
        previous_watermark: watermark.start(),
        watermark: watermark.value(),
        table_path,
    })
}

async fn commit(
    table_path: &Path,
    state_path: &Path,
    config: &ComponentConfig,
    rows: &[Vec<String>],
    watermark: Watermark,
) -> Result<()> {
    write_table(table_path, &config.schema, rows).await?;
    write_manifest(table_path, &TableManifest::for_articles(&config.output)).await?;
    state::save_watermark(state_path, watermark.value()).await
}
