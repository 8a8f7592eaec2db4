//! Component configuration read from the data directory's `config.json`.
//!
//! ```json
//! {
//!   "parameters": {
//!     "#api_token": "secret",
//!     "feed_id": 4521,
//!     "max_retries": 0,
//!     "timeout_secs": 60
//!   },
//!   "storage": {
//!     "output": {
//!       "tables": [{ "source": "articles.csv", "destination": "in.c-monitora.articles" }]
//!     }
//!   }
//! }
//! ```
//!
//! Everything here is validated before the first request goes out.

use crate::error::{Error, Result};
use crate::schema::Schema;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

pub const KEY_API_TOKEN: &str = "#api_token";
pub const KEY_FEED_ID: &str = "feed_id";
const KEY_OUTPUT_TABLES: &str = "storage.output.tables";

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    storage: Storage,
}

#[derive(Debug, Deserialize)]
struct Parameters {
    #[serde(rename = "#api_token")]
    api_token: Option<String>,
    feed_id: Option<FeedId>,
    columns: Option<Vec<String>>,
    #[serde(default)]
    max_retries: usize,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            api_token: None,
            feed_id: None,
            columns: None,
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Feed ids show up both as numbers and as strings in stored configurations.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
struct Storage {
    #[serde(default)]
    output: StorageOutput,
}

#[derive(Debug, Default, Deserialize)]
struct StorageOutput {
    #[serde(default)]
    tables: Vec<OutputMapping>,
}

/// The single output table mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputMapping {
    /// File name of the table under `out/tables/`.
    pub source: String,
    /// Storage table the runtime loads the file into, if configured.
    #[serde(default)]
    pub destination: Option<String>,
}

/// Validated extractor configuration.
#[derive(Clone)]
pub struct ComponentConfig {
    pub api_token: String,
    pub feed_id: String,
    pub output: OutputMapping,
    pub schema: Schema,
    /// Extra attempts for transient failures; 0 disables retrying.
    pub max_retries: usize,
    pub timeout: Duration,
}

impl fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("api_token", &"<redacted>")
            .field("feed_id", &self.feed_id)
            .field("output", &self.output)
            .field("columns", &self.schema.columns().len())
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ComponentConfig {
    /// Read and validate `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing, unparsable, or fails validation.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).await.map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        let config = Self::from_json(&raw)?;
        info!(feed_id = %config.feed_id, table = %config.output.source, "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(raw).map_err(|e| Error::Config {
            message: format!("invalid config.json: {e}"),
            key: None,
        })?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let params = raw.parameters;

        let api_token = params
            .api_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::config("missing required parameter", KEY_API_TOKEN))?;

        let feed_id = match params.feed_id {
            Some(FeedId::Number(n)) => n.to_string(),
            Some(FeedId::Text(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(Error::config("missing required parameter", KEY_FEED_ID)),
        };

        let mut tables = raw.storage.output.tables;
        if tables.len() != 1 {
            return Err(Error::config(
                format!(
                    "output table mapping with one entry is required, found {}",
                    tables.len()
                ),
                KEY_OUTPUT_TABLES,
            ));
        }
        let output = tables.remove(0);
        if output.source.is_empty()
            || output.source.contains('/')
            || output.source.contains('\\')
            || output.source == ".."
        {
            return Err(Error::config(
                format!("invalid output table source {:?}", output.source),
                KEY_OUTPUT_TABLES,
            ));
        }

        let schema = match params.columns {
            Some(columns) => Schema::new(columns)?,
            None => Schema::monitora(),
        };

        if params.timeout_secs == 0 {
            return Err(Error::config("timeout must be positive", "timeout_secs"));
        }

        Ok(Self {
            api_token,
            feed_id,
            output,
            schema,
            max_retries: params.max_retries,
            timeout: Duration::from_secs(params.timeout_secs),
        })
    }
}
