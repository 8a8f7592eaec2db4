//! Table manifest for the host runtime.
//!
//! The runtime loads `out/tables/<source>` according to the sibling
//! `<source>.manifest` file. The extractor always declares an incremental load
//! keyed on `id`, so re-delivered articles are merged rather than duplicated.

use crate::config::OutputMapping;
use crate::error::Result;
use crate::schema::PRIMARY_KEY;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub incremental: bool,
    pub primary_key: Vec<String>,
}

impl TableManifest {
    /// Manifest for the article table described by `mapping`.
    pub fn for_articles(mapping: &OutputMapping) -> Self {
        Self {
            destination: mapping.destination.clone(),
            incremental: true,
            primary_key: vec![PRIMARY_KEY.to_string()],
        }
    }
}

/// Path of the manifest belonging to `table_path`.
pub fn manifest_path(table_path: &Path) -> PathBuf {
    let mut name = table_path.as_os_str().to_owned();
    name.push(".manifest");
    PathBuf::from(name)
}

/// Write `manifest` next to `table_path`.
#[instrument(level = "info", skip_all, fields(table = %table_path.display()))]
pub async fn write_manifest(table_path: &Path, manifest: &TableManifest) -> Result<PathBuf> {
    let path = manifest_path(table_path);
    fs::write(&path, serde_json::to_vec_pretty(manifest)?).await?;
    info!(path = %path.display(), "Wrote table manifest");
    Ok(path)
}
