//! Persisted extraction state and watermark tracking.
//!
//! The state blob is a JSON object carried between runs by the host runtime.
//! Only one key is used:
//!
//! ```json
//! { "LAST_ID": "105" }
//! ```
//!
//! The runtime hands the previous blob in as `in/state.json` and picks up the
//! new one from `out/state.json` after a successful run.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// State key holding the highest article id written so far.
pub const STATE_LAST_ID: &str = "LAST_ID";

/// Load the starting watermark from a state file.
///
/// A missing file, an empty file or a missing key all mean "first run" and
/// yield `0`. The value may be a decimal string or a JSON integer.
///
/// # Errors
///
/// Returns [`Error::State`] if the file is not a JSON object or `LAST_ID`
/// is not a non-negative integer, and [`Error::Io`] on read failure.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_watermark(path: &Path) -> Result<u64> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No state file; starting from the beginning");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(0);
    }

    let state: Map<String, Value> = serde_json::from_str(&raw)
        .map_err(|e| Error::State(format!("state file is not a JSON object: {e}")))?;

    let watermark = match state.get(STATE_LAST_ID) {
        None | Some(Value::Null) => 0,
        Some(Value::String(s)) => s.trim().parse::<u64>().map_err(|_| {
            Error::State(format!("{STATE_LAST_ID} is not a non-negative integer: {s:?}"))
        })?,
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            Error::State(format!("{STATE_LAST_ID} is not a non-negative integer: {n}"))
        })?,
        Some(other) => {
            return Err(Error::State(format!(
                "{STATE_LAST_ID} has unexpected value {other}"
            )));
        }
    };

    info!(watermark, "Loaded state");
    Ok(watermark)
}

/// Persist the watermark as a decimal string under `LAST_ID`.
#[instrument(level = "info", skip_all, fields(path = %path.display(), watermark = watermark))]
pub async fn save_watermark(path: &Path, watermark: u64) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut state = Map::new();
    state.insert(STATE_LAST_ID.to_string(), Value::String(watermark.to_string()));
    fs::write(path, serde_json::to_vec(&state)?).await?;

    info!("Wrote state");
    Ok(())
}

/// Running maximum of article ids, seeded with the previous watermark.
///
/// The value never decreases, so a run that sees only older or no articles
/// leaves the watermark where it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    start: u64,
    current: u64,
}

impl Watermark {
    /// Start tracking from the previous run's watermark.
    pub fn new(start: u64) -> Self {
        Self {
            start,
            current: start,
        }
    }

    /// Record an exported article id.
    pub fn observe(&mut self, id: u64) {
        self.current = self.current.max(id);
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Highest id seen so far, or the start value if none was higher.
    pub fn value(&self) -> u64 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_state_starts_at_zero() {
        let dir = tempdir().unwrap();
        let watermark = load_watermark(&dir.path().join("state.json")).await.unwrap();
        assert_eq!(watermark, 0);
    }

    #[tokio::test]
    async fn test_empty_object_starts_at_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(load_watermark(&path).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_string_and_number() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        std::fs::write(&path, r#"{"LAST_ID": "100"}"#).unwrap();
        assert_eq!(load_watermark(&path).await.unwrap(), 100);

        std::fs::write(&path, r#"{"LAST_ID": 250}"#).unwrap();
        assert_eq!(load_watermark(&path).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        std::fs::write(&path, r#"{"LAST_ID": "abc"}"#).unwrap();
        assert!(matches!(load_watermark(&path).await, Err(Error::State(_))));

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load_watermark(&path).await, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_save_writes_decimal_string() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("state.json");

        save_watermark(&path, 105).await.unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, serde_json::json!({"LAST_ID": "105"}));
        assert_eq!(load_watermark(&path).await.unwrap(), 105);
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let mut watermark = Watermark::new(100);
        watermark.observe(105);
        watermark.observe(101);
        watermark.observe(42);
        assert_eq!(watermark.value(), 105);
        assert_eq!(watermark.start(), 100);
    }

    #[test]
    fn test_watermark_unchanged_without_articles() {
        let watermark = Watermark::new(7);
        assert_eq!(watermark.value(), 7);
        assert_eq!(watermark.start(), 7);
    }
}
