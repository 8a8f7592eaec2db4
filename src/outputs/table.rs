//! CSV table output.
//!
//! The dialect matches what the host runtime imports: comma separated, `"`
//! quoting only where needed, `\n` line endings, UTF-8. The header row is the
//! schema's column list verbatim.

use crate::error::{Error, Result};
use crate::schema::Schema;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Encode the header and rows into CSV bytes.
///
/// # Errors
///
/// Returns [`Error::Csv`] if encoding fails, e.g. a row with the wrong number of cells.
pub fn encode_table(schema: &Schema, rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(schema.columns())?;
    for row in rows {
        writer.write_record(row)?;
    }

    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

/// Write the table to `path`, replacing any previous file.
#[instrument(level = "info", skip_all, fields(path = %path.display(), rows = rows.len()))]
pub async fn write_table(path: &Path, schema: &Schema, rows: &[Vec<String>]) -> Result<()> {
    let bytes = encode_table(schema, rows)?;
    fs::write(path, bytes).await?;
    info!("Wrote output table");
    Ok(())
}
