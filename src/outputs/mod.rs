//! Output writers for the extracted table.
//!
//! # Submodules
//!
//! - [`table`]: writes the CSV table with the pinned header
//! - [`manifest`]: writes the table manifest read by the host runtime
//!
//! # Output Structure
//!
//! ```text
//! data_dir/out/
//! ├── tables/
//! │   ├── articles.csv            # header + one row per article
//! │   └── articles.csv.manifest   # {"incremental": true, "primary_key": ["id"]}
//! └── state.json                  # {"LAST_ID": "105"}
//! ```

pub mod manifest;
pub mod table;
