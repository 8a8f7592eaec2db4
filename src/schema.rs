//! The pinned export schema and row projection.
//!
//! The output table always carries exactly the schema's columns in declared
//! order. Flattened keys outside the schema are dropped and schema columns a
//! record lacks are written as empty cells, so new fields appearing in the feed
//! never change the table shape.

use crate::error::{Error, Result};
use crate::models::FlatRecord;
use std::collections::HashSet;

/// Primary key column of the output table.
pub const PRIMARY_KEY: &str = "id";

/// Column list of the Monitora feed export.
pub const MONITORA_COLUMNS: &[&str] = &[
    "id",
    "title",
    "url",
    "news_source_id",
    "news_source_name",
    "news_source_publisher_id",
    "news_source_publisher_name",
    "news_source_publisher_country",
    "news_source_publisher_reg_no",
    "news_source_publisher_street",
    "news_source_publisher_municipality",
    "news_source_publisher_postal_code",
    "news_source_category_id",
    "news_source_category_name",
    "news_source_category_category_type_id",
    "news_source_category_category_type_text",
    "news_source_category_category_type_shorttext",
    "news_source_category_category_type_label",
    "news_source_category_category_type_color",
    "news_source_category_category_type_fill_color",
    "news_source_country",
    "news_source_country_code",
    "news_source_language",
    "news_source_url",
    "news_source_favicon_url",
    "news_source_monthly_sessions",
    "news_source_monthly_ru",
    "news_source_daily_ru",
    "publication_frequency",
    "press_amount",
    "readership",
    "sold_amount",
    "print_ad_price_full_page",
    "listenership",
    "identical_articles",
    "pdf_url",
    "small_image_url",
    "big_image_url",
    "published",
    "authors",
    "perex",
    "language",
    "word_count",
    "text_relevance",
    "social_shares",
    "pages",
    "all_pages",
    "cover_page",
    "imprint_page",
    "prev_page",
    "next_page",
    "issue",
    "reach",
    "GRP",
    "OTS",
    "AVE",
    "topic_monitor_id",
    "topic_monitor_name",
    "topic_monitor_image_url",
    "keyword_monitors",
    "article_tags",
    "note",
    "discussion_thread_id",
    "text",
    "monthly_ru",
    "publisher",
    "daily_ru",
    "monthly_sessions",
    "sentiment_text",
];

/// An ordered, duplicate-free column list that always contains [`PRIMARY_KEY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Build a schema from an explicit column list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list is empty, has duplicates, or lacks `id`.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();

        if columns.is_empty() {
            return Err(Error::config("column list is empty", "columns"));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.is_empty() {
                return Err(Error::config("column names must not be empty", "columns"));
            }
            if !seen.insert(column.as_str()) {
                return Err(Error::config(format!("duplicate column '{column}'"), "columns"));
            }
        }

        if !seen.contains(PRIMARY_KEY) {
            return Err(Error::config(
                format!("column list must contain the primary key '{PRIMARY_KEY}'"),
                "columns",
            ));
        }

        Ok(Self { columns })
    }

    /// The default Monitora export schema.
    pub fn monitora() -> Self {
        Self {
            columns: MONITORA_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Column names in output order; this is also the header row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Project a flattened record onto the schema, one cell per column.
    ///
    /// # Arguments
    ///
    /// * `record` - Output of [`crate::flatten::flatten`] for one article
    ///
    /// # Returns
    ///
    /// Exactly `self.columns().len()` cells in column order. Keys the schema
    /// does not name are dropped; columns the record lacks are empty strings.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let schema = Schema::new(["id", "title", "note"])?;
    /// let row = schema.project(&flat); // ["101", "Headline", ""]
    /// ```
    pub fn project(&self, record: &FlatRecord) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| record.get(column).map(ToString::to_string).unwrap_or_default())
            .collect()
    }
}
