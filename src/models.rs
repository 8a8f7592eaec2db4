//! Data models for feed pages, articles and their flattened representations.
//!
//! - [`Article`]: a raw article exactly as delivered by the feed endpoint
//! - [`FeedPage`]: one page of the paginated feed response
//! - [`FlatValue`] / [`FlatRecord`]: the single-level form produced by
//!   [`crate::flatten::flatten`]

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A raw article: an arbitrarily nested JSON object.
///
/// Articles are kept as opaque maps because the feed adds fields over time and
/// the export schema is pinned separately (see [`crate::schema::Schema`]).
pub type Article = Map<String, Value>;

/// A single page of the feed endpoint.
///
/// ```json
/// { "articles": [ { "id": 101, ... } ], "next_url": "https://..." }
/// ```
#[derive(Debug, Deserialize)]
pub struct FeedPage {
    /// Articles on this page, in server order.
    pub articles: Vec<Article>,
    /// Absolute URL of the next page; absent, null or empty on the last page.
    #[serde(default)]
    pub next_url: Option<String>,
}

impl FeedPage {
    /// The continuation URL, if the server supplied a non-empty one.
    pub fn next_url(&self) -> Option<&str> {
        self.next_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// A scalar cell value after flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatValue {
    /// Absent or null source value; rendered as an empty cell.
    Empty,
    /// String value (also used for rendered lists).
    Text(String),
    /// Integer or floating-point value, kept in its JSON form.
    Number(Number),
}

impl fmt::Display for FlatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlatValue::Empty => Ok(()),
            FlatValue::Text(s) => f.write_str(s),
            FlatValue::Number(n) => f.write_str(&format_number(n)),
        }
    }
}

impl From<&str> for FlatValue {
    fn from(s: &str) -> Self {
        FlatValue::Text(s.to_string())
    }
}

impl From<u64> for FlatValue {
    fn from(n: u64) -> Self {
        FlatValue::Number(n.into())
    }
}

/// Render a JSON number the way the downstream tables expect it.
///
/// Integers print as-is. Floats use the shortest round-trip digits, written
/// positionally for decimal exponents in `-4..16` (always with a fractional
/// part, so `2.0` stays `2.0`) and in scientific form outside that range with
/// a signed, at least two-digit exponent: `1e-05`, `1e+16`, `1.5e+300`.
pub fn format_number(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() => format_float(f),
        _ => n.to_string(),
    }
}

fn format_float(f: f64) -> String {
    // `{:e}` yields the shortest round-trip form, e.g. `-1.25e3` or `1e-5`.
    let sci = format!("{:e}", f.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let sign = if f.is_sign_negative() { "-" } else { "" };

    if (-4..16).contains(&exp) {
        let point = exp + 1;
        let body = if point <= 0 {
            format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
        } else {
            let point = point as usize;
            if digits.len() <= point {
                format!("{digits}{}.0", "0".repeat(point - digits.len()))
            } else {
                format!("{}.{}", &digits[..point], &digits[point..])
            }
        };
        format!("{sign}{body}")
    } else {
        let (head, tail) = digits.split_at(1);
        let fraction = if tail.is_empty() {
            String::new()
        } else {
            format!(".{tail}")
        };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{sign}{head}{fraction}e{exp_sign}{:02}", exp.unsigned_abs())
    }
}

/// Column name to scalar mapping for one article.
pub type FlatRecord = BTreeMap<String, FlatValue>;

/// Read the article identifier used for the watermark.
///
/// # Errors
///
/// Returns [`Error::MalformedRecord`] if `id` is missing or not a non-negative integer.
pub fn article_id(article: &Article) -> Result<u64> {
    match article.get("id") {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| Error::MalformedRecord {
            field: "id".to_string(),
            reason: format!("expected a non-negative integer, got {n}"),
        }),
        Some(other) => Err(Error::MalformedRecord {
            field: "id".to_string(),
            reason: format!("expected a non-negative integer, got {other}"),
        }),
        None => Err(Error::MalformedRecord {
            field: "id".to_string(),
            reason: "article has no id".to_string(),
        }),
    }
}
