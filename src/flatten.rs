//! Recursive flattening of nested articles into single-level records.
//!
//! For every key `k` with value `v` (and `merged_key` = `prefix_k`, or `k` at the top level):
//!
//! | value | emitted |
//! |-------|---------|
//! | null | `k: ""` (bare key) |
//! | object | recursive flatten with `prefix = merged_key` |
//! | string / number | `merged_key: v` |
//! | list | `k: "[...]"` (bare key, Python-style list literal) |
//! | bool | [`Error::MalformedRecord`] |
//!
//! Null and list values keep their bare key at any depth. Export schemas built
//! against this extractor depend on that, so a null nested under `news_source`
//! lands in the top-level column of the same name.
//!
//! Keys are visited in `serde_json::Map` order (lexicographic), so when two keys
//! collide the one that sorts last wins. Well-formed feed records do not collide.

use crate::error::{Error, Result};
use crate::models::{Article, FlatRecord, FlatValue, format_number};
use serde_json::Value;

/// Flatten `record` into a [`FlatRecord`], prefixing nested keys with `prefix`.
///
/// # Arguments
///
/// * `record` - A JSON object, typically one [`Article`]
/// * `prefix` - Key prefix for nested values; pass `""` at the top level
///
/// # Returns
///
/// A single-level map following the rules in the module docs. Strings and
/// numbers keep their value, nulls become [`FlatValue::Empty`] and lists are
/// rendered to text with [`render_list`].
///
/// # Errors
///
/// Returns [`Error::MalformedRecord`] naming the flattened key when a field
/// holds a boolean.
///
/// # Example
///
/// ```ignore
/// let flat = flatten(&article, "")?;
/// // {"news_source": {"name": "ČT24"}, "tags": ["a"]} becomes
/// // news_source_name = "ČT24", tags = "['a']"
/// ```
pub fn flatten(record: &Article, prefix: &str) -> Result<FlatRecord> {
    let mut flat = FlatRecord::new();

    for (key, value) in record {
        let merged_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}_{key}")
        };

        match value {
            Value::Null => {
                flat.insert(key.clone(), FlatValue::Empty);
            }
            Value::Object(nested) => {
                flat.extend(flatten(nested, &merged_key)?);
            }
            Value::String(s) => {
                flat.insert(merged_key, FlatValue::Text(s.clone()));
            }
            Value::Number(n) => {
                flat.insert(merged_key, FlatValue::Number(n.clone()));
            }
            Value::Array(items) => {
                flat.insert(key.clone(), FlatValue::Text(render_list(items)));
            }
            Value::Bool(_) => {
                return Err(Error::MalformedRecord {
                    field: merged_key,
                    reason: "invalid type encountered 'bool'".to_string(),
                });
            }
        }
    }

    Ok(flat)
}

/// Render a list the way a Python list literal reads, e.g. `[1, 'a', None]`.
///
/// Strings are quoted and escaped as Python's `repr` does, including `\xNN`/
/// `\uNNNN` escapes for invisible characters such as a no-break space. Floats
/// follow [`format_number`].
pub fn render_list(items: &[Value]) -> String {
    let mut out = String::new();
    render_items(items, &mut out);
    out
}

fn render_items(items: &[Value], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render_value(item, out);
    }
    out.push(']');
}

fn render_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Number(n) => out.push_str(&format_number(n)),
        Value::String(s) => quote_str(s, out),
        Value::Array(items) => render_items(items, out),
        Value::Object(map) => {
            out.push('{');
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                quote_str(k, out);
                out.push_str(": ");
                render_value(v, out);
            }
            out.push('}');
        }
    }
}

// Single quotes unless the text contains a single quote and no double quote.
fn quote_str(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if !is_printable(c) => {
                let code = c as u32;
                if code < 0x100 {
                    out.push_str(&format!("\\x{code:02x}"));
                } else if code < 0x10000 {
                    out.push_str(&format!("\\u{code:04x}"));
                } else {
                    out.push_str(&format!("\\U{code:08x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

// Control, format, private-use and separator characters (other than the plain
// space) are escaped rather than written raw.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    !matches!(
        c as u32,
        0xAD
            | 0x600..=0x605
            | 0x61C
            | 0x6DD
            | 0x70F
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE000..=0xF8FF
            | 0x110BD
            | 0x1D173..=0x1D17A
            | 0xE0001
            | 0xE0020..=0xE007F
            | 0xF0000..=0x10FFFF
    )
}
