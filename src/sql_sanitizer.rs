//! Cleanup of model-produced SQL text.
//!
//! Each pass is a pure `&str -> String` function. [`sanitize`] applies
//! [`PASSES`] in order before execution; [`extract_sql_block`] is the
//! lighter extraction used after validation.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EXEC_FENCE: Regex = Regex::new(r"(?is)```(?:sql|mysql)?\n(.*?)\n```").unwrap();
    static ref DIALECT_PREFIX: Regex =
        Regex::new(r"(?i)^\s*(?:mysql|sqlite|postgres(?:ql)?|sql)\b\s*").unwrap();
    static ref STATEMENT_START: Regex = Regex::new(r"(?i)\b(WITH|SELECT)\b").unwrap();
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```sql\s*(.*?)\s*```").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap();
}

pub type SanitizePass = fn(&str) -> String;

/// Ordered passes applied by [`sanitize`].
pub const PASSES: &[(&str, SanitizePass)] = &[
    ("fence_block", extract_fence_block),
    ("dialect_prefix", strip_dialect_prefix),
    ("statement_start", truncate_to_statement),
    ("stray_fences", remove_stray_fences),
];

/// Content of the first ```` ```sql ````/```` ```mysql ````/bare fenced block, else the input.
pub fn extract_fence_block(text: &str) -> String {
    match EXEC_FENCE.captures(text) {
        Some(caps) => caps[1].to_string(),
        None => text.to_string(),
    }
}

/// Drop a leading dialect word such as `mysql` or `sqlite`.
pub fn strip_dialect_prefix(text: &str) -> String {
    DIALECT_PREFIX.replace(text, "").into_owned()
}

/// Cut any prose before the first `WITH` or `SELECT`.
pub fn truncate_to_statement(text: &str) -> String {
    match STATEMENT_START.find(text) {
        Some(m) => text[m.start()..].to_string(),
        None => text.to_string(),
    }
}

pub fn remove_stray_fences(text: &str) -> String {
    text.replace("```", "").trim().to_string()
}

pub fn sanitize(text: &str) -> String {
    PASSES
        .iter()
        .fold(text.to_string(), |acc, (_, pass)| pass(&acc))
}

/// Pull the SQL out of a validator answer: a ```` ```sql ```` block, then any
/// fenced block, then the trimmed text itself.
pub fn extract_sql_block(text: &str) -> String {
    if let Some(caps) = SQL_FENCE.captures(text) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = ANY_FENCE.captures(text) {
        return caps[1].trim().to_string();
    }
    text.trim().to_string()
}
