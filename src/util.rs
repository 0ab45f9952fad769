//! Small formatting helpers shared by the directive handlers.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// ISO 8601 timestamp for "now" (UTC, second precision).
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Escape text for safe embedding in markup and convert newlines to `<br/>`.
///
/// Used for blob and scalar property rendering unless the node opts into raw
/// markup with `format="html"`.
pub fn html_format(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("<br/>"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Reduce a string to a lowercase alphanumeric form that sorts
/// lexicographically. Used as a hidden prefix on date cells so text-based
/// table sorting orders them chronologically.
pub fn sortable_string(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// SQL-style canonical date representation (`YYYY-MM-DD HH:MM:SS`).
///
/// Accepts RFC 3339 or an already-canonical string; anything else is
/// returned unchanged so the caller can still render it.
pub fn to_sql_date(s: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    s.to_string()
}

/// Format a date string with a chrono format spec, falling back to the raw
/// string when it does not parse.
pub fn format_date(s: &str, format: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc).format(format).to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return dt.format(format).to_string();
    }
    s.to_string()
}

/// Join URL segments with single slashes.
pub fn url_join<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref().trim_matches('/');
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Percent-escape a string for use in a query component.
pub fn url_escape(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
