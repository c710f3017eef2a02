//! Field alias table
//!
//! Each canonical field lists the names the provider has used for it, in
//! priority order. Dotted entries address nested objects.

use serde_json::Value;

pub(crate) const SLUG: &[&str] = &["slug", "movie_slug"];
pub(crate) const TITLE: &[&str] = &["name", "title"];
pub(crate) const ORIGINAL_TITLE: &[&str] = &["origin_name", "original_title", "original_name"];
pub(crate) const DESCRIPTION: &[&str] = &["description", "content", "overview"];
pub(crate) const POSTER: &[&str] = &["poster_url", "poster", "posterUrl", "image"];
pub(crate) const THUMB: &[&str] = &["thumb_url", "thumbnail", "thumb", "thumbUrl"];
pub(crate) const YEAR: &[&str] = &["year", "release_year"];
pub(crate) const DIRECTOR: &[&str] = &["director", "directors"];
pub(crate) const DURATION: &[&str] = &["time", "duration", "runtime"];
pub(crate) const LANGUAGE: &[&str] = &["lang", "language"];
pub(crate) const RATING: &[&str] = &[
    "rating",
    "tmdb.vote_average",
    "imdb.vote_average",
    "vote_average",
];
pub(crate) const TRAILER: &[&str] = &["trailer_url", "trailer"];
pub(crate) const GENRES: &[&str] = &["category", "genres", "genre"];
pub(crate) const COUNTRY: &[&str] = &["country", "countries"];
pub(crate) const VIEWS: &[&str] = &["view", "views"];

/// Resolve a possibly dotted path
fn path<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(value, |current, part| current.get(part))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// First alias holding a non-blank value
pub(crate) fn lookup<'a>(value: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| path(value, alias))
        .find(|candidate| !is_blank(candidate))
}

/// Render a scalar, a `{name}` object or a list of either as text
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("name").and_then(as_text),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(as_text)
                .filter(|s| !s.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null => None,
    }
}

/// Text field, empty when absent or malformed
pub(crate) fn text(value: &Value, aliases: &[&str]) -> String {
    lookup(value, aliases).and_then(as_text).unwrap_or_default()
}

pub(crate) fn optional_text(value: &Value, aliases: &[&str]) -> Option<String> {
    Some(text(value, aliases)).filter(|s| !s.is_empty())
}

pub(crate) fn integer(value: &Value, aliases: &[&str]) -> Option<i64> {
    lookup(value, aliases).and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

pub(crate) fn float(value: &Value, aliases: &[&str]) -> Option<f64> {
    lookup(value, aliases).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Distinct, trimmed tokens from a comma-separated string or a list
pub(crate) fn tokens(value: &Value, aliases: &[&str]) -> Vec<String> {
    let raw = text(value, aliases);
    let mut out: Vec<String> = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !out.iter().any(|existing| existing == token) {
            out.push(token.to_string());
        }
    }
    out
}
