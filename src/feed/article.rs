//! Article model as delivered by the push and pull endpoints.
//!
//! Upstream producers fill absent fields with empty strings and may send
//! `null` for maps and lists, so deserialization normalizes those to `None`
//! or empty collections instead of rejecting the article.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Sentiment
// ============================================================================

/// Market-direction label attached to an article or ticker.
///
/// Anything other than `bullish` or `bearish` (case-insensitive), including a
/// missing value, is `Neutral`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Sentiment {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl From<Option<String>> for Sentiment {
    fn from(raw: Option<String>) -> Self {
        match raw.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("bullish") => Sentiment::Bullish,
            Some(s) if s.eq_ignore_ascii_case("bearish") => Sentiment::Bearish,
            _ => Sentiment::Neutral,
        }
    }
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Per-ticker analysis: direction, rationale and suggested actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerImpact {
    pub sentiment: Sentiment,
    #[serde(
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub reasoning: Option<String>,
    /// Ordered as received; may be empty.
    #[serde(deserialize_with = "null_as_default")]
    pub strategies: Vec<String>,
}

/// One analyzed news item. Immutable once received.
///
/// `article_id` is the only required field and the deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub article_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(
        default,
        deserialize_with = "non_empty_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    /// Ticker symbol → impact. Ordering of the map carries no meaning.
    #[serde(default, deserialize_with = "null_as_default")]
    pub affected_tickers: BTreeMap<String, TickerImpact>,
}

impl Article {
    /// Minimal article with only an id and a title. Handy for callers that
    /// synthesize entries and for tests.
    pub fn new(article_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            article_id: article_id.into(),
            title: title.into(),
            description: None,
            url: None,
            published_at: None,
            sentiment: Sentiment::Neutral,
            source: None,
            affected_tickers: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match raw {
        Some(serde_json::Value::String(s)) => parse_timestamp(&s),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        _ => None,
    };
    Ok(parsed)
}

/// Parses a `publishedAt` value.
///
/// Accepts RFC 3339 (`2024-03-01T14:30:00Z`, `2024-03-01T14:30:00+02:00`)
/// and offset-less ISO 8601 (`2024-03-01T14:30:00.123456`), which is read as
/// UTC. Blank or unrecognized input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
