//! Decoding of push-channel messages and article batches.
//!
//! Messages are first parsed as generic JSON and dispatched on their `type`
//! tag, so a well-formed message with an unknown or missing tag is ignored
//! rather than treated as a payload error. Batches are decoded per article
//! with best-effort recovery: one malformed entry does not discard the rest.

use super::article::Article;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Outbound request sent once the push connection opens.
pub const GET_LATEST_ACTION: &str = "get_latest";

/// Errors for inbound payloads that cannot be applied.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The frame was not valid JSON.
    #[error("Malformed JSON at line {line}, column {column}: {message}")]
    Json {
        line: usize,
        column: usize,
        message: String,
    },
    /// A `news_update` frame whose article fields could not be read.
    #[error("Invalid article in {kind} message: {message}")]
    InvalidArticle { kind: &'static str, message: String },
    /// The frame carried bytes that are not UTF-8.
    #[error("Binary frame is not valid UTF-8")]
    InvalidUtf8,
}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        PayloadError::Json {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        }
    }
}

/// Articles decoded from a list, plus the number of entries skipped as
/// malformed.
#[derive(Debug, Default)]
pub struct ArticleBatch {
    pub articles: Vec<Article>,
    pub skipped: usize,
}

/// A decoded push message.
#[derive(Debug)]
pub enum PushMessage {
    /// A single newly analyzed article.
    NewsUpdate(Article),
    /// A full snapshot that replaces the current feed.
    LatestNews(ArticleBatch),
    /// Server-side failure notice (`{"type":"error","message":...}`).
    ServerError(Option<String>),
    /// Any other tag, or no tag at all.
    Ignored(Option<String>),
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
}

/// Serialized `{"action":"get_latest"}` request.
pub fn get_latest_request() -> String {
    serde_json::to_string(&ActionRequest {
        action: GET_LATEST_ACTION,
    })
    .unwrap_or_else(|_| format!(r#"{{"action":"{}"}}"#, GET_LATEST_ACTION))
}

/// Decodes one text frame from the push channel.
pub fn decode_push_message(raw: &str) -> Result<PushMessage, PayloadError> {
    let value: Value = serde_json::from_str(raw)?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned);

    match kind.as_deref() {
        Some("news_update") => serde_json::from_value::<Article>(value)
            .map(PushMessage::NewsUpdate)
            .map_err(|e| PayloadError::InvalidArticle {
                kind: "news_update",
                message: e.to_string(),
            }),
        Some("latest_news") => {
            let articles = value.get("articles").cloned().unwrap_or(Value::Null);
            Ok(PushMessage::LatestNews(decode_article_list(articles)))
        }
        Some("error") => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned);
            Ok(PushMessage::ServerError(message))
        }
        _ => Ok(PushMessage::Ignored(kind)),
    }
}

/// Decodes a JSON value expected to hold a list of articles.
///
/// `null` or a missing list yields an empty batch. Entries that fail to
/// deserialize are counted in `skipped` and logged at debug level.
pub fn decode_article_list(value: Value) -> ArticleBatch {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Null => return ArticleBatch::default(),
        other => {
            tracing::debug!(kind = %json_kind(&other), "Expected article list, treating as empty");
            return ArticleBatch::default();
        }
    };

    let mut batch = ArticleBatch {
        articles: Vec::with_capacity(entries.len()),
        skipped: 0,
    };

    for entry in entries {
        match serde_json::from_value::<Article>(entry) {
            Ok(article) => batch.articles.push(article),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed article entry");
                batch.skipped += 1;
            }
        }
    }

    batch
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
