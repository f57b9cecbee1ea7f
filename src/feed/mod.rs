//! Feed data: the article model, the wire format, the bounded store and the
//! one-shot REST snapshot.
//!
//! - [`article`] - `Article`, `Sentiment` and `TickerImpact` with lenient
//!   deserialization of upstream quirks
//! - [`wire`] - push-message decoding and batch parsing with per-entry
//!   recovery
//! - [`store`] - `FeedBuffer` (newest-first, deduplicated, capacity 100) and
//!   the shared, subscribable `FeedStore`
//! - [`snapshot`] - `SnapshotFetcher` for `GET /news?limit=N`
//!
//! # Example
//!
//! ```ignore
//! use newswire::feed::{FeedStore, SnapshotFetcher};
//!
//! let store = FeedStore::new();
//! let fetcher = SnapshotFetcher::new("https://api.example.com/prod", timeout)?;
//! fetcher.seed(&store, 50).await?;
//! ```

pub mod article;
pub mod snapshot;
pub mod store;
pub mod wire;

pub use article::{parse_timestamp, Article, Sentiment, TickerImpact};
pub use snapshot::{FetchError, SnapshotFetcher, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SNAPSHOT_LIMIT};
pub use store::{FeedBuffer, FeedStore, FEED_CAPACITY};
pub use wire::{decode_push_message, ArticleBatch, PayloadError, PushMessage};
