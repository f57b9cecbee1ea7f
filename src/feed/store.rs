//! Bounded, deduplicated, newest-first article buffer.
//!
//! [`FeedBuffer`] is the plain data structure. [`FeedStore`] is the shared
//! handle that the push connection and the snapshot fetch both write into; it
//! publishes each new version through a `watch` channel so readers always see
//! a complete buffer, never one mid-truncation.

use super::article::Article;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// Maximum number of articles held in the feed.
pub const FEED_CAPACITY: usize = 100;

// ============================================================================
// FeedBuffer
// ============================================================================

/// Ordered article window, newest first.
///
/// Invariants: no two entries share an `article_id`, and the length never
/// exceeds `capacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBuffer {
    articles: Vec<Article>,
    capacity: usize,
}

impl Default for FeedBuffer {
    fn default() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }
}

impl FeedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            articles: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn contains(&self, article_id: &str) -> bool {
        self.articles.iter().any(|a| a.article_id == article_id)
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    /// Prepends `article` unless its id is already present.
    ///
    /// Returns `false` (buffer untouched) for a duplicate. On insert, tail
    /// entries beyond capacity are dropped.
    pub fn ingest(&mut self, article: Article) -> bool {
        if self.contains(&article.article_id) {
            return false;
        }
        self.articles.insert(0, article);
        self.articles.truncate(self.capacity);
        true
    }

    /// Overwrites the whole buffer with `articles`, keeping their order.
    ///
    /// Previous contents are discarded, not merged. A repeated id within
    /// `articles` keeps only its first occurrence. The result is truncated to
    /// capacity. Returns the new length.
    pub fn replace(&mut self, articles: Vec<Article>) -> usize {
        let mut seen = HashSet::with_capacity(articles.len().min(self.capacity));
        let mut next = Vec::with_capacity(articles.len().min(self.capacity));

        for article in articles {
            if next.len() >= self.capacity {
                break;
            }
            if seen.insert(article.article_id.clone()) {
                next.push(article);
            } else {
                tracing::debug!(article_id = %article.article_id, "Dropping repeated id in snapshot");
            }
        }

        self.articles = next;
        self.articles.len()
    }
}

// ============================================================================
// FeedStore
// ============================================================================

/// Shared handle to the canonical feed.
///
/// Cloning is cheap and every clone writes to the same buffer. Reads return an
/// `Arc` snapshot; writes are copy-on-write when a snapshot is still held, so
/// a reader's view never changes under it.
#[derive(Clone)]
pub struct FeedStore {
    tx: Arc<watch::Sender<Arc<FeedBuffer>>>,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStore")
            .field("len", &self.tx.borrow().len())
            .finish()
    }
}

impl FeedStore {
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(FeedBuffer::with_capacity(capacity)));
        Self { tx: Arc::new(tx) }
    }

    /// Adds a newly pushed article. No-op if its id is already in the feed.
    pub fn ingest(&self, article: Article) -> bool {
        let article_id = article.article_id.clone();
        let inserted = self
            .tx
            .send_if_modified(|buffer| Arc::make_mut(buffer).ingest(article));

        if inserted {
            tracing::debug!(article_id = %article_id, "Ingested article");
        } else {
            tracing::debug!(article_id = %article_id, "Duplicate article ignored");
        }
        inserted
    }

    /// Overwrites the feed with a snapshot. Returns the resulting length.
    pub fn replace(&self, articles: Vec<Article>) -> usize {
        let received = articles.len();
        let mut len = 0;
        self.tx.send_modify(|buffer| {
            len = Arc::make_mut(buffer).replace(articles);
        });
        tracing::debug!(received, kept = len, "Replaced feed");
        len
    }

    /// Current feed, newest first.
    pub fn current_feed(&self) -> Arc<FeedBuffer> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Receiver notified after every `ingest` that inserted and every
    /// `replace`.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedBuffer>> {
        self.tx.subscribe()
    }
}
