//! Live financial news feed client.
//!
//! A [`FeedSession`] keeps a bounded, deduplicated, newest-first list of
//! articles current from two sources: a WebSocket push channel that
//! reconnects on a fixed delay, and a one-shot REST snapshot at startup.

pub mod config;
pub mod connection;
pub mod feed;
pub mod session;
pub mod util;

pub use config::{Config, ConfigError};
pub use connection::{ConnectionState, StatusDisplay, StatusStyle};
pub use feed::{Article, FeedStore, Sentiment};
pub use session::FeedSession;
