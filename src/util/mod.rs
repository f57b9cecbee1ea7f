//! Utility functions for common operations.
//!
//! - **Endpoint validation**: scheme checks for the push and pull endpoints
//! - **Text processing**: sanitizing network text for terminal output and
//!   truncating payloads for log previews
//!
//! # Examples
//!
//! ```
//! use newswire::util::{validate_push_endpoint, sanitize_line};
//!
//! let url = validate_push_endpoint("wss://example.com/prod").unwrap();
//! assert_eq!(url.scheme(), "wss");
//!
//! assert_eq!(sanitize_line("clean"), "clean");
//! ```

mod endpoint;
mod text;

pub use endpoint::{join_path, validate_pull_endpoint, validate_push_endpoint, EndpointError};
pub use text::{preview, sanitize_line};
