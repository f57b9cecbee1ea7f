use thiserror::Error;
use url::Url;

/// Errors that can occur during endpoint validation.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// The endpoint string could not be parsed.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The endpoint uses a scheme the channel cannot speak.
    #[error("Unsupported scheme: {scheme} (expected {expected})")]
    UnsupportedScheme {
        scheme: String,
        expected: &'static str,
    },
    /// The endpoint has no host component (e.g. `wss:///prod`).
    #[error("Endpoint has no host")]
    MissingHost,
}

/// Validates the push (WebSocket) endpoint.
///
/// Only `ws` and `wss` are accepted. Loopback and private hosts are allowed,
/// since local development servers are a normal target for this client.
///
/// # Examples
///
/// ```
/// use newswire::util::validate_push_endpoint;
///
/// assert!(validate_push_endpoint("wss://example.com/prod").is_ok());
/// assert!(validate_push_endpoint("https://example.com/prod").is_err());
/// assert!(validate_push_endpoint("not a url").is_err());
/// ```
pub fn validate_push_endpoint(endpoint: &str) -> Result<Url, EndpointError> {
    validate(endpoint, &["ws", "wss"], "ws or wss")
}

/// Validates the pull (REST) base endpoint.
///
/// Only `http` and `https` are accepted.
///
/// # Examples
///
/// ```
/// use newswire::util::validate_pull_endpoint;
///
/// assert!(validate_pull_endpoint("https://example.com/prod").is_ok());
/// assert!(validate_pull_endpoint("file:///etc/passwd").is_err());
/// ```
pub fn validate_pull_endpoint(endpoint: &str) -> Result<Url, EndpointError> {
    validate(endpoint, &["http", "https"], "http or https")
}

fn validate(
    endpoint: &str,
    schemes: &[&str],
    expected: &'static str,
) -> Result<Url, EndpointError> {
    let url = Url::parse(endpoint.trim())?;

    if !schemes.contains(&url.scheme()) {
        return Err(EndpointError::UnsupportedScheme {
            scheme: url.scheme().to_owned(),
            expected,
        });
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(EndpointError::MissingHost),
    }
}

/// Joins `path` onto a base endpoint, keeping any stage prefix on the base.
///
/// `Url::join` replaces the last path segment unless the base ends in `/`,
/// which would turn `https://host/prod` + `news` into `https://host/news`.
pub fn join_path(base: &Url, path: &str) -> Result<Url, EndpointError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}
