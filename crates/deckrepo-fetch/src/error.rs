use thiserror::Error;

/// Errors that can be returned by deckrepo-fetch operations.
///
/// Cache corruption and sidecar write failures are absorbed where they occur
/// (logged, then discarded) and intentionally have no variant here.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An HTTP request failed (network error, non-2xx status, etc.).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A filesystem I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Both the network and the on-disk cache were unusable.
    #[error("catalog unavailable: {message}")]
    CatalogUnavailable { message: String },

    /// A redirect chain exceeded the hop limit.
    #[error("too many redirects (limit {limit}) while fetching {url}")]
    TooManyRedirects { url: String, limit: usize },

    /// A redirect response carried a missing or unresolvable Location header.
    #[error("invalid redirect from {url}")]
    InvalidRedirect { url: String },

    /// A URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The referenced installed file does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}
