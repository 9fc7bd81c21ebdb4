use thiserror::Error;

/// Errors raised while loading configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Fetching or parsing the feed failed. Fatal to the current cycle.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("malformed feed: {0}")]
    Parse(String),
}

/// Detail page could not be fetched or read.
///
/// Never leaves the enricher; it is logged and degraded to default details.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("detail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("detail page returned HTTP {0}")]
    Status(u16),

    #[error("challenge solver error: {0}")]
    Solver(String),

    #[error("invalid selector: {0}")]
    Selector(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Transport failure. The message may or may not have arrived.
    #[error("delivery request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered but refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The endpoint answered with something other than an API reply,
    /// such as a proxy error page. Delivery is unknown.
    #[error("unreadable reply (HTTP {status}): {body}")]
    InvalidResponse { status: u16, body: String },
}

impl DeliveryError {
    /// Whether the error should abort the rest of the cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeliveryError::Request(_) | DeliveryError::InvalidResponse { .. }
        )
    }
}

#[derive(Debug, Error)]
#[error("failed to write watermark to {path}: {source}")]
pub struct PersistenceError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// Everything that can abort a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Persist(#[from] PersistenceError),
}
