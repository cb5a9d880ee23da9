//! Error taxonomy for the imagery pipeline.
//!
//! None of these escape the pipeline runner: every stage folds its failures
//! into the run outcome. They exist so each collaborator seam can report a
//! precise reason.

/// Errors produced while turning a raw string into an image identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("url is empty")]
    Empty,

    #[error("unparseable url {url}: {reason}")]
    Unparseable { url: String, reason: String },

    #[error("unsupported scheme {scheme} in {url}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("url has no host: {0}")]
    MissingHost(String),
}

/// Errors from the generative ranking service seam.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RankingError {
    #[error("ranking service unavailable: {0}")]
    Unavailable(String),

    #[error("ranking service returned an invalid reply: {0}")]
    InvalidReply(String),

    #[error("ranking call cancelled")]
    Cancelled,
}

/// Errors from the image download seam.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("http error fetching {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("{url} is not an image (content-type {content_type})")]
    NotAnImage { url: String, content_type: String },

    #[error("{url} exceeds the {limit} byte download limit")]
    TooLarge { url: String, limit: u64 },

    #[error("{url} returned an empty body")]
    Empty { url: String },
}

/// Errors from the storage backend seam.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage rejected upload: {0}")]
    Rejected(String),

    #[error("storage io error: {0}")]
    Io(String),

    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors from splicing image references into an article body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
pub enum PlacementError {
    #[error("image reference for section '{heading}' cannot be rendered: {reason}")]
    UnrenderableReference { heading: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot read config: {0}")]
    Read(String),
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum ImageryError {
    #[error("url error: {0}")]
    Url(#[from] UrlError),

    #[error("ranking error: {0}")]
    Ranking(#[from] RankingError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for imagery operations.
pub type Result<T> = std::result::Result<T, ImageryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_names_url() {
        let err = FetchError::Status {
            url: "https://cdn.example.com/a.jpg".to_string(),
            status: 404,
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("cdn.example.com"));
    }

    #[test]
    fn test_imagery_error_wraps_layers() {
        let err: ImageryError = RankingError::Unavailable("connection refused".to_string()).into();
        assert!(err.to_string().contains("ranking error"));
        assert!(err.to_string().contains("connection refused"));

        let err: ImageryError = StorageError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ))
        .into();
        assert!(err.to_string().contains("read-only"));
    }
}
