//! Error types for the HTTP adapters

use imagery_core::{ConfigError, FetchError, RankingError};
use thiserror::Error;

/// Errors raised while building an HTTP adapter
#[derive(Error, Debug)]
pub enum HttpError {
    /// reqwest client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    /// Invalid adapter configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        HttpError::Client(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

pub(crate) fn fetch_error(url: &str, err: reqwest::Error) -> FetchError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else {
        err.to_string()
    };
    FetchError::Http {
        url: url.to_string(),
        reason,
    }
}

pub(crate) fn ranking_error(err: reqwest::Error) -> RankingError {
    if err.is_timeout() {
        RankingError::Unavailable("request timed out".to_string())
    } else if err.is_decode() {
        RankingError::InvalidReply(err.to_string())
    } else {
        RankingError::Unavailable(err.to_string())
    }
}
