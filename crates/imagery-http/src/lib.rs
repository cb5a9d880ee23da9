//! HTTP adapters for the article imagery pipeline
//!
//! - [`HttpImageFetcher`]: downloads candidate images with a timeout and size cap
//! - [`ChatRankingClient`]: ranks candidates through an OpenAI-compatible
//!   chat-completions endpoint

pub mod error;
pub mod fetcher;
pub mod ranking;

pub use error::{HttpError, Result};
pub use fetcher::{is_image_content_type, HttpFetcherConfig, HttpImageFetcher};
pub use ranking::{ChatRankingClient, ChatRankingConfig};

/// Parse an environment variable, ignoring it (with a warning) when malformed.
pub(crate) fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}
