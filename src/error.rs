//! Error types for the channel gallery
//!
//! One taxonomy shared by the Mattermost client, the cache and the server glue.

use thiserror::Error;

/// Result type alias for gallery operations
pub type Result<T> = std::result::Result<T, GalleryError>;

/// Gallery error types
#[derive(Debug, Error)]
pub enum GalleryError {
    /// Malformed settings file or invalid setting value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing required setting or secret
    #[error("Missing required setting: {0}")]
    MissingSetting(String),

    /// Authentication with or retrieval from the chat platform failed
    #[error("Post source unavailable: {0}")]
    SourceUnavailable(String),

    /// Chat platform answered with a non-success status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Disk read, write or delete failure
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A post that cannot become a cache entry
    #[error("Invalid post: {0}")]
    InvalidPost(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl GalleryError {
    /// Wrap any error into a source-unavailable error
    pub fn source_unavailable(err: impl std::fmt::Display) -> Self {
        GalleryError::SourceUnavailable(err.to_string())
    }

    /// Check if the error came from the remote post source
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, GalleryError::SourceUnavailable(_))
    }

    /// Check if retrying on the next cycle can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GalleryError::SourceUnavailable(_)
            | GalleryError::Http(_)
            | GalleryError::Storage(_) => true,
            GalleryError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GalleryError::MissingSetting("MATTERMOST_BOT_TOKEN".to_string());
        assert!(err.to_string().contains("MATTERMOST_BOT_TOKEN"));

        let err = GalleryError::Api {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(err.to_string(), "API error 404: Not Found");
    }

    #[test]
    fn test_error_retryable() {
        assert!(GalleryError::source_unavailable("timeout").is_retryable());
        assert!(GalleryError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!GalleryError::Api {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(!GalleryError::Config("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_source_unavailable() {
        let err = GalleryError::source_unavailable("login failed");
        assert!(err.is_source_unavailable());
        assert!(err.to_string().contains("login failed"));
        assert!(!GalleryError::InvalidPost("p1".to_string()).is_source_unavailable());
    }
}
