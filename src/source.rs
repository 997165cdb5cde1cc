//! Post source contract
//!
//! The cache never talks to the chat platform directly; it goes through this
//! trait so tests can substitute scripted sources.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ImageData, PostRecord};

/// Remote source of image posts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Return the current qualifying posts, oldest first.
    ///
    /// Implementations authenticate if needed, inspect the most recent posts of
    /// the configured channel, keep only posts with at least one image
    /// attachment and resolve each author's username.
    ///
    /// # Errors
    ///
    /// `GalleryError::SourceUnavailable` if authentication or retrieval fails.
    async fn fetch_qualifying_posts(&self) -> Result<Vec<PostRecord>>;

    /// Download one image attachment.
    ///
    /// # Errors
    ///
    /// `GalleryError::SourceUnavailable` if the file cannot be retrieved.
    async fn fetch_image(&self, image_id: &str) -> Result<ImageData>;
}
