#![allow(missing_docs)]
//! Value types shared by the post source, the cache and the query surface.

use serde::{Deserialize, Serialize};

use crate::error::{GalleryError, Result};

/// File name of the per-entry metadata document.
pub const METADATA_FILE: &str = "meta.json";

/// File written last into an entry directory once all images are on disk.
pub const COMPLETION_MARKER: &str = ".complete";

/// One fetched post carrying at least one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: String,
    pub create_at: i64,
    pub update_at: i64,
    pub user_id: String,
    pub username: String,
    pub message: String,
    pub image_ids: Vec<String>,
}

impl PostRecord {
    /// Build a record, rejecting posts without images.
    pub fn new(
        post_id: impl Into<String>,
        create_at: i64,
        update_at: i64,
        user_id: impl Into<String>,
        username: impl Into<String>,
        message: impl Into<String>,
        image_ids: Vec<String>,
    ) -> Result<Self> {
        let record = Self {
            post_id: post_id.into(),
            create_at,
            update_at,
            user_id: user_id.into(),
            username: username.into(),
            message: message.into(),
            image_ids,
        };
        record.validate()?;
        Ok(record)
    }

    /// Check the invariants a record needs before it can become a cache entry.
    pub fn validate(&self) -> Result<()> {
        if self.image_ids.is_empty() {
            return Err(GalleryError::InvalidPost(format!(
                "post {} has no images",
                self.post_id
            )));
        }

        if !is_safe_key(&self.post_id) {
            return Err(GalleryError::InvalidPost(format!(
                "post id {:?} is not a valid cache key",
                self.post_id
            )));
        }

        Ok(())
    }

    /// Project the record onto the fields stored in `meta.json`.
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            create_at: self.create_at,
            update_at: self.update_at,
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            message: self.message.clone(),
        }
    }
}

/// Post ids become directory names, so they must be a single plain path component.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0'])
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub create_at: i64,
    pub update_at: i64,
    pub user_id: String,
    pub username: String,
    pub message: String,
}

impl EntryMetadata {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A cached post as found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub post_id: String,
    pub metadata: EntryMetadata,
    /// Image file names inside the entry directory.
    pub images: Vec<String>,
}

/// Downloaded bytes of one image attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub image_id: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn new(image_id: impl Into<String>, extension: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            image_id: image_id.into(),
            extension: extension.into(),
            bytes,
        }
    }

    /// Name the image is stored under: `{image_id}.{extension}`.
    pub fn file_name(&self) -> String {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            self.image_id.clone()
        } else {
            format!("{}.{}", self.image_id, extension)
        }
    }
}

/// Outcome of one `CacheStore::reconcile` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: usize,
    pub refreshed: usize,
    pub hits: usize,
    pub evicted: usize,
    /// Posts whose entry could not be written this cycle.
    pub failed: Vec<String>,
    /// Posts ignored because they violate the record invariants.
    pub rejected: Vec<String>,
    /// Entries that should have been evicted but could not be removed.
    pub eviction_failures: Vec<String>,
}

impl ReconcileReport {
    /// Number of entries written during the call.
    pub fn written(&self) -> usize {
        self.added + self.refreshed
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty() && self.eviction_failures.is_empty()
    }
}
